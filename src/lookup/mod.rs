//! Destination resolution for the public entry points.

pub(crate) mod rdns;

use anyhow::{bail, Context, Result};
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

/// Resolve a destination host name (or IPv4 literal) to an address.
pub(crate) fn resolve_dest(dest: &str) -> Result<Ipv4Addr> {
    // Try parsing as IP address first
    if let Ok(ip) = dest.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let addrs = format!("{}:0", dest)
        .to_socket_addrs()
        .with_context(|| format!("can't resolve {}", dest))?;
    pick_ipv4(dest, addrs.map(|addr| addr.ip()))
}

/// Async variant for the streaming entry point.
pub(crate) async fn resolve_dest_async(dest: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = dest.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host((dest, 0))
        .await
        .with_context(|| format!("can't resolve {}", dest))?;
    pick_ipv4(dest, addrs.map(|addr| addr.ip()))
}

fn pick_ipv4(dest: &str, addrs: impl Iterator<Item = IpAddr>) -> Result<Ipv4Addr> {
    for addr in addrs {
        if let IpAddr::V4(v4) = addr {
            return Ok(v4);
        }
    }
    bail!("no IPv4 address found for {}", dest)
}
