//! Source-address selection for a flow.

use anyhow::{anyhow, Result};
use pnet::datalink;
use std::net::{IpAddr, Ipv4Addr};

/// Pick the source address probes are answered at.
///
/// With no interface named the address stays unspecified and the kernel
/// chooses the outgoing interface at send time. A named interface yields
/// its first non-loopback IPv4 address.
pub(crate) fn source_address(interface: Option<&str>) -> Result<Ipv4Addr> {
    match interface {
        None => Ok(Ipv4Addr::UNSPECIFIED),
        Some(name) => first_ipv4(name),
    }
}

fn first_ipv4(name: &str) -> Result<Ipv4Addr> {
    let Some(iface) = datalink::interfaces().into_iter().find(|i| i.name == name) else {
        let available: Vec<_> = datalink::interfaces()
            .iter()
            .filter(|i| !i.ips.is_empty())
            .map(|i| i.name.clone())
            .collect();
        return Err(anyhow!(
            "interface '{}' not found. Available interfaces: {}",
            name,
            if available.is_empty() {
                "(none with IP addresses)".to_string()
            } else {
                available.join(", ")
            }
        ));
    };

    for addr in &iface.ips {
        if let IpAddr::V4(v4) = addr.ip() {
            if !v4.is_loopback() {
                return Ok(v4);
            }
        }
    }

    Err(anyhow!(
        "interface '{}' has no usable IPv4 address",
        name
    ))
}
