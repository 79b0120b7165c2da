//! Public entry points wiring resolution, flow setup, and the engine.

pub(crate) mod engine;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::hop::Hop;
use crate::lookup::{resolve_dest, resolve_dest_async};
use crate::probe::flow::Flow;
use self::engine::ProbeEngine;

/// Capacity of the streaming hop channel. One slot keeps the engine at
/// most a single hop ahead of a slow consumer.
const SINK_CAPACITY: usize = 1;

/// Start a traceroute to `dest` and stream its hops.
///
/// Returns as soon as the destination resolves and the flow's sockets are
/// set up; the engine runs on a blocking task. Hops arrive in strictly
/// increasing TTL order and the channel closes when the trace ends -
/// destination reached, TTL exhausted, `cancel` triggered, or a mid-trace
/// socket failure (which is reported to stderr, not over the channel).
///
/// Requires `CAP_NET_RAW` (or root) for the raw sockets.
pub async fn run(
    dest: &str,
    options: Options,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<Hop>> {
    let dst_ip = resolve_dest_async(dest).await?;
    let flow = Flow::new(dst_ip, options.port(), options.network_interface())?;

    let (tx, rx) = mpsc::channel(SINK_CAPACITY);
    tokio::task::spawn_blocking(move || {
        // the engine owns the flow and the sender: its exit closes the
        // sockets and the channel, and channel closure is the caller's
        // end-of-sequence signal
        let engine = ProbeEngine::new(options, flow, cancel);
        if let Err(e) = engine.run(Some(tx)) {
            eprintln!("traceroute to {} aborted: {:#}", dst_ip, e);
        }
    });

    Ok(rx)
}

/// Run a traceroute to `dest` to completion on the calling thread.
///
/// Returns every hop gathered, in TTL order. Unanswered TTLs appear as
/// hops with `success == false`.
///
/// Requires `CAP_NET_RAW` (or root) for the raw sockets.
pub fn run_blocking(dest: &str, options: Options) -> Result<Vec<Hop>> {
    let dst_ip = resolve_dest(dest)?;
    let flow = Flow::new(dst_ip, options.port(), options.network_interface())?;
    ProbeEngine::new(options, flow, CancellationToken::new()).run(None)
}
