//! The hop-discovery loop.
//!
//! One flow, one outstanding probe: step the TTL from `start_ttl` to
//! `max_hops`, emit a UDP probe, and listen on the flow's ICMP socket for
//! the reply that quotes our identification back. The raw socket can hand
//! us anyone's ICMP even with the kernel filter installed, so every frame
//! is re-checked against the in-flight probe id and foreign traffic is
//! dropped inside the remaining window.

use anyhow::{Context, Result};
use chrono::Utc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::hop::{correlation_id, Addr, Hop, ProbeId};
use crate::lookup::rdns::ReverseResolver;
use crate::probe::flow::Flow;
use crate::probe::packet::{build_probe, parse_reply};

/// Fixed receive buffer. The headers the codec needs span 56 bytes; 100
/// leaves room for quoted payload without oversizing the recv.
const RECV_BUFFER_SIZE: usize = 100;

/// Pause before listening again after a transient receive failure.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Per-probe sequence values wrap below 2^6 - 1 to stay inside the low
/// six bits of the IP identification.
const SEQ_SLOTS: u16 = (1 << 6) - 1;

/// Drives hop discovery for one flow.
pub(crate) struct ProbeEngine {
    options: Options,
    flow: Flow,
    cancel: CancellationToken,
    resolver: Option<ReverseResolver>,
}

impl ProbeEngine {
    pub fn new(options: Options, flow: Flow, cancel: CancellationToken) -> Self {
        let resolver = if options.dont_resolve {
            None
        } else {
            ReverseResolver::new()
        };
        Self {
            options,
            flow,
            cancel,
            resolver,
        }
    }

    /// Run the loop to completion. Hops are pushed to the returned vec and,
    /// when a sink is given, handed over one by one in TTL order; the
    /// hand-off blocks until the consumer drains the previous hop.
    ///
    /// Ends on the first hop that answers from the destination, on TTL
    /// exhaustion, on cancellation, or with an error on a failed send.
    pub fn run(self, sink: Option<mpsc::Sender<Hop>>) -> Result<Vec<Hop>> {
        let port = self.options.port();
        let max_hops = self.options.max_hops();
        let timeout = self.options.timeout();
        let retries = self.options.retries();
        let payload = vec![0u8; self.options.payload_size()];

        let mut hops: Vec<Hop> = Vec::new();
        // wider than the TTL byte so the final increment can't overflow
        let mut ttl = u16::from(self.options.start_ttl());
        let mut seq: u16 = 0;
        let mut retry: u32 = 0;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        let mut reached = false;

        while ttl <= u16::from(max_hops) && !reached {
            seq = (seq + 1) % SEQ_SLOTS;
            let probe_id = ProbeId::new(self.flow.flow_id, seq);
            let ip_id = probe_id.to_ip_id();
            let packet = build_probe(self.flow.dst_ip, port, port, ttl as u8, ip_id, &payload);

            let sent_wall = Utc::now();
            let start = Instant::now();
            self.flow.send(&packet, port).context("sendto error")?;

            let mut hop: Option<Hop> = None;
            let mut remaining = timeout;
            while remaining > Duration::ZERO {
                if self.cancel.is_cancelled() {
                    return Ok(hops);
                }

                self.flow
                    .set_recv_timeout(remaining)
                    .context("can't set receive timeout")?;
                let received = self.flow.recv(&mut buffer);
                let received_wall = Utc::now();
                let elapsed = start.elapsed();

                match received {
                    Err(e) => {
                        let timed_out = e.downcast_ref::<std::io::Error>().is_some_and(|io| {
                            matches!(
                                io.kind(),
                                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                            )
                        });
                        if timed_out {
                            remaining = Duration::ZERO;
                        } else {
                            // lack of resources or something else transient:
                            // back off briefly and keep listening
                            thread::sleep(RECV_ERROR_BACKOFF);
                            remaining = remaining.saturating_sub(start.elapsed());
                        }
                    }
                    Ok(len) => match parse_reply(&buffer[..len]) {
                        Some(reply) if ProbeId::from_ip_id(reply.ip_id) == probe_id => {
                            let mut node = Addr::new(reply.node);
                            if let Some(resolver) = &self.resolver {
                                node.host = resolver.reverse_lookup(reply.node);
                            }
                            hop = Some(Hop {
                                success: true,
                                src: Addr::new(reply.src),
                                dst: Addr::new(reply.dst),
                                node,
                                step: ttl as u8,
                                id: correlation_id(reply.ip_id, reply.dst, port, reply.dst_port),
                                dst_port: reply.dst_port,
                                sent: sent_wall,
                                received: Some(received_wall),
                                elapsed,
                                icmp_type: reply.icmp_type,
                            });
                            break;
                        }
                        // someone else's ICMP, or a stale probe of ours:
                        // stay in the window
                        _ => remaining = remaining.saturating_sub(elapsed),
                    },
                }
            }

            let hop = match hop {
                Some(hop) => hop,
                None => {
                    retry += 1;
                    if retry <= retries {
                        continue;
                    }
                    Hop {
                        success: false,
                        src: Addr::new(self.flow.src_ip),
                        dst: Addr::new(self.flow.dst_ip),
                        node: Addr::default(),
                        step: ttl as u8,
                        id: correlation_id(ip_id, self.flow.dst_ip, port, port),
                        dst_port: port,
                        sent: sent_wall,
                        received: None,
                        elapsed: start.elapsed(),
                        icmp_type: 0,
                    }
                }
            };

            reached = hop.success && hop.node.ip == self.flow.dst_ip;
            hops.push(hop.clone());
            if let Some(sink) = &sink {
                if sink.blocking_send(hop).is_err() {
                    // consumer went away; finish like a cancellation
                    return Ok(hops);
                }
            }
            ttl += 1;
            retry = 0;
        }

        Ok(hops)
    }
}
