//! Concurrent UDP/ICMP traceroute for IPv4.
//!
//! Probes are UDP datagrams with hand-built IPv4 headers; replies are the
//! ICMP Time Exceeded / Destination Unreachable errors routers send back.
//! Every flow tags its probes through the IP identification field (10-bit
//! flow tag, 6-bit probe sequence), and a kernel packet filter plus a
//! userspace match on the quoted identification keep any number of
//! concurrent traceroutes in one process from stealing each other's
//! replies.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let hops = hoptrace::run_blocking("8.8.8.8", hoptrace::Options::default())?;
//! for hop in &hops {
//!     println!("{}", hop.to_human());
//! }
//! # Ok(())
//! # }
//! ```

// Public API - data types and entry points
pub mod config;
pub mod hop;

// Internal implementation - not part of public API
pub(crate) mod lookup;
pub(crate) mod probe;
mod trace;

pub use config::Options;
pub use hop::{Addr, Hop};
pub use trace::{run, run_blocking};
