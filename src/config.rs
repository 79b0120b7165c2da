use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 33434;
pub const DEFAULT_MAX_HOPS: u16 = 32;
pub const DEFAULT_START_TTL: u8 = 1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_RETRIES: u32 = 2;

/// Hard ceiling on the probe TTL.
const MAX_HOPS_LIMIT: u16 = 63;

/// Per-run tracing options.
///
/// Unset fields snap to the documented defaults, so `Options::default()`
/// is a usable configuration. Out-of-range values clamp: `max_hops` never
/// exceeds 63 and never falls below `start_ttl`, and a zero `start_ttl`
/// or `timeout` falls back to its default. An explicit `Some(0)` for
/// `retries` or `payload_size` is honored as written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Options {
    /// Destination port for UDP probes (also used as the source port).
    pub port: Option<u16>,
    /// Highest TTL to probe.
    pub max_hops: Option<u16>,
    /// TTL of the first probe.
    pub start_ttl: Option<u8>,
    /// Receive window per probe.
    #[serde(default, with = "duration_opt_serde")]
    pub timeout: Option<Duration>,
    /// Extra probes per TTL after the window expires without a reply.
    pub retries: Option<u32>,
    /// Bytes of zero padding appended to each probe.
    pub payload_size: Option<usize>,
    /// Interface supplying the source address; the kernel picks when unset.
    pub network_interface: Option<String>,
    /// Skip reverse DNS resolution of responding hops.
    pub dont_resolve: bool,
}

impl Options {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn max_hops(&self) -> u8 {
        let hops = self.max_hops.unwrap_or(DEFAULT_MAX_HOPS).min(MAX_HOPS_LIMIT);
        (hops as u8).max(self.start_ttl())
    }

    pub fn start_ttl(&self) -> u8 {
        match self.start_ttl {
            Some(ttl) if ttl > 0 => ttl,
            _ => DEFAULT_START_TTL,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_TIMEOUT,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size.unwrap_or(0)
    }

    pub fn network_interface(&self) -> Option<&str> {
        self.network_interface.as_deref()
    }
}

/// Serde helper for `Duration` (seconds as f64)
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Serde helper for optional durations
pub(crate) mod duration_opt_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}
