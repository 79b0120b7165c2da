use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A network address as a hostname / IPv4 pair.
///
/// `host` is set only when reverse resolution was enabled and succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addr {
    pub host: Option<String>,
    pub ip: Ipv4Addr,
}

impl Addr {
    pub(crate) fn new(ip: Ipv4Addr) -> Self {
        Self { host: None, ip }
    }

    /// The hostname when known, the address otherwise.
    pub fn host_or_ip(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => self.ip.to_string(),
        }
    }
}

impl Default for Addr {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{} ({})", host, self.ip),
            None => write!(f, "{}", self.ip),
        }
    }
}

/// Identifies a probe on the wire through the IP identification field:
/// the high 10 bits carry the flow tag, the low 6 bits the per-probe
/// sequence.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub(crate) struct ProbeId {
    pub flow: u16,
    pub seq: u16,
}

impl ProbeId {
    pub fn new(flow: u16, seq: u16) -> Self {
        Self { flow, seq }
    }

    /// Encode into the 16-bit IP identification value.
    pub fn to_ip_id(self) -> u16 {
        (self.flow << 6) | (self.seq & 0x3f)
    }

    /// Decode from an IP identification value.
    pub fn from_ip_id(id: u16) -> Self {
        Self {
            flow: id >> 6,
            seq: id & 0x3f,
        }
    }
}

/// One step in the route between a source and destination address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    /// Whether a matching reply was received for this TTL.
    pub success: bool,
    /// The local address probes were sent from.
    pub src: Addr,
    /// The destination being traced.
    pub dst: Addr,
    /// The router (or destination) that answered at this step.
    pub node: Addr,
    /// Position in the route, i.e. the TTL the probe carried.
    pub step: u8,
    /// Correlation id derived from the probe, for debugging output.
    pub id: String,
    /// Destination port the probe targeted.
    pub dst_port: u16,
    /// When the probe was sent.
    pub sent: DateTime<Utc>,
    /// When the reply arrived; `None` when the step went unanswered.
    pub received: Option<DateTime<Utc>>,
    /// Round-trip time of the probe.
    #[serde(with = "crate::config::duration_serde")]
    pub elapsed: Duration,
    /// ICMP type of the reply (11 time exceeded, 3 unreachable).
    pub icmp_type: u8,
}

impl Hop {
    /// Single-line rendering: `"<step> <host-or-ip> (<ip>)  <ms>ms"`, or
    /// `"<step> *"` when the step went unanswered.
    pub fn to_human(&self) -> String {
        if !self.success {
            return format!("{:<3} *", self.step);
        }
        format!(
            "{:<3} {} ({})  {}ms",
            self.step,
            self.node.host_or_ip(),
            self.node.ip,
            self.elapsed.as_millis()
        )
    }

    /// Full record as JSON, optionally indented.
    pub fn to_json(&self, pretty: bool) -> String {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        rendered.unwrap_or_default()
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Src: {}, Dst: {}, Node: {}, Step: {}, Elapsed: {:?}, ID: {}, Type: {}",
            self.src.ip, self.dst, self.node, self.step, self.elapsed, self.id, self.icmp_type
        )
    }
}

/// Debug-correlation id tying a hop back to the probe that produced it.
pub(crate) fn correlation_id(ip_id: u16, dst: Ipv4Addr, src_port: u16, dst_port: u16) -> String {
    format!("{}|{}|{}|{}", ip_id, dst, src_port, dst_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hop() -> Hop {
        Hop {
            success: true,
            src: Addr::new(Ipv4Addr::new(192, 168, 1, 10)),
            dst: Addr::new(Ipv4Addr::new(8, 8, 8, 8)),
            node: Addr::new(Ipv4Addr::new(10, 0, 0, 1)),
            step: 3,
            id: correlation_id(1234, Ipv4Addr::new(8, 8, 8, 8), 33434, 33434),
            dst_port: 33434,
            sent: Utc::now(),
            received: Some(Utc::now()),
            elapsed: Duration::from_millis(12),
            icmp_type: 11,
        }
    }

    #[test]
    fn probe_id_round_trip() {
        let id = ProbeId::new(731, 42);
        assert_eq!(ProbeId::from_ip_id(id.to_ip_id()), id);
    }

    #[test]
    fn probe_id_boundaries() {
        let id = ProbeId::new(1022, 62);
        let encoded = id.to_ip_id();
        assert_eq!(encoded >> 6, 1022);
        assert_eq!(encoded & 0x3f, 62);

        // an oversized sequence never bleeds into the flow bits
        let clamped = ProbeId::new(1, 0xff).to_ip_id();
        assert_eq!(clamped >> 6, 1);
    }

    #[test]
    fn human_rendering() {
        let mut hop = sample_hop();
        assert_eq!(hop.to_human(), "3   10.0.0.1 (10.0.0.1)  12ms");

        hop.node.host = Some("router.example.net".to_string());
        assert_eq!(hop.to_human(), "3   router.example.net (10.0.0.1)  12ms");

        hop.success = false;
        assert_eq!(hop.to_human(), "3   *");
    }

    #[test]
    fn display_rendering() {
        let mut hop = sample_hop();
        assert_eq!(
            hop.to_string(),
            "Src: 192.168.1.10, Dst: 8.8.8.8, Node: 10.0.0.1, Step: 3, \
             Elapsed: 12ms, ID: 1234|8.8.8.8|33434|33434, Type: 11"
        );

        hop.node.host = Some("router.example.net".to_string());
        assert_eq!(
            hop.to_string(),
            "Src: 192.168.1.10, Dst: 8.8.8.8, Node: router.example.net (10.0.0.1), Step: 3, \
             Elapsed: 12ms, ID: 1234|8.8.8.8|33434|33434, Type: 11"
        );

        hop.success = false;
        hop.node = Addr::default();
        hop.received = None;
        hop.icmp_type = 0;
        assert_eq!(
            hop.to_string(),
            "Src: 192.168.1.10, Dst: 8.8.8.8, Node: 0.0.0.0, Step: 3, \
             Elapsed: 12ms, ID: 1234|8.8.8.8|33434|33434, Type: 0"
        );
    }

    #[test]
    fn json_rendering_carries_all_fields() {
        let hop = sample_hop();
        let json = hop.to_json(false);
        for field in [
            "success", "src", "dst", "node", "step", "id", "dst_port", "sent", "received",
            "elapsed", "icmp_type",
        ] {
            assert!(json.contains(field), "missing field {field}: {json}");
        }
        assert!(hop.to_json(true).contains('\n'));
    }

    #[test]
    fn addr_display() {
        let mut addr = Addr::new(Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(addr.to_string(), "1.1.1.1");
        assert_eq!(addr.host_or_ip(), "1.1.1.1");

        addr.host = Some("one.one.one.one".to_string());
        assert_eq!(addr.to_string(), "one.one.one.one (1.1.1.1)");
        assert_eq!(addr.host_or_ip(), "one.one.one.one");
    }
}
