//! Builds outbound probe datagrams and decodes the ICMP errors they
//! provoke.
//!
//! Outbound packets are assembled by hand: the send socket runs in
//! header-included mode, so the kernel only fills the source address and
//! the IPv4 checksum. Inbound parsing walks outer IPv4 -> ICMP -> quoted
//! original IPv4 + UDP; anything that is not a Time Exceeded or
//! Destination Unreachable quoting at least a UDP header is "not ours".

use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use std::net::Ipv4Addr;

/// Header length we emit: IHL 5, no options.
const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ICMP_HEADER_LEN: usize = 8;
const IPPROTO_UDP: u8 = 17;

/// Assemble a UDP probe datagram with the given TTL and IP identification.
///
/// The source address and IPv4 checksum are left zero for the kernel; the
/// UDP checksum stays zero, which IPv4 permits.
pub(crate) fn build_probe(
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    ttl: u8,
    ip_id: u16,
    payload: &[u8],
) -> Vec<u8> {
    let total_len = IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len();
    let mut packet = vec![0u8; total_len];

    packet[0] = 0x45; // version 4, IHL 5
    packet[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    packet[4..6].copy_from_slice(&ip_id.to_be_bytes());
    packet[8] = ttl;
    packet[9] = IPPROTO_UDP;
    packet[16..20].copy_from_slice(&dst.octets());

    let udp = &mut packet[IPV4_HEADER_LEN..];
    udp[0..2].copy_from_slice(&src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    udp[4..6].copy_from_slice(&((UDP_HEADER_LEN + payload.len()) as u16).to_be_bytes());
    udp[UDP_HEADER_LEN..].copy_from_slice(payload);

    packet
}

/// Fields recovered from an ICMP reply to one of our probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProbeReply {
    /// ICMP type of the reply (11 time exceeded, 3 unreachable).
    pub icmp_type: u8,
    /// The router that answered (outer source address).
    pub node: Ipv4Addr,
    /// Identification of the quoted original IPv4 header.
    pub ip_id: u16,
    /// Source address of the original probe as quoted back.
    pub src: Ipv4Addr,
    /// Destination address of the original probe.
    pub dst: Ipv4Addr,
    /// TTL of the original probe as quoted back.
    pub ttl: u8,
    /// Destination port of the original UDP header.
    pub dst_port: u16,
}

/// Decode one datagram from the raw ICMP socket.
///
/// Returns `None` for anything that cannot be a reply to a probe of ours:
/// malformed headers, ICMP types other than Time Exceeded / Destination
/// Unreachable, or a quoted datagram too short to carry a UDP header.
pub(crate) fn parse_reply(data: &[u8]) -> Option<ProbeReply> {
    let outer = Ipv4Packet::new(data)?;
    let outer_len = usize::from(outer.get_header_length()) * 4;
    if outer_len < IPV4_HEADER_LEN || data.len() < outer_len + ICMP_HEADER_LEN {
        return None;
    }
    let node = outer.get_source();

    let icmp_data = &data[outer_len..];
    let icmp = IcmpPacket::new(icmp_data)?;
    let icmp_type = icmp.get_icmp_type();
    if icmp_type != IcmpTypes::TimeExceeded && icmp_type != IcmpTypes::DestinationUnreachable {
        return None;
    }

    // the quoted original datagram follows the 8-byte ICMP header
    if icmp_data.len() < ICMP_HEADER_LEN + IPV4_HEADER_LEN {
        return None;
    }
    let quoted = &icmp_data[ICMP_HEADER_LEN..];
    let original = Ipv4Packet::new(quoted)?;
    let original_len = usize::from(original.get_header_length()) * 4;
    if original_len < IPV4_HEADER_LEN || quoted.len() < original_len + UDP_HEADER_LEN {
        return None;
    }

    let udp = &quoted[original_len..];
    let dst_port = u16::from_be_bytes([udp[2], udp[3]]);

    Some(ProbeReply {
        icmp_type: icmp_type.0,
        node,
        ip_id: original.get_identification(),
        src: original.get_source(),
        dst: original.get_destination(),
        ttl: original.get_ttl(),
        dst_port,
    })
}
