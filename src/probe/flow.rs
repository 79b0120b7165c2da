//! One traceroute session's sockets and identity.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use socket2::{SockAddr, Socket};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use crate::probe::filter::attach_flow_filter;
use crate::probe::interface::source_address;
use crate::probe::socket::{
    create_recv_socket, create_send_socket, recv_reply, send_probe, set_recv_timeout,
};

/// Number of distinct flow tags; a tag occupies the high 10 bits of the
/// IP identification.
pub(crate) const FLOW_ID_SLOTS: u16 = (1 << 10) - 1;

/// The process-wide tag counter, the crate's only global mutable state.
/// Cycling through ~1023 values keeps coexisting flows distinct.
static NEXT_FLOW_ID: Mutex<u16> = Mutex::new(0);

/// Allocate the next flow tag.
pub(crate) fn next_flow_id() -> u16 {
    let mut next = NEXT_FLOW_ID.lock();
    let id = *next;
    *next = (*next + 1) % FLOW_ID_SLOTS;
    id
}

/// One traceroute flow: the raw socket pair plus the tag that marks this
/// flow's probes. Both sockets close when the flow drops, which happens
/// exactly once, when the engine loop exits.
pub(crate) struct Flow {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    send_socket: Socket,
    recv_socket: Socket,
    pub flow_id: u16,
}

impl Flow {
    pub fn new(dst_ip: Ipv4Addr, src_port: u16, interface: Option<&str>) -> Result<Flow> {
        let src_ip = source_address(interface)?;

        let recv_socket = create_recv_socket().context("can't create a recv socket")?;
        let bind_addr = SockAddr::from(SocketAddr::new(IpAddr::V4(src_ip), src_port));
        recv_socket
            .bind(&bind_addr)
            .context("can't bind recv socket")?;

        let send_socket = create_send_socket().context("can't create a send socket")?;
        // The send socket stays unbound. Binding it to the address of a
        // non-default-route interface makes the kernel route via the
        // default gateway anyway, with the wrong source address on the
        // wire; leaving the choice to the routing table avoids that.

        let flow_id = next_flow_id();

        attach_flow_filter(recv_socket.as_raw_fd(), flow_id).context("can't apply bpf filter")?;

        Ok(Flow {
            src_ip,
            dst_ip,
            send_socket,
            recv_socket,
            flow_id,
        })
    }

    /// Send one probe datagram to the destination.
    pub fn send(&self, packet: &[u8], dst_port: u16) -> Result<()> {
        send_probe(
            &self.send_socket,
            packet,
            SocketAddrV4::new(self.dst_ip, dst_port),
        )?;
        Ok(())
    }

    /// Receive one candidate reply; bounded by the last `set_recv_timeout`.
    pub fn recv(&self, buffer: &mut [u8]) -> Result<usize> {
        recv_reply(&self.recv_socket, buffer)
    }

    pub fn set_recv_timeout(&self, timeout: Duration) -> Result<()> {
        set_recv_timeout(&self.recv_socket, timeout)
    }
}
