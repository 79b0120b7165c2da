use anyhow::Result;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::mem::MaybeUninit;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Create the raw ICMP socket a flow receives replies on.
pub(crate) fn create_recv_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Create the raw send socket probes go out on. Under IPPROTO_RAW sends
/// carry a caller-built IPv4 header and the kernel fills the source
/// address and checksum.
pub(crate) fn create_send_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(libc::IPPROTO_RAW)))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Send one probe datagram.
pub(crate) fn send_probe(socket: &Socket, packet: &[u8], target: SocketAddrV4) -> Result<usize> {
    let addr = SockAddr::from(SocketAddr::V4(target));
    let sent = socket.send_to(packet, &addr)?;
    Ok(sent)
}

/// Receive one datagram into `buffer`, returning the byte count. The
/// responder address comes out of the packet itself, not the socket.
pub(crate) fn recv_reply(socket: &Socket, buffer: &mut [u8]) -> Result<usize> {
    // Convert buffer to MaybeUninit slice for socket2
    let uninit_buf: &mut [MaybeUninit<u8>] = unsafe {
        std::slice::from_raw_parts_mut(buffer.as_mut_ptr() as *mut MaybeUninit<u8>, buffer.len())
    };

    let (len, _) = socket.recv_from(uninit_buf)?;
    Ok(len)
}

/// Bound the next receive; the caller passes the window that remains.
/// Sub-millisecond remainders would truncate to a zero timeval, which
/// means "block forever" to the kernel, so they round up.
pub(crate) fn set_recv_timeout(socket: &Socket, timeout: Duration) -> Result<()> {
    socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
    Ok(())
}
