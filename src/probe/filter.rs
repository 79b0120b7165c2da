//! Kernel-side classifier for the receive socket.
//!
//! Every probe carries its flow tag in the high 10 bits of the IP
//! identification, and routers quote that header back inside their ICMP
//! errors. The filter checks the quoted identification so the kernel
//! drops other flows' replies before they reach userspace. It is only a
//! traffic reducer: the engine re-applies the same match on every frame,
//! so platforms without classic BPF stay correct.

use std::io;
use std::os::unix::io::RawFd;

/// Byte offset of the quoted identification field in a datagram from a
/// raw ICMP socket: 20 (outer IPv4) + 8 (ICMP header) + 4 (identification
/// offset within the quoted IPv4 header).
#[cfg(target_os = "linux")]
const QUOTED_IP_ID_OFFSET: u32 = 32;

/// Mask selecting the 10 flow-tag bits of the identification.
#[cfg(target_os = "linux")]
const FLOW_TAG_MASK: u32 = 0x3ff << 6;

/// Bytes of a matching frame passed up to userspace.
#[cfg(target_os = "linux")]
const SNAP_LEN: u32 = 256;

#[cfg(target_os = "linux")]
fn sock_filter(code: u16, jt: u8, jf: u8, k: u32) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

/// The classic-BPF program admitting only ICMP frames whose quoted
/// identification carries `flow_id` in its high 10 bits.
#[cfg(target_os = "linux")]
pub(crate) fn flow_filter(flow_id: u16) -> [libc::sock_filter; 8] {
    use libc::{BPF_ABS, BPF_ALU, BPF_AND, BPF_B, BPF_H, BPF_JEQ, BPF_JMP, BPF_K, BPF_LD, BPF_RET};
    [
        // load the outer IP protocol byte; drop anything but ICMP
        sock_filter((BPF_LD | BPF_B | BPF_ABS) as u16, 0, 0, 9),
        sock_filter((BPF_JMP | BPF_JEQ | BPF_K) as u16, 1, 0, libc::IPPROTO_ICMP as u32),
        sock_filter((BPF_RET | BPF_K) as u16, 0, 0, 0),
        // load the identification of the quoted original IPv4 header,
        // mask off the sequence bits, compare against our tag
        sock_filter((BPF_LD | BPF_H | BPF_ABS) as u16, 0, 0, QUOTED_IP_ID_OFFSET),
        sock_filter((BPF_ALU | BPF_AND | BPF_K) as u16, 0, 0, FLOW_TAG_MASK),
        sock_filter((BPF_JMP | BPF_JEQ | BPF_K) as u16, 1, 0, u32::from(flow_id) << 6),
        sock_filter((BPF_RET | BPF_K) as u16, 0, 0, 0),
        sock_filter((BPF_RET | BPF_K) as u16, 0, 0, SNAP_LEN),
    ]
}

/// Attach the flow filter to the receive socket.
#[cfg(target_os = "linux")]
pub(crate) fn attach_flow_filter(fd: RawFd, flow_id: u16) -> io::Result<()> {
    let filter = flow_filter(flow_id);
    let prog = libc::sock_fprog {
        len: filter.len() as u16,
        filter: filter.as_ptr() as *mut libc::sock_filter,
    };
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            &prog as *const _ as *const libc::c_void,
            std::mem::size_of_val(&prog) as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Without classic BPF the socket sees every ICMP frame on the host; the
/// engine's own match rule keeps the flow correct, just busier.
#[cfg(not(target_os = "linux"))]
pub(crate) fn attach_flow_filter(_fd: RawFd, _flow_id: u16) -> io::Result<()> {
    Ok(())
}
