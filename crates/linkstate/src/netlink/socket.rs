//! Low-level async NETLINK_ROUTE socket.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::{Error, Result};

/// Receive buffer size for one datagram.
const RECV_BUF_SIZE: usize = 32768;

/// Async netlink socket.
pub struct NetlinkSocket {
    fd: AsyncFd<Socket>,
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
}

impl NetlinkSocket {
    /// Create and bind a new NETLINK_ROUTE socket.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_ROUTE)
            .map_err(|e| Error::connection("socket", e))?;
        socket
            .set_non_blocking(true)
            .map_err(|e| Error::connection("set_non_blocking", e))?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket
            .bind(&addr)
            .map_err(|e| Error::connection("bind", e))?;
        socket
            .get_address(&mut addr)
            .map_err(|e| Error::connection("getsockname", e))?;
        let pid = addr.port_number();

        let fd = AsyncFd::new(socket).map_err(|e| Error::connection("register", e))?;

        Ok(Self {
            fd,
            seq: AtomicU32::new(1),
            pid,
        })
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Subscribe to a multicast group.
    pub fn add_membership(&mut self, group: u32) -> Result<()> {
        self.fd
            .get_mut()
            .add_membership(group)
            .map_err(|e| Error::connection(&format!("join group {}", group), e))
    }

    /// Set SO_RCVBUF. The kernel doubles the value and caps it at
    /// net.core.rmem_max.
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<()> {
        let value = size.min(i32::MAX as usize) as libc::c_int;
        // SAFETY: fd is a valid socket, value outlives the call and optlen
        // matches its size.
        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &value as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::connection(
                "SO_RCVBUF",
                std::io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    /// Send a message.
    pub async fn send(&self, msg: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram.
    ///
    /// A kernel-side overflow surfaces as `Error::Io` with ENOBUFS; see
    /// [`is_overrun`].
    pub async fn recv_msg(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);

        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

/// True if a receive error means the kernel dropped notifications.
pub fn is_overrun(err: &Error) -> bool {
    err.errno() == Some(libc::ENOBUFS)
}

/// Multicast groups for NETLINK_ROUTE.
pub mod rtnetlink_groups {
    pub const RTNLGRP_LINK: u32 = 1;
    pub const RTNLGRP_IPV4_IFADDR: u32 = 5;
    pub const RTNLGRP_IPV4_ROUTE: u32 = 7;
    pub const RTNLGRP_IPV6_IFADDR: u32 = 9;
    pub const RTNLGRP_IPV6_ROUTE: u32 = 11;
}
