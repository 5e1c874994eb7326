//! File descriptor passing over Unix domain sockets, plus the one-shot
//! TAP hand-off client built on top of it (see [`client`]).

use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use libc::{c_int, c_void, msghdr};
use thiserror::Error;

pub mod client;

/// Everything that can go wrong while extracting one descriptor from an
/// ancillary message. Each case is fatal to the exchange; none is retried.
#[derive(Debug, Error)]
pub enum RecvFdError {
    /// The underlying `recvmsg` call failed.
    #[error("failed to receive message")]
    Receive(#[source] io::Error),
    /// The message carried fewer control bytes than one `cmsghdr`.
    #[error("no control message received")]
    NoControlMessage,
    /// Control bytes were present but no header could be read from them.
    #[error("no control message header present")]
    MissingHeader,
    /// The control message is not sized for exactly one descriptor.
    #[error("invalid control message length: {len}")]
    InvalidLength { len: usize },
    /// The control message is not a socket-level SCM_RIGHTS entry.
    #[error("invalid control message level/type: {level}/{kind}")]
    InvalidKind { level: c_int, kind: c_int },
}

pub trait FdPassingExt {
    /// Send one descriptor as an SCM_RIGHTS control message with a
    /// single ignorable payload byte.
    fn send_fd(&self, fd: RawFd) -> Result<(), io::Error>;
    /// Receive one descriptor. On success the kernel has duplicated the
    /// peer's descriptor into this process and the returned [`OwnedFd`]
    /// owns it.
    fn recv_fd(&self) -> Result<OwnedFd, RecvFdError>;
}

impl FdPassingExt for UnixStream {
    fn send_fd(&self, fd: RawFd) -> Result<(), io::Error> {
        let mut payload: u8 = 0;
        let mut buf = vec![0u8; unsafe { libc::CMSG_SPACE(mem::size_of::<c_int>() as u32) } as usize];
        let mut iov = libc::iovec {
            iov_base: &mut payload as *mut u8 as *mut c_void,
            iov_len: mem::size_of_val(&payload),
        };

        let mut msg: msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = buf.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = buf.len();

        unsafe {
            let hdr = libc::CMSG_FIRSTHDR(&msg);
            (*hdr).cmsg_level = libc::SOL_SOCKET;
            (*hdr).cmsg_type = libc::SCM_RIGHTS;
            (*hdr).cmsg_len = libc::CMSG_LEN(mem::size_of::<c_int>() as u32) as usize;
            *(libc::CMSG_DATA(hdr) as *mut c_int) = fd;
        }

        let rv = unsafe { libc::sendmsg(self.as_raw_fd(), &msg, 0) };
        if rv < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn recv_fd(&self) -> Result<OwnedFd, RecvFdError> {
        // The peer's payload is ignorable and may even be empty (the tap
        // server sends the rights entry with no data bytes at all).
        let mut payload: u8 = 0;
        let mut buf = vec![0u8; unsafe { libc::CMSG_SPACE(mem::size_of::<c_int>() as u32) } as usize];
        let mut iov = libc::iovec {
            iov_base: &mut payload as *mut u8 as *mut c_void,
            iov_len: mem::size_of_val(&payload),
        };

        let mut msg: msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = buf.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = buf.len();

        let rv = unsafe { libc::recvmsg(self.as_raw_fd(), &mut msg, 0) };
        if rv < 0 {
            return Err(RecvFdError::Receive(io::Error::last_os_error()));
        }

        if (msg.msg_controllen as usize) < mem::size_of::<libc::cmsghdr>() {
            return Err(RecvFdError::NoControlMessage);
        }

        let hdr = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        if hdr.is_null() {
            return Err(RecvFdError::MissingHeader);
        }

        let (len, level, kind) =
            unsafe { ((*hdr).cmsg_len as usize, (*hdr).cmsg_level, (*hdr).cmsg_type) };
        if let Err(err) = check_control(len, level, kind) {
            if level == libc::SOL_SOCKET && kind == libc::SCM_RIGHTS {
                // The kernel already installed whatever descriptors the
                // peer packed in; close them so the rejection leaks nothing.
                unsafe { close_rights(hdr) };
            }
            return Err(err);
        }

        let fd = unsafe { *(libc::CMSG_DATA(hdr) as *const c_int) };
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

/// Accept only a control message sized for exactly one descriptor and
/// marked as a socket-level SCM_RIGHTS transfer.
fn check_control(len: usize, level: c_int, kind: c_int) -> Result<(), RecvFdError> {
    if len != unsafe { libc::CMSG_LEN(mem::size_of::<c_int>() as u32) } as usize {
        return Err(RecvFdError::InvalidLength { len });
    }
    if level != libc::SOL_SOCKET || kind != libc::SCM_RIGHTS {
        return Err(RecvFdError::InvalidKind { level, kind });
    }
    Ok(())
}

/// Close every descriptor carried by a rejected SCM_RIGHTS entry.
unsafe fn close_rights(hdr: *const libc::cmsghdr) {
    let data_len = ((*hdr).cmsg_len as usize).saturating_sub(libc::CMSG_LEN(0) as usize);
    let fds = libc::CMSG_DATA(hdr) as *const c_int;
    for i in 0..data_len / mem::size_of::<c_int>() {
        libc::close(*fds.add(i));
    }
}
