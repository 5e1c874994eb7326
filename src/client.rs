//! One-shot client: connect to the rendezvous socket, take delivery of a
//! single TAP descriptor, poke it with one read, and get out.

use std::fs::File;
use std::io;
use std::io::Read;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{FdPassingExt, RecvFdError};

/// Failures that decide the exit status. The exploratory read is not one
/// of them; its outcome is only reported.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to socket {}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to receive file descriptor")]
    Receive(#[from] RecvFdError),
}

/// Run the whole exchange against the socket at `path`.
///
/// Both descriptors are dropped on every path out of this function, the
/// received one first and the stream after it.
pub fn run(path: &Path) -> Result<(), ClientError> {
    let stream = UnixStream::connect(path).map_err(|source| ClientError::Connect {
        path: path.to_owned(),
        source,
    })?;
    debug!(path = %path.display(), "connected to tap server");

    let fd = stream.recv_fd()?;
    println!("Received TAP device file descriptor: {}", fd.as_raw_fd());

    let mut tap = File::from(fd);
    let mut buf = [0u8; 1024];
    match tap.read(&mut buf) {
        Ok(n) => println!("Read {} bytes from TAP device", n),
        Err(err) => eprintln!("Failed to read from TAP device: {}", err),
    }

    Ok(())
}
