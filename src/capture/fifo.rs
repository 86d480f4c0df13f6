//! Named pipe helpers
//!
//! FIFOs are opened read-write. A reader-only FIFO reports end-of-stream
//! whenever no writer is attached, which would look like a dead producer
//! before the producer ever started. Holding our own write end keeps the
//! pipe open across producer restarts.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{FromRawFd, IntoRawFd};
use std::path::Path;

use mio::unix::pipe::Receiver;

/// Create a FIFO at `path` unless something already exists there
pub fn create(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;

    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        // Lost a race with another creator
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(err);
        }
    }

    tracing::debug!(path = %path.display(), "Created FIFO");
    Ok(())
}

/// Open `path` as a non-blocking pipe receiver
///
/// Works for FIFOs and for regular files; the latter report end-of-stream
/// once fully read.
pub fn open(path: &Path) -> io::Result<Receiver> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;

    // SAFETY: the descriptor was just released by `file` and is owned by nothing else
    let receiver = unsafe { Receiver::from_raw_fd(file.into_raw_fd()) };
    receiver.set_nonblocking(true)?;
    Ok(receiver)
}
