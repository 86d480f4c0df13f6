//! Drain-until-would-block retry policy
//!
//! Every descriptor is registered edge-triggered, so each readiness
//! notification must be consumed until the OS reports `WouldBlock`.
//! `attempt` is the single place that classifies an I/O result: interrupted
//! calls are retried, would-block becomes `None`, anything else is an error.

use std::io::{self, Write};

/// Run `op` once under the retry policy
///
/// Returns `Ok(None)` when the operation would block.
pub(crate) fn attempt<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<Option<T>> {
    loop {
        match op() {
            Ok(value) => return Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Write as much of `buf` as the writer accepts without blocking
///
/// Returns the number of bytes written, which is less than `buf.len()` only
/// if the writer would block.
pub(crate) fn write_until_blocked<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        match attempt(|| writer.write(&buf[written..]))? {
            Some(0) => return Err(io::ErrorKind::WriteZero.into()),
            Some(n) => written += n,
            None => break,
        }
    }
    Ok(written)
}
