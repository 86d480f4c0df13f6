//! Request line parsing
//!
//! A viewer sends exactly one meaningful line:
//!
//! ```text
//! GET /anything?CREDENTIAL HTTP/1.1\r\n
//! ```
//!
//! The path before `?` is ignored. The credential is the byte range between
//! `?` and the space terminating the request target.

use std::ops::Range;

use crate::error::ProtocolError;

/// A parsed request line, expressed as offsets into the receive buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Byte range of the credential within the buffer
    pub credential: Range<usize>,
}

impl RequestLine {
    /// Borrow the credential bytes out of the buffer the line was parsed from
    pub fn credential<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.credential.clone()]
    }
}

/// Parse the first line of `buf`
///
/// Returns `Ok(None)` while no line terminator has arrived yet. Buffer size
/// limits are enforced by the caller.
pub fn parse_request_line(buf: &[u8]) -> Result<Option<RequestLine>, ProtocolError> {
    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    let line = &buf[..newline];

    let target_start = line
        .iter()
        .position(|&b| b == b' ')
        .map(|sp| sp + 1)
        .ok_or(ProtocolError::MissingTarget)?;

    let target_end = line[target_start..]
        .iter()
        .position(|&b| b == b' ')
        .map(|sp| target_start + sp)
        .ok_or(ProtocolError::UnterminatedTarget)?;

    let query_start = line[target_start..target_end]
        .iter()
        .position(|&b| b == b'?')
        .map(|q| target_start + q + 1)
        .ok_or(ProtocolError::MissingQuery)?;

    if query_start >= target_end {
        return Err(ProtocolError::EmptyCredential);
    }

    Ok(Some(RequestLine {
        credential: query_start..target_end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_of(input: &[u8]) -> Vec<u8> {
        let line = parse_request_line(input).unwrap().unwrap();
        line.credential(input).to_vec()
    }

    #[test]
    fn test_parse_well_formed() {
        assert_eq!(credential_of(b"GET /x?TOKEN HTTP/1.1\r\n"), b"TOKEN");
        assert_eq!(credential_of(b"GET /s?abc HTTP/1.1\r\n"), b"abc");
    }

    #[test]
    fn test_path_is_ignored() {
        assert_eq!(credential_of(b"GET ?abc HTTP/1.0\n"), b"abc");
        assert_eq!(credential_of(b"GET /a/b/c?x=1&y=2 HTTP/1.1\r\n"), b"x=1&y=2");
    }

    #[test]
    fn test_incomplete_line_needs_more() {
        assert_eq!(parse_request_line(b"GET /s?abc HTT").unwrap(), None);
        assert_eq!(parse_request_line(b"").unwrap(), None);
    }

    #[test]
    fn test_only_first_line_is_parsed() {
        let input = b"GET /s?first HTTP/1.1\r\nHost: x\r\nGET /s?second HTTP/1.1\r\n";
        let line = parse_request_line(input).unwrap().unwrap();
        assert_eq!(line.credential(input), b"first");
    }

    #[test]
    fn test_missing_query_marker() {
        assert_eq!(
            parse_request_line(b"GET /s HTTP/1.1\r\n"),
            Err(ProtocolError::MissingQuery)
        );
    }

    #[test]
    fn test_query_after_terminating_space() {
        assert_eq!(
            parse_request_line(b"GET /s HTTP/1.1?abc\r\n"),
            Err(ProtocolError::MissingQuery)
        );
    }

    #[test]
    fn test_missing_space() {
        assert_eq!(
            parse_request_line(b"GET\r\n"),
            Err(ProtocolError::MissingTarget)
        );
        assert_eq!(
            parse_request_line(b"GET /s?abc\r\n"),
            Err(ProtocolError::UnterminatedTarget)
        );
    }

    #[test]
    fn test_empty_credential() {
        assert_eq!(
            parse_request_line(b"GET /s? HTTP/1.1\r\n"),
            Err(ProtocolError::EmptyCredential)
        );
    }

    #[test]
    fn test_separators_after_newline_do_not_count() {
        // The space and '?' only appear on the second line
        assert_eq!(
            parse_request_line(b"GET\n /s?abc HTTP/1.1\n"),
            Err(ProtocolError::MissingTarget)
        );
    }
}
