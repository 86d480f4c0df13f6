//! HTTP multipart wire protocol
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |-- GET /path?credential HTTP/1.1\r\n -->|
//!   |                                        |
//!   |<----- 200 preamble + --boundary -------|   credential accepted
//!   |<----- jpeg part + --boundary ----------|
//!   |<----- jpeg part + --boundary ----------|
//!   |                 ...                    |
//!
//!   |<----- 401 Unauthorized, close ---------|   credential rejected
//! ```
//!
//! Only the request line is interpreted; headers and anything after them
//! are drained and ignored.

/// Boundary literal, shared by the constant and the compile-time headers
macro_rules! boundary {
    () => {
        "mjpegfanoutframeboundary"
    };
}

pub mod constants;
pub mod request;
pub mod response;

pub use request::{parse_request_line, RequestLine};
pub use response::{encode_frame, Timestamp, UNAUTHORIZED, WELCOME};
