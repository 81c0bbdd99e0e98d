use std::fmt;
use std::io;

/// Error raised while receiving, parsing, or sending an HTTP/1.1 message.
///
/// Protocol violations and transport failures share one type so the session
/// loop can treat every failed exchange uniformly: log it, close the
/// connection, report the statistics gathered so far. Raw OS error codes
/// never escape; they arrive wrapped in [`HttpError::Io`].
#[derive(Debug)]
pub enum HttpError {
    /// The accumulated header section exceeded the configured cap.
    HeaderTooLarge { limit: usize },
    /// A declared or decoded body exceeded the configured cap.
    BodyTooLarge { size: usize, limit: usize },
    /// Transfer-Encoding other than `chunked`.
    UnsupportedEncoding(String),
    /// A chunk's payload did not end where its size line promised.
    ChunkSizeMismatch { declared: usize },
    /// Malformed chunked framing (bad size line, missing CRLF, trailers).
    MalformedChunk(&'static str),
    /// This body type cannot emit chunked framing; set Content-Length.
    ChunkedSendUnsupported,
    /// The start line did not parse as a request or a response.
    BadStartLine(String),
    /// Request method not in the method table.
    UnknownMethod(String),
    /// Response status code not in the status table.
    UnknownStatus(String),
    /// Version token other than `HTTP/1.<n>`.
    BadVersion(String),
    /// A header line violated the name/value grammar or a length cap.
    MalformedHeader(String),
    /// A body was attached without Content-Length or a chunked encoding.
    MissingTransferMethod,
    /// The peer closed the connection mid-message.
    PeerClosed,
    /// Transient I/O errors persisted past the retry budget.
    RetriesExhausted,
    Io(io::Error),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::HeaderTooLarge { limit } => {
                write!(f, "header section exceeds {} KiB limit", limit / 1024)
            }
            HttpError::BodyTooLarge { size, limit } => write!(
                f,
                "body size {} KiB exceeds {} KiB limit",
                size / 1024,
                limit / 1024
            ),
            HttpError::UnsupportedEncoding(value) => {
                write!(f, "unsupported Transfer-Encoding: {value}")
            }
            HttpError::ChunkSizeMismatch { declared } => write!(
                f,
                "chunk data does not match declared size of {declared} bytes"
            ),
            HttpError::MalformedChunk(reason) => write!(f, "malformed chunked framing: {reason}"),
            HttpError::ChunkedSendUnsupported => {
                write!(f, "chunked send is not supported by this body type")
            }
            HttpError::BadStartLine(line) => write!(f, "invalid start line: {line}"),
            HttpError::UnknownMethod(token) => write!(f, "unknown request method: {token}"),
            HttpError::UnknownStatus(token) => write!(f, "unknown status code: {token}"),
            HttpError::BadVersion(token) => write!(f, "invalid HTTP version: {token}"),
            HttpError::MalformedHeader(line) => write!(f, "invalid header: {line}"),
            HttpError::MissingTransferMethod => {
                write!(f, "no transfer method specified for the body")
            }
            HttpError::PeerClosed => write!(f, "connection closed by peer"),
            HttpError::RetriesExhausted => write!(f, "max retries exceeded"),
            HttpError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        HttpError::Io(err)
    }
}

/// Transient kinds are retried with exponential back-off; everything else
/// is fatal for the operation that observed it.
pub fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}

/// True for error kinds that abort the whole session rather than a single
/// call: resets, aborts, disconnects, timeouts, unreachable peers.
pub fn is_transport_fatal(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(is_transient(io::ErrorKind::Interrupted));
        assert!(is_transient(io::ErrorKind::WouldBlock));
        assert!(!is_transient(io::ErrorKind::ConnectionReset));
        assert!(!is_transient(io::ErrorKind::TimedOut));
    }

    #[test]
    fn fatal_kinds() {
        assert!(is_transport_fatal(io::ErrorKind::ConnectionReset));
        assert!(is_transport_fatal(io::ErrorKind::TimedOut));
        assert!(!is_transport_fatal(io::ErrorKind::Interrupted));
    }

    #[test]
    fn io_errors_wrap() {
        let err = HttpError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, HttpError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
