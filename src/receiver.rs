//! Wire-to-message parsing.
//!
//! The receiver is purely functional over a connection plus a mutable
//! leftovers buffer: bytes read past the header terminator belong to the
//! body, and bytes past the body belong to the next request on a keep-alive
//! connection. Both survive in `leftovers` between calls, so nothing read
//! from the socket is ever dropped.

use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::body::Body;
use crate::config::ServerConfig;
use crate::dispatcher::{IoDispatcher, ParserCallback};
use crate::error::HttpError;
use crate::http::{Headers, Message, Method, Request, Response, StatusCode};
use crate::net::Connection;

/// Chooses the body implementation for a half-parsed message (headers only).
pub type BodyChooser = Arc<dyn Fn(&Message) -> io::Result<Box<dyn Body>> + Send + Sync>;

/// Initial size of the header accumulation buffer.
const HEADER_BUF_INITIAL: usize = 1024;

/// A successfully received message plus the wire bytes it consumed.
pub struct Received {
    pub message: Message,
    pub bytes_received: u64,
}

/// A failed receive still reports how many wire bytes were consumed, so
/// session statistics stay accurate for rejected messages.
#[derive(Debug)]
pub struct ReceiveError {
    pub error: HttpError,
    pub bytes_received: u64,
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ReceiveError {}

/// How the body of a parsed message is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMethod {
    /// No body follows the headers.
    None,
    /// Content-Length framing with the given octet count.
    Sized(usize),
    /// Transfer-Encoding: chunked.
    Chunked,
}

/// Receive one complete message: headers, then the body staged into the
/// implementation picked by `chooser`.
pub fn receive_message(
    conn: &mut Connection,
    leftovers: &mut Vec<u8>,
    chooser: &BodyChooser,
    config: &ServerConfig,
) -> Result<Received, ReceiveError> {
    let mut wire = 0u64;

    let head = read_header(conn, leftovers, config, &mut wire)?;
    let mut message = parse_head(&head, config).map_err(|error| fail(error, wire))?;

    let method = transfer_method(message.headers()).map_err(|error| fail(error, wire))?;
    match method {
        TransferMethod::None => {}
        TransferMethod::Sized(size) => {
            let mut body = chooser(&message).map_err(|e| fail(HttpError::Io(e), wire))?;
            wire += body
                .receive_sized(conn, leftovers, size, config)
                .map_err(|error| fail(error, wire))?;
            message.set_body(body);
        }
        TransferMethod::Chunked => {
            let mut body = chooser(&message).map_err(|e| fail(HttpError::Io(e), wire))?;
            wire += body
                .receive_chunked(conn, leftovers, config)
                .map_err(|error| fail(error, wire))?;
            message.set_body(body);
        }
    }

    debug!(
        line = %message.first_line().trim_end(),
        bytes = wire,
        "message received"
    );
    Ok(Received {
        message,
        bytes_received: wire,
    })
}

/// Receive a message on a worker coroutine. `consume` runs on the worker
/// with the outcome; the consumed byte count is then delivered through the
/// dispatcher's parser-completion queue, where `on_complete` runs inline on
/// the event thread.
pub fn receive_async<C>(
    dispatcher: &Arc<IoDispatcher>,
    mut conn: Connection,
    chooser: BodyChooser,
    config: Arc<ServerConfig>,
    consume: C,
    on_complete: ParserCallback,
) where
    C: FnOnce(Connection, Result<Received, ReceiveError>) + Send + 'static,
{
    let queue = dispatcher.clone();
    dispatcher.post(move || {
        let mut leftovers = Vec::new();
        let outcome = receive_message(&mut conn, &mut leftovers, &chooser, &config);
        let bytes = match &outcome {
            Ok(received) => received.bytes_received,
            Err(err) => {
                warn!(error = %err, "asynchronous receive failed");
                err.bytes_received
            }
        };
        consume(conn, outcome);
        queue.post_parser_callback(bytes as usize, on_complete);
    });
}

fn fail(error: HttpError, bytes_received: u64) -> ReceiveError {
    ReceiveError {
        error,
        bytes_received,
    }
}

/// Accumulate bytes until `CRLF CRLF`, growing the buffer by doubling
/// whenever headroom falls below a quarter of capacity. Returns the header
/// block including the terminator; trailing bytes stay in `leftovers`.
fn read_header(
    conn: &mut Connection,
    leftovers: &mut Vec<u8>,
    config: &ServerConfig,
    wire: &mut u64,
) -> Result<Vec<u8>, ReceiveError> {
    let mut buf = std::mem::take(leftovers);
    let mut filled = buf.len();
    if buf.len() < HEADER_BUF_INITIAL {
        buf.resize(HEADER_BUF_INITIAL, 0);
    }

    let mut scanned = 0usize;
    let header_end = loop {
        if let Some(pos) = find_terminator(&buf[..filled], scanned) {
            break pos;
        }
        scanned = filled.saturating_sub(3);

        if filled > config.max_header_size {
            return Err(fail(
                HttpError::HeaderTooLarge {
                    limit: config.max_header_size,
                },
                *wire,
            ));
        }
        if buf.len() - filled < buf.len() / 4 {
            let doubled = buf.len() * 2;
            buf.resize(doubled, 0);
        }

        let n = conn
            .recv_some(&mut buf[filled..])
            .map_err(|error| fail(error, *wire))?;
        if n == 0 {
            return Err(fail(HttpError::PeerClosed, *wire));
        }
        filled += n;
        *wire += n as u64;
    };

    let head_len = header_end + 4;
    *leftovers = buf[head_len..filled].to_vec();
    buf.truncate(head_len);
    Ok(buf)
}

fn find_terminator(haystack: &[u8], from: usize) -> Option<usize> {
    haystack[from..]
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + from)
}

/// Parse the start line and header lines of a header block (terminator
/// included). The returned message has headers but no body.
pub fn parse_head(block: &[u8], config: &ServerConfig) -> Result<Message, HttpError> {
    let mut lines = CrlfLines { rest: block }.peekable();

    let first = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| HttpError::BadStartLine(String::new()))?;
    let mut message = parse_start_line(first)?;

    parse_headers(&mut lines, message.headers_mut(), config)?;
    Ok(message)
}

fn parse_start_line(line: &[u8]) -> Result<Message, HttpError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| HttpError::BadStartLine(String::from_utf8_lossy(line).into_owned()))?;

    let mut tokens = line.split_ascii_whitespace();
    let first = tokens
        .next()
        .ok_or_else(|| HttpError::BadStartLine(line.to_string()))?;

    if first.starts_with("HTTP/") {
        // Response: version, code, then the rest of the line as the reason
        // (one delimiter space consumed, interior spaces preserved).
        validate_version(first)?;
        let rest = line[first.len()..].trim_start_matches(' ');
        let (code_token, reason) = match rest.find(' ') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };
        if code_token.is_empty() {
            return Err(HttpError::BadStartLine(line.to_string()));
        }
        let status = StatusCode::from_token(code_token);
        if status == StatusCode::Unknown {
            return Err(HttpError::UnknownStatus(code_token.to_string()));
        }
        if reason.is_empty() {
            return Err(HttpError::BadStartLine(line.to_string()));
        }

        let mut response = Response::new(status);
        response.version = first.to_string();
        response.reason = reason.to_string();
        Ok(Message::Response(response))
    } else {
        let method = Method::from_token(first);
        if method == Method::Unknown {
            return Err(HttpError::UnknownMethod(first.to_string()));
        }
        let uri = tokens
            .next()
            .ok_or_else(|| HttpError::BadStartLine(line.to_string()))?;
        let version = tokens
            .next()
            .ok_or_else(|| HttpError::BadStartLine(line.to_string()))?;
        validate_version(version)?;

        let mut request = Request::new(method, uri);
        request.version = version.to_string();
        Ok(Message::Request(request))
    }
}

fn validate_version(token: &str) -> Result<(), HttpError> {
    if token.len() != 8 || !token.starts_with("HTTP/1.") {
        return Err(HttpError::BadVersion(token.to_string()));
    }
    Ok(())
}

fn parse_headers<'a, I>(
    lines: &mut std::iter::Peekable<I>,
    headers: &mut Headers,
    config: &ServerConfig,
) -> Result<(), HttpError>
where
    I: Iterator<Item = &'a [u8]>,
{
    while let Some(line) = lines.next() {
        if line.is_empty() {
            return Ok(());
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| HttpError::MalformedHeader(String::from_utf8_lossy(line).into_owned()))?;
        let (name_bytes, rest) = line.split_at(colon);

        if name_bytes.is_empty() || name_bytes.len() > config.max_header_name_len {
            return Err(HttpError::MalformedHeader(
                String::from_utf8_lossy(name_bytes).into_owned(),
            ));
        }
        // Control characters, spaces, and DEL never appear in a field name.
        if name_bytes.iter().any(|&b| b <= 0x20 || b >= 0x7F) {
            return Err(HttpError::MalformedHeader(
                String::from_utf8_lossy(name_bytes).into_owned(),
            ));
        }
        let name = std::str::from_utf8(name_bytes).expect("field name is printable ASCII");

        let value_bytes = &rest[1..];
        let trimmed = value_bytes
            .iter()
            .position(|&b| b != b' ' && b != b'\t')
            .map_or(&[][..], |start| &value_bytes[start..]);
        let mut value = std::str::from_utf8(trimmed)
            .map_err(|_| HttpError::MalformedHeader(name.to_string()))?
            .to_string();
        if value.is_empty() {
            return Err(HttpError::MalformedHeader(name.to_string()));
        }

        // Folded continuation lines: leading whitespace joins the previous
        // value with a single space.
        while let Some(next) = lines.peek() {
            if !matches!(next.first(), Some(b' ' | b'\t')) {
                break;
            }
            let continuation = lines.next().expect("peeked line exists");
            let start = continuation
                .iter()
                .position(|&b| b != b' ' && b != b'\t')
                .unwrap_or(continuation.len());
            let folded = std::str::from_utf8(&continuation[start..])
                .map_err(|_| HttpError::MalformedHeader(name.to_string()))?;
            value.push(' ');
            value.push_str(folded);
            if value.len() > config.max_header_value_len {
                return Err(HttpError::MalformedHeader(name.to_string()));
            }
        }

        if value.len() > config.max_header_value_len {
            return Err(HttpError::MalformedHeader(name.to_string()));
        }
        headers.set(name, value);
    }
    Ok(())
}

/// Select the body framing from the parsed headers. Transfer-Encoding wins
/// over Content-Length; `"0"` and a missing Content-Length both mean no
/// body.
pub fn transfer_method(headers: &Headers) -> Result<TransferMethod, HttpError> {
    use crate::http::StandardHeader;

    if let Some(encoding) = headers.get_std(StandardHeader::TransferEncoding) {
        if !encoding.is_empty() {
            if encoding.eq_ignore_ascii_case("chunked") {
                return Ok(TransferMethod::Chunked);
            }
            return Err(HttpError::UnsupportedEncoding(encoding.to_string()));
        }
    }

    match headers.get_std(StandardHeader::ContentLength) {
        Some(value) if !value.is_empty() && value != "0" => {
            let size: usize = value
                .trim()
                .parse()
                .map_err(|_| HttpError::MalformedHeader(format!("Content-Length: {value}")))?;
            if size == 0 {
                Ok(TransferMethod::None)
            } else {
                Ok(TransferMethod::Sized(size))
            }
        }
        _ => Ok(TransferMethod::None),
    }
}

struct CrlfLines<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for CrlfLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => {
                let line = &self.rest[..pos];
                self.rest = &self.rest[pos + 2..];
                Some(line)
            }
            None => {
                let line = self.rest;
                self.rest = &[];
                Some(line)
            }
        }
    }
}
