//! Message-to-wire serialization.

use tracing::debug;

use crate::config::ServerConfig;
use crate::error::HttpError;
use crate::http::{Message, StandardHeader};
use crate::net::Connection;

/// Serialize and commit a message: first line, each header as
/// `name: value CRLF`, a terminating CRLF, then the body under whichever
/// transfer method the headers declare. Returns total bytes committed.
///
/// A message that carries a body but neither Content-Length nor
/// `Transfer-Encoding: chunked` fails with
/// [`HttpError::MissingTransferMethod`].
pub fn send_message(
    conn: &mut Connection,
    message: &mut Message,
    config: &ServerConfig,
) -> Result<u64, HttpError> {
    let mut head = message.first_line();
    for (name, value) in message.headers().iter() {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let mut sent = conn.send_all(head.as_bytes())? as u64;

    let content_length = match message.headers().get_std(StandardHeader::ContentLength) {
        Some(value) => Some(value.trim().parse::<usize>().map_err(|_| {
            HttpError::MalformedHeader(format!("Content-Length: {value}"))
        })?),
        None => None,
    };
    let chunked = message
        .headers()
        .get_std(StandardHeader::TransferEncoding)
        .map(|value| value.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);

    if let Some(body) = message.body_mut() {
        if let Some(size) = content_length {
            sent += body.send_sized(conn, size, config)?;
        } else if chunked {
            sent += body.send_chunked(conn, config)?;
        } else {
            return Err(HttpError::MissingTransferMethod);
        }
    }

    debug!(
        line = %message.first_line().trim_end(),
        bytes = sent,
        "message sent"
    );
    Ok(sent)
}
