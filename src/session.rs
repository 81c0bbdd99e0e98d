//! Per-connection session: the receive → handle → send loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::body::{Body, MemoryBody};
use crate::config::ServerConfig;
use crate::dispatcher::{IoDispatcher, SessionCallback, SessionStats};
use crate::error::HttpError;
use crate::http::{Message, Response, StandardHeader, StatusCode};
use crate::net::Connection;
use crate::receiver::{receive_message, BodyChooser};
use crate::sender::send_message;
use crate::server::unix_timestamp;

/// Produces the response for a received message. Runs synchronously on the
/// session's worker coroutine; returning `None` closes the connection.
pub type MessageHandler = Arc<dyn Fn(Message) -> Option<Message> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Receiving,
    Handling,
    Sending,
    Done,
}

/// One accepted connection and its loop state.
///
/// The session owns its connection, leftovers buffer, and statistics
/// exclusively; [`start_async`][Session::start_async] moves the whole
/// session into the posted task, so no shared ownership is needed for the
/// callback chain.
pub struct Session {
    conn: Connection,
    leftovers: Vec<u8>,
    body_chooser: BodyChooser,
    handler: MessageHandler,
    config: Arc<ServerConfig>,
    id: u64,
    stats: SessionStats,
}

impl Session {
    pub fn new(
        conn: Connection,
        body_chooser: BodyChooser,
        handler: MessageHandler,
        config: Arc<ServerConfig>,
        id: u64,
    ) -> Self {
        Self {
            conn,
            leftovers: Vec::new(),
            body_chooser,
            handler,
            config,
            id,
            stats: SessionStats::default(),
        }
    }

    /// Run the loop to completion and return the session's statistics.
    ///
    /// Each iteration: bounded idle wait, receive, handle, send. The loop
    /// ends when the idle wait expires, the peer goes away, an exchange
    /// fails, or the request did not ask for keep-alive.
    pub fn run(mut self) -> SessionStats {
        let mut state = SessionState::Idle;
        debug!(session_id = self.id, "session started");

        loop {
            state = self.transition(state, SessionState::Idle);
            if self.leftovers.is_empty() {
                match self.conn.wait_for_data(self.config.idle_timeout) {
                    Ok(Some(byte)) => {
                        self.leftovers.push(byte);
                        self.stats.bytes_received += 1;
                    }
                    Ok(None) => {
                        debug!(session_id = self.id, "idle timeout, closing");
                        break;
                    }
                    Err(err) => {
                        warn!(session_id = self.id, error = %err, "idle wait failed");
                        break;
                    }
                }
            }

            state = self.transition(state, SessionState::Receiving);
            let received = match receive_message(
                &mut self.conn,
                &mut self.leftovers,
                &self.body_chooser,
                &self.config,
            ) {
                Ok(received) => {
                    self.stats.bytes_received += received.bytes_received;
                    received
                }
                Err(err) => {
                    self.stats.bytes_received += err.bytes_received;
                    match err.error {
                        HttpError::PeerClosed => {
                            debug!(session_id = self.id, "connection closed by peer")
                        }
                        error => warn!(
                            session_id = self.id,
                            state = ?state,
                            error = %error,
                            "receive failed, closing connection"
                        ),
                    }
                    break;
                }
            };

            let keep_alive = received
                .message
                .headers()
                .get_std(StandardHeader::Connection)
                .map(|value| value.eq_ignore_ascii_case("keep-alive"))
                .unwrap_or(false);

            state = self.transition(state, SessionState::Handling);
            let handler = self.handler.clone();
            let (response, panicked) =
                match catch_unwind(AssertUnwindSafe(|| handler(received.message))) {
                    Ok(response) => (response, false),
                    Err(panic) => {
                        error!(
                            session_id = self.id,
                            panic_message = ?panic,
                            "handler panicked"
                        );
                        (Some(panic_response(&panic)), true)
                    }
                };

            state = self.transition(state, SessionState::Sending);
            match response {
                Some(mut response) => {
                    match send_message(&mut self.conn, &mut response, &self.config) {
                        Ok(sent) => self.stats.bytes_sent += sent,
                        Err(err) => {
                            warn!(
                                session_id = self.id,
                                state = ?state,
                                error = %err,
                                "send failed, closing connection"
                            );
                            break;
                        }
                    }
                }
                None => {
                    warn!(session_id = self.id, "handler produced no response, closing");
                    break;
                }
            }
            self.stats.iterations += 1;

            if panicked || !keep_alive {
                break;
            }
        }

        self.transition(state, SessionState::Done);
        self.conn.close();
        debug!(
            session_id = self.id,
            iterations = self.stats.iterations,
            bytes_sent = self.stats.bytes_sent,
            bytes_received = self.stats.bytes_received,
            "session ended"
        );
        self.stats
    }

    fn transition(&self, from: SessionState, to: SessionState) -> SessionState {
        trace!(session_id = self.id, from = ?from, to = ?to, "session state");
        to
    }

    /// Run the loop on a worker coroutine. On completion the statistics and
    /// `on_complete` are enqueued on the dispatcher's session-completion
    /// queue.
    pub fn start_async(self, dispatcher: &Arc<IoDispatcher>, on_complete: SessionCallback) {
        let queue = dispatcher.clone();
        dispatcher.post(move || {
            let stats = self.run();
            queue.post_session_callback(stats, on_complete);
        });
    }
}

/// The 500 sent when a handler panics; the connection closes after it.
fn panic_response(panic: &(dyn std::any::Any + Send)) -> Message {
    let details = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    let payload = serde_json::json!({
        "error": {
            "code": StatusCode::InternalServerError.code(),
            "message": "Handler failed while processing the request",
            "details": details,
        },
        "timestamp": unix_timestamp(),
    })
    .to_string();

    let mut response = Response::new(StatusCode::InternalServerError);
    response
        .headers
        .set_std(StandardHeader::ContentType, "application/json");
    response
        .headers
        .set_std(StandardHeader::ContentLength, payload.len().to_string());
    response.body = Some(Box::new(MemoryBody::from_bytes(payload.into_bytes())) as Box<dyn Body>);
    Message::Response(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_response_is_a_json_500() {
        let panic: Box<dyn std::any::Any + Send> = Box::new("boom".to_string());
        let message = panic_response(panic.as_ref());
        match message {
            Message::Response(res) => {
                assert_eq!(res.status, StatusCode::InternalServerError);
                assert_eq!(
                    res.headers.get_std(StandardHeader::ContentType),
                    Some("application/json")
                );
                let body = res.body.expect("panic response carries a body");
                assert!(body.len() > 0);
            }
            Message::Request(_) => panic!("expected a response"),
        }
    }
}
