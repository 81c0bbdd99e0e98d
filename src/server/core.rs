//! The server core: accept chaining, session minting, body-type choice,
//! and the default handler table.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, warn};

use crate::body::{Body, FileBody, MemoryBody};
use crate::config::ServerConfig;
use crate::dispatcher::{AcceptCallback, IoDispatcher};
use crate::http::{Message, Method, Request, Response, StandardHeader, StatusCode};
use crate::receiver::BodyChooser;
use crate::runtime_config::RuntimeConfig;
use crate::session::{MessageHandler, Session};

/// Handles one request; `None` closes the connection.
pub type RequestHandler = Arc<dyn Fn(Request) -> Option<Response> + Send + Sync>;

/// Handles an inbound response message (protocol misuse by the client).
pub type ResponseHandler = Arc<dyn Fn(Response) -> Option<Response> + Send + Sync>;

/// Content types the body chooser knows beyond `text/plain`.
const RECOGNIZED_CONTENT_TYPES: [&str; 3] = [
    "application/json",
    "application/x-www-form-urlencoded",
    "application/octet-stream",
];

/// A point-in-time copy of the server's counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ServerStats {
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub total_requests: u64,
    pub active_sessions: u64,
}

#[derive(Default)]
struct Totals {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    requests: AtomicU64,
    active_sessions: AtomicU64,
}

/// The HTTP server: binds the acceptor, mints sessions, chooses body
/// storage, and dispatches messages through the per-method handler table.
pub struct Server {
    dispatcher: Arc<IoDispatcher>,
    acceptor: Arc<super::Acceptor>,
    name: String,
    config: Arc<ServerConfig>,
    scratch_counter: AtomicU64,
    session_counter: AtomicU64,
    totals: Totals,
    handlers: RwLock<[Option<RequestHandler>; Method::COUNT]>,
    response_handler: RwLock<ResponseHandler>,
}

impl Server {
    /// Bind the listening endpoint and assemble the server. Bind failures
    /// (`AddrInUse`, `InvalidInput`) propagate.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        name: impl Into<String>,
        config: ServerConfig,
        runtime: &RuntimeConfig,
    ) -> io::Result<Arc<Self>> {
        let name = name.into();
        let config = Arc::new(config);
        let dispatcher = Arc::new(IoDispatcher::new(runtime));
        let acceptor = Arc::new(super::Acceptor::bind(addr, dispatcher.clone(), &config)?);

        let server = Arc::new(Self {
            dispatcher,
            acceptor,
            response_handler: RwLock::new(default_response_handler(name.clone())),
            name,
            config,
            scratch_counter: AtomicU64::new(0),
            session_counter: AtomicU64::new(0),
            totals: Totals::default(),
            handlers: RwLock::new(std::array::from_fn(|_| None)),
        });
        Ok(server)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    pub fn dispatcher(&self) -> &Arc<IoDispatcher> {
        &self.dispatcher
    }

    /// Install the handler for one method slot.
    pub fn set_handler(
        &self,
        method: Method,
        handler: impl Fn(Request) -> Option<Response> + Send + Sync + 'static,
    ) {
        self.handlers.write().expect("handler table poisoned")[method.index()] =
            Some(Arc::new(handler));
    }

    /// Replace the handler for inbound response messages.
    pub fn set_response_handler(
        &self,
        handler: impl Fn(Response) -> Option<Response> + Send + Sync + 'static,
    ) {
        *self.response_handler.write().expect("handler poisoned") = Arc::new(handler);
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_bytes_sent: self.totals.bytes_sent.load(Ordering::Relaxed),
            total_bytes_received: self.totals.bytes_received.load(Ordering::Relaxed),
            total_requests: self.totals.requests.load(Ordering::Relaxed),
            active_sessions: self.totals.active_sessions.load(Ordering::Relaxed),
        }
    }

    /// Arm the accept chain and run the event loop on the calling thread.
    pub fn start_blocking(self: &Arc<Self>) {
        self.accept();
        self.dispatcher.run();
    }

    /// Stop the event loop. In-flight sessions run to completion.
    pub fn stop(&self) {
        self.dispatcher.stop();
    }

    /// Chained accept: every accepted connection re-arms accept, then a
    /// session is minted and started on the worker pool. The completion
    /// callback folds the session's statistics into the server totals on
    /// the event thread.
    fn accept(self: &Arc<Self>) {
        let server = self.clone();
        let on_connect: AcceptCallback = Arc::new(move |conn| {
            server.accept();
            server.totals.active_sessions.fetch_add(1, Ordering::Relaxed);

            let id = server.session_counter.fetch_add(1, Ordering::Relaxed);
            let session = Session::new(
                conn,
                server.body_chooser(),
                server.message_handler(),
                server.config.clone(),
                id,
            );

            let totals_server = server.clone();
            session.start_async(
                &server.dispatcher,
                Box::new(move |stats| {
                    let totals = &totals_server.totals;
                    totals.bytes_sent.fetch_add(stats.bytes_sent, Ordering::Relaxed);
                    totals
                        .bytes_received
                        .fetch_add(stats.bytes_received, Ordering::Relaxed);
                    totals.requests.fetch_add(stats.iterations, Ordering::Relaxed);
                    totals.active_sessions.fetch_sub(1, Ordering::Relaxed);
                    debug!(
                        iterations = stats.iterations,
                        bytes_sent = stats.bytes_sent,
                        bytes_received = stats.bytes_received,
                        "session statistics folded into totals"
                    );
                }),
            );
        });
        self.acceptor.async_accept(on_connect);
    }

    fn body_chooser(self: &Arc<Self>) -> BodyChooser {
        let server = self.clone();
        Arc::new(move |message| server.choose_body(message))
    }

    fn message_handler(self: &Arc<Self>) -> MessageHandler {
        let server = self.clone();
        Arc::new(move |message| server.handle_message(message))
    }

    /// Pick body storage for a half-parsed message: chunked transfers have
    /// unknown length and spill to a scratch file; `text/plain` and
    /// unrecognized content types stay in memory; recognized types spill
    /// once the declared length crosses the threshold.
    pub fn choose_body(&self, message: &Message) -> io::Result<Box<dyn Body>> {
        let headers = message.headers();

        let chunked = headers
            .get_std(StandardHeader::TransferEncoding)
            .map(|value| value.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        if chunked {
            return Ok(Box::new(self.scratch_body()?));
        }

        let declared_len = headers
            .get_std(StandardHeader::ContentLength)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        match headers.get_std(StandardHeader::ContentType) {
            Some(content_type)
                if content_type != "text/plain" && recognized_content_type(content_type) =>
            {
                if declared_len > self.config.spill_threshold {
                    Ok(Box::new(self.scratch_body()?))
                } else {
                    Ok(Box::new(MemoryBody::new()))
                }
            }
            Some(_) => Ok(Box::new(MemoryBody::new())),
            None => {
                if declared_len > self.config.spill_threshold {
                    Ok(Box::new(self.scratch_body()?))
                } else {
                    Ok(Box::new(MemoryBody::new()))
                }
            }
        }
    }

    /// Create a uniquely named scratch file body under the scratch
    /// directory.
    fn scratch_body(&self) -> io::Result<FileBody> {
        let n = self.scratch_counter.fetch_add(1, Ordering::Relaxed);
        std::fs::create_dir_all(&self.config.scratch_dir)?;
        FileBody::scratch(self.config.scratch_dir.join(format!("Temporary{n}.bin")))
    }

    /// Route a received message through the handler table.
    pub fn handle_message(&self, message: Message) -> Option<Message> {
        match message {
            Message::Request(request) => {
                let slot =
                    self.handlers.read().expect("handler table poisoned")[request.method.index()]
                        .clone();
                match slot {
                    Some(handler) => handler(request).map(Message::Response),
                    None => {
                        warn!(method = %request.method, uri = %request.uri, "no handler installed");
                        None
                    }
                }
            }
            Message::Response(response) => {
                let handler = self
                    .response_handler
                    .read()
                    .expect("handler poisoned")
                    .clone();
                handler(response).map(Message::Response)
            }
        }
    }
}

fn recognized_content_type(content_type: &str) -> bool {
    RECOGNIZED_CONTENT_TYPES.contains(&content_type)
        || content_type.starts_with("multipart/form-data")
}

/// Inbound response messages are protocol misuse; answer with a 400
/// describing the problem.
fn default_response_handler(server_name: String) -> ResponseHandler {
    Arc::new(move |received: Response| {
        warn!(status = %received.status, "received a response where a request was expected");
        let payload = serde_json::json!({
            "error": {
                "code": StatusCode::BadRequest.code(),
                "message": "Protocol misuse: received HTTP response instead of request",
                "expected": "HTTP request starting with method (GET, POST, PUT, etc.)",
                "documentation": "https://tools.ietf.org/html/rfc7230#section-3",
            },
            "timestamp": unix_timestamp(),
        })
        .to_string();

        let mut response = Response::new(StatusCode::BadRequest);
        response
            .headers
            .set_std(StandardHeader::ContentType, "application/json");
        response
            .headers
            .set_std(StandardHeader::Server, server_name.clone());
        response
            .headers
            .set_std(StandardHeader::ContentLength, payload.len().to_string());
        response.body = Some(Box::new(MemoryBody::from_bytes(payload.into_bytes())) as Box<dyn Body>);
        Some(response)
    })
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
