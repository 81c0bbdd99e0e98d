//! An HTTP/1.1 server framework with a RESTful routing layer.
//!
//! The wire level (parser, emitter, chunked framing), the per-connection
//! session loop, and the I/O dispatcher run on `may` coroutines; the
//! routing layer dispatches requests through a path trie with parameter
//! capture.

pub mod body;
pub mod config;
pub mod cors;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod net;
pub mod receiver;
pub mod router;
pub mod runtime_config;
pub mod sender;
pub mod server;
pub mod session;

pub use body::{Body, BodyKind, FileBody, MemoryBody};
pub use config::ServerConfig;
pub use cors::CorsPolicy;
pub use dispatcher::{IoDispatcher, SessionStats};
pub use error::HttpError;
pub use http::{Headers, Message, Method, Request, Response, StandardHeader, StatusCode};
pub use router::RestServer;
pub use runtime_config::RuntimeConfig;
pub use server::{Server, ServerStats};
pub use session::Session;
