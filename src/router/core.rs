//! The RESTful routing layer over the server core.

use std::io;
use std::net::ToSocketAddrs;
use std::sync::Arc;

use tracing::{info, warn};

use crate::body::{Body, MemoryBody};
use crate::config::ServerConfig;
use crate::cors::CorsPolicy;
use crate::http::{Method, Request, Response, StandardHeader, StatusCode, ALL_METHODS};
use crate::router::trie::{EndpointHandler, TrieNode};
use crate::runtime_config::RuntimeConfig;
use crate::server::{unix_timestamp, Server};

/// A RESTful HTTP server: endpoint registration into a path trie, then
/// trie-based dispatch with parameter capture.
///
/// Endpoints are registered before [`start`][RestServer::start]; `start`
/// freezes the trie and the CORS policy behind an `Arc`, installs one
/// dispatching handler per method slot on the core server, and blocks on
/// the event loop. The frozen trie is read concurrently by all workers
/// without locking.
pub struct RestServer {
    core: Arc<Server>,
    root: TrieNode,
    cors: CorsPolicy,
}

struct RouterShared {
    root: TrieNode,
    cors: CorsPolicy,
    server_name: String,
}

impl RestServer {
    /// Bind the listening endpoint with default runtime settings.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        name: impl Into<String>,
        config: ServerConfig,
    ) -> io::Result<Self> {
        Self::bind_with_runtime(addr, name, config, &RuntimeConfig::from_env())
    }

    pub fn bind_with_runtime<A: ToSocketAddrs>(
        addr: A,
        name: impl Into<String>,
        config: ServerConfig,
        runtime: &RuntimeConfig,
    ) -> io::Result<Self> {
        let core = Server::bind(addr, name, config, runtime)?;
        Ok(Self {
            core,
            root: TrieNode::new(),
            cors: CorsPolicy::default(),
        })
    }

    /// The underlying server core (statistics, shutdown, address).
    pub fn core(&self) -> Arc<Server> {
        self.core.clone()
    }

    pub fn set_cors_policy(&mut self, policy: CorsPolicy) {
        self.cors = policy;
    }

    /// Register a handler for `(path, method)`. Segments shaped `{name}`
    /// or `:name` match any non-`/` segment and are captured in order.
    ///
    /// # Panics
    ///
    /// Panics if the same `(path, method)` pair is registered twice.
    pub fn add_endpoint<H>(&mut self, path: &str, method: Method, handler: H)
    where
        H: Fn(Request, &[String]) -> Response + Send + Sync + 'static,
    {
        let normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self.root
            .insert(&normalized, method, Arc::new(handler) as EndpointHandler);
        info!(method = %method, path = %normalized, "endpoint registered");
    }

    /// Freeze the routing table, install the per-method dispatchers, and
    /// run the server on the calling thread.
    pub fn start(self) {
        let RestServer { core, root, cors } = self;
        let shared = Arc::new(RouterShared {
            root,
            cors,
            server_name: core.name().to_string(),
        });

        for method in ALL_METHODS {
            let shared = shared.clone();
            core.set_handler(method, move |request| {
                Some(dispatch(&shared, method, request))
            });
        }

        core.start_blocking();
    }
}

fn dispatch(shared: &RouterShared, method: Method, request: Request) -> Response {
    if method == Method::Unknown {
        return method_not_allowed(shared, &request.uri);
    }

    // The request target's query string plays no part in routing.
    let path = request
        .uri
        .split('?')
        .next()
        .unwrap_or("/")
        .to_string();

    match shared.root.lookup(&path) {
        Some((node, captures)) => match node.handler(method) {
            Some(handler) => {
                let mut response = handler(request, &captures);
                if !response.headers.has_std(StandardHeader::Server) {
                    response
                        .headers
                        .set_std(StandardHeader::Server, shared.server_name.clone());
                }
                response
            }
            None => unmatched(shared, method, &path),
        },
        None => unmatched(shared, method, &path),
    }
}

/// No endpoint matched: OPTIONS gets the preflight answer, everything else
/// a 404.
fn unmatched(shared: &RouterShared, method: Method, path: &str) -> Response {
    if method == Method::Options {
        preflight(shared)
    } else {
        not_found(shared, method, path)
    }
}

fn preflight(shared: &RouterShared) -> Response {
    let mut response = Response::new(StatusCode::Ok);
    response
        .headers
        .set_std(StandardHeader::Server, shared.server_name.clone());
    response
        .headers
        .set_std(StandardHeader::ContentLength, "0");
    shared.cors.apply(&mut response.headers);
    response
}

fn not_found(shared: &RouterShared, method: Method, path: &str) -> Response {
    warn!(method = %method, path = %path, "no route matched");
    error_response(shared, method, path, StatusCode::NotFound, "Resource not found")
}

fn method_not_allowed(shared: &RouterShared, path: &str) -> Response {
    warn!(path = %path, "request used an unknown method");
    error_response(
        shared,
        Method::Unknown,
        path,
        StatusCode::MethodNotAllowed,
        "Method not allowed",
    )
}

fn error_response(
    shared: &RouterShared,
    method: Method,
    path: &str,
    status: StatusCode,
    message: &str,
) -> Response {
    let payload = serde_json::json!({
        "error": {
            "code": status.code(),
            "message": message,
            "path": path,
            "method": method.as_str(),
        },
        "timestamp": unix_timestamp(),
    })
    .to_string();

    let mut response = Response::new(status);
    response
        .headers
        .set_std(StandardHeader::ContentType, "application/json");
    response
        .headers
        .set_std(StandardHeader::Server, shared.server_name.clone());
    response
        .headers
        .set_std(StandardHeader::ContentLength, payload.len().to_string());
    response.body = Some(Box::new(MemoryBody::from_bytes(payload.into_bytes())) as Box<dyn Body>);
    shared.cors.apply(&mut response.headers);
    response
}
