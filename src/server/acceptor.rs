//! Ownership of the listening endpoint.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use may::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::dispatcher::{AcceptCallback, IoDispatcher};
use crate::net::Connection;

/// Owns the listen socket and produces configured connections.
///
/// The acceptor is single-threaded by construction: each
/// [`async_accept`][Acceptor::async_accept] posts exactly one accept task,
/// and the next one is armed only from the accept callback, so one accept
/// attempt is in flight at a time.
pub struct Acceptor {
    listener: TcpListener,
    dispatcher: Arc<IoDispatcher>,
    receive_timeout: Duration,
    max_retry_count: usize,
}

impl Acceptor {
    /// Bind the listening endpoint. `AddrInUse` and `InvalidInput` surface
    /// to the caller.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        dispatcher: Arc<IoDispatcher>,
        config: &ServerConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            dispatcher,
            receive_timeout: config.receive_timeout,
            max_retry_count: config.max_retry_count,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Post one accept attempt to the worker pool. The accepted connection
    /// is configured (per-receive timeout applied) and enqueued on the
    /// dispatcher's accept-completion queue together with `on_connect`. On
    /// failure the task re-posts itself.
    pub fn async_accept(self: &Arc<Self>, on_connect: AcceptCallback) {
        let acceptor = self.clone();
        self.dispatcher.post(move || match acceptor.listener.accept() {
            Ok((stream, peer)) => {
                match Connection::new(stream, acceptor.receive_timeout, acceptor.max_retry_count) {
                    Ok(conn) => {
                        debug!(peer = %peer, "connection accepted");
                        acceptor.dispatcher.post_accept_callback(conn, on_connect);
                    }
                    Err(err) => {
                        error!(peer = %peer, error = %err, "failed to configure accepted connection");
                        acceptor.async_accept(on_connect);
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "accept failed");
                acceptor.async_accept(on_connect);
            }
        });
    }
}
