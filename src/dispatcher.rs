//! The I/O dispatcher: a coroutine worker pool plus three completion
//! queues.
//!
//! Heavy work (accept syscalls, whole session loops, asynchronous receives)
//! runs on `may` worker coroutines via [`IoDispatcher::post`]. Completions
//! flow back through three `may::sync::mpsc` queues — accept, parser, and
//! session — which [`IoDispatcher::run`] drains on the calling (event)
//! thread, executing each dequeued callback inline. Callbacks must not
//! block indefinitely; the worker pool is the place for that.
//!
//! `may::sync::mpsc` has no `recv_timeout`, so the drain loop polls all
//! three queues with `try_recv` and naps 50 ms when every queue is empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use may::sync::mpsc;
use serde::Serialize;
use tracing::{debug, error};

use crate::net::Connection;
use crate::runtime_config::RuntimeConfig;

/// How long the event thread naps when all queues are empty.
const DRAIN_WAIT: Duration = Duration::from_millis(50);

/// Byte and iteration counters a session hands back on completion.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub iterations: u64,
}

/// Runs on the event thread for each accepted connection. Shared (`Arc`)
/// because a failed accept re-posts the same callback.
pub type AcceptCallback = std::sync::Arc<dyn Fn(Connection) + Send + Sync>;

/// Runs on the event thread with the byte count of a finished receive.
pub type ParserCallback = Box<dyn FnOnce(usize) + Send>;

/// Runs on the event thread with a completed session's statistics.
pub type SessionCallback = Box<dyn FnOnce(SessionStats) + Send>;

/// Worker pool plus completion queues driving the event loop.
pub struct IoDispatcher {
    running: AtomicBool,
    stack_size: usize,
    accept_tx: mpsc::Sender<(Connection, AcceptCallback)>,
    accept_rx: mpsc::Receiver<(Connection, AcceptCallback)>,
    parser_tx: mpsc::Sender<(usize, ParserCallback)>,
    parser_rx: mpsc::Receiver<(usize, ParserCallback)>,
    session_tx: mpsc::Sender<(SessionStats, SessionCallback)>,
    session_rx: mpsc::Receiver<(SessionStats, SessionCallback)>,
}

impl IoDispatcher {
    /// Create a dispatcher and size the coroutine runtime's worker pool.
    /// Must happen before the first coroutine is spawned.
    pub fn new(runtime: &RuntimeConfig) -> Self {
        may::config()
            .set_workers(runtime.worker_threads)
            .set_stack_size(runtime.stack_size);

        let (accept_tx, accept_rx) = mpsc::channel();
        let (parser_tx, parser_rx) = mpsc::channel();
        let (session_tx, session_rx) = mpsc::channel();
        Self {
            running: AtomicBool::new(false),
            stack_size: runtime.stack_size,
            accept_tx,
            accept_rx,
            parser_tx,
            parser_rx,
            session_tx,
            session_rx,
        }
    }

    /// Spawn a generic task on the worker pool.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let builder = may::coroutine::Builder::new().stack_size(self.stack_size);
        // SAFETY: the spawned closures do not touch thread-local storage,
        // which is the may runtime's requirement for coroutine spawning.
        let spawned = unsafe { builder.spawn(task) };
        if let Err(err) = spawned {
            error!(error = %err, "failed to spawn worker coroutine");
        }
    }

    pub fn post_accept_callback(&self, conn: Connection, callback: AcceptCallback) {
        let _ = self.accept_tx.send((conn, callback));
    }

    pub fn post_parser_callback(&self, bytes: usize, callback: ParserCallback) {
        let _ = self.parser_tx.send((bytes, callback));
    }

    pub fn post_session_callback(&self, stats: SessionStats, callback: SessionCallback) {
        let _ = self.session_tx.send((stats, callback));
    }

    /// Drain the completion queues until [`stop`][Self::stop] is called.
    /// Each dequeued callback executes inline on the calling thread.
    pub fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        debug!("event loop started");
        while self.running.load(Ordering::SeqCst) {
            let mut idle = true;
            while let Ok((conn, callback)) = self.accept_rx.try_recv() {
                idle = false;
                callback(conn);
            }
            while let Ok((bytes, callback)) = self.parser_rx.try_recv() {
                idle = false;
                callback(bytes);
            }
            while let Ok((stats, callback)) = self.session_rx.try_recv() {
                idle = false;
                callback(stats);
            }
            if idle {
                std::thread::sleep(DRAIN_WAIT);
            }
        }
        debug!("event loop stopped");
    }

    /// Flip the run flag. The drain loop exits within one wait interval;
    /// in-flight coroutines finish on the runtime (there is no cooperative
    /// cancellation).
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_stats_default_to_zero() {
        let stats = SessionStats::default();
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn stats_serialize_for_reporting() {
        let stats = SessionStats {
            bytes_sent: 10,
            bytes_received: 20,
            iterations: 2,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["bytes_sent"], 10);
        assert_eq!(json["iterations"], 2);
    }
}
