//! Ownership of one accepted TCP stream.
//!
//! All socket I/O in the framework funnels through this type. The retry
//! discipline lives here: transient kinds (`Interrupted`, `WouldBlock`) are
//! retried with exponential back-off up to the configured budget, a
//! zero-byte transfer means the peer is gone, and every other error kind is
//! fatal for the current operation. Back-off sleeps go through
//! `may::coroutine::sleep`, so only the calling coroutine yields.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use may::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{is_transient, HttpError};

const BACKOFF_BASE_MS: u64 = 10;

/// A connected socket with its receive timeout and retry budget.
///
/// Move-only: exactly one owner at a time. Closing is idempotent and also
/// happens on drop.
pub struct Connection {
    stream: TcpStream,
    receive_timeout: Duration,
    max_retry_count: usize,
    closed: bool,
}

impl Connection {
    /// Wrap an accepted stream and apply the per-receive timeout.
    pub fn new(
        stream: TcpStream,
        receive_timeout: Duration,
        max_retry_count: usize,
    ) -> io::Result<Self> {
        stream.set_read_timeout(Some(receive_timeout))?;
        Ok(Self {
            stream,
            receive_timeout,
            max_retry_count,
            closed: false,
        })
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// One successful read into `buf`. `Ok(0)` means the peer closed the
    /// connection. Transient errors are retried with back-off
    /// `10ms × 2^(k-1)` up to the retry budget.
    pub fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let mut retries = 0usize;
        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if is_transient(err.kind()) => {
                    retries += 1;
                    if retries > self.max_retry_count {
                        warn!(retries, "receive retries exhausted");
                        return Err(HttpError::RetriesExhausted);
                    }
                    may::coroutine::sleep(backoff_delay(retries));
                }
                Err(err) => return Err(HttpError::Io(err)),
            }
        }
    }

    /// One successful write from `buf`, returning the count actually sent
    /// (at least one byte). A zero-byte write means the peer is gone.
    pub fn send_some(&mut self, buf: &[u8]) -> Result<usize, HttpError> {
        let mut retries = 0usize;
        loop {
            match self.stream.write(buf) {
                Ok(0) => return Err(HttpError::PeerClosed),
                Ok(n) => return Ok(n),
                Err(err) if is_transient(err.kind()) => {
                    retries += 1;
                    if retries > self.max_retry_count {
                        warn!(retries, "send retries exhausted");
                        return Err(HttpError::RetriesExhausted);
                    }
                    may::coroutine::sleep(backoff_delay(retries));
                }
                Err(err) => return Err(HttpError::Io(err)),
            }
        }
    }

    /// Commit the whole buffer, looping over short writes.
    pub fn send_all(&mut self, buf: &[u8]) -> Result<usize, HttpError> {
        let mut sent = 0usize;
        while sent < buf.len() {
            sent += self.send_some(&buf[sent..])?;
        }
        Ok(sent)
    }

    /// Bounded idle wait. The read timeout is narrowed to `timeout` and one
    /// byte is pulled; the caller prepends it to its leftovers buffer so no
    /// data is lost. Returns `Ok(None)` when the wait expires or the peer
    /// closed, `Ok(Some(byte))` when data arrived.
    pub fn wait_for_data(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        self.stream.set_read_timeout(Some(timeout))?;
        let mut byte = [0u8; 1];
        let outcome = loop {
            match self.stream.read(&mut byte) {
                Ok(0) => {
                    debug!("connection closed by peer while idle");
                    break Ok(None);
                }
                Ok(_) => break Ok(Some(byte[0])),
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    break Ok(None);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => break Err(err),
            }
        };
        self.stream.set_read_timeout(Some(self.receive_timeout))?;
        outcome
    }

    /// Shut both directions down. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.closed = true;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn backoff_delay(retry: usize) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS << (retry - 1))
}
