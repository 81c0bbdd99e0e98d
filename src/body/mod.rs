//! Message payload storage.
//!
//! Two implementations share one capability set: [`MemoryBody`] buffers the
//! payload in a contiguous byte vector, [`FileBody`] streams it through a
//! bounded window into a file. The server picks between them per message,
//! based on the declared length and content type, before any body byte is
//! read.

mod chunked;
mod file;
mod memory;

pub use chunked::{ChunkDecoder, ChunkStatus};
pub use file::FileBody;
pub use memory::MemoryBody;

use std::io;

use crate::config::ServerConfig;
use crate::error::HttpError;
use crate::net::Connection;

/// Storage class of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    InMemory,
    FileBacked,
}

/// The payload capability set.
///
/// `receive_*` drive the connection's receive loop, consuming any carryover
/// bytes from `leftovers` first and leaving bytes past the message's end in
/// `leftovers` for the next exchange. `send_*` commit through the
/// retry-bounded sender. `send_chunked` is optional; the default fails, so
/// callers without an implementation must set Content-Length.
pub trait Body: Send {
    fn kind(&self) -> BodyKind;

    /// Payload size in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `buf.len()` bytes starting at `offset`, clamped to the
    /// payload's end. Returns the count actually read.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Replace the payload.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Extend the payload.
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Receive exactly `size` payload bytes (Content-Length framing).
    /// Returns the count read from the wire (carryover not included).
    fn receive_sized(
        &mut self,
        conn: &mut Connection,
        leftovers: &mut Vec<u8>,
        size: usize,
        config: &ServerConfig,
    ) -> Result<u64, HttpError>;

    /// Receive a chunked-framed payload until the zero-size terminator.
    /// Returns the count read from the wire (carryover not included).
    fn receive_chunked(
        &mut self,
        conn: &mut Connection,
        leftovers: &mut Vec<u8>,
        config: &ServerConfig,
    ) -> Result<u64, HttpError>;

    /// Send the payload under Content-Length framing.
    fn send_sized(
        &mut self,
        conn: &mut Connection,
        size: usize,
        config: &ServerConfig,
    ) -> Result<u64, HttpError>;

    /// Send the payload under chunked framing. Optional.
    fn send_chunked(
        &mut self,
        _conn: &mut Connection,
        _config: &ServerConfig,
    ) -> Result<u64, HttpError> {
        Err(HttpError::ChunkedSendUnsupported)
    }
}
