//! In-memory payload storage.

use std::io;

use crate::body::chunked::{ChunkDecoder, ChunkStatus};
use crate::body::{Body, BodyKind};
use crate::config::ServerConfig;
use crate::error::HttpError;
use crate::net::Connection;

/// Low-water mark: refill the decode buffer before headroom drops below this.
const REFILL_THRESHOLD: usize = 256;

/// A body held in one contiguous buffer.
#[derive(Default)]
pub struct MemoryBody {
    data: Vec<u8>,
}

impl MemoryBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Body for MemoryBody {
    fn kind(&self) -> BodyKind {
        BodyKind::InMemory
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let available = buf.len().min(self.data.len() - offset);
        buf[..available].copy_from_slice(&self.data[offset..offset + available]);
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.data.clear();
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn receive_sized(
        &mut self,
        conn: &mut Connection,
        leftovers: &mut Vec<u8>,
        size: usize,
        config: &ServerConfig,
    ) -> Result<u64, HttpError> {
        if size > config.max_body_size {
            return Err(HttpError::BodyTooLarge {
                size,
                limit: config.max_body_size,
            });
        }

        let carry = leftovers.len().min(size);
        let mut data = Vec::with_capacity(size);
        data.extend_from_slice(&leftovers[..carry]);
        leftovers.drain(..carry);

        let mut filled = data.len();
        data.resize(size, 0);

        let mut wire = 0u64;
        while filled < size {
            let n = conn.recv_some(&mut data[filled..])?;
            if n == 0 {
                return Err(HttpError::PeerClosed);
            }
            filled += n;
            wire += n as u64;
        }

        self.data = data;
        Ok(wire)
    }

    fn receive_chunked(
        &mut self,
        conn: &mut Connection,
        leftovers: &mut Vec<u8>,
        config: &ServerConfig,
    ) -> Result<u64, HttpError> {
        let mut buf = std::mem::take(leftovers);
        let mut filled = buf.len();
        if buf.len() < 1024 {
            buf.resize(1024, 0);
        }

        let mut decoder = ChunkDecoder::new();
        let (mut read, mut write) = (0usize, 0usize);
        let mut wire = 0u64;

        loop {
            let status = decoder.decode(&mut buf, &mut read, &mut write, filled)?;
            if decoder.decoded_len() > config.max_body_size {
                return Err(HttpError::BodyTooLarge {
                    size: decoder.decoded_len(),
                    limit: config.max_body_size,
                });
            }
            if status == ChunkStatus::Done {
                break;
            }

            // Reclaim the framing bytes the decoder stripped, then grow
            // geometrically once headroom runs low.
            buf.copy_within(read..filled, write);
            filled = write + (filled - read);
            read = write;
            if buf.len() - filled < REFILL_THRESHOLD {
                let doubled = buf.len() * 2;
                buf.resize(doubled, 0);
            }

            let n = conn.recv_some(&mut buf[filled..])?;
            if n == 0 {
                return Err(HttpError::PeerClosed);
            }
            filled += n;
            wire += n as u64;
        }

        *leftovers = buf[read..filled].to_vec();
        buf.truncate(write);
        self.data = buf;
        Ok(wire)
    }

    fn send_sized(
        &mut self,
        conn: &mut Connection,
        _size: usize,
        config: &ServerConfig,
    ) -> Result<u64, HttpError> {
        if self.data.len() > config.max_body_size {
            return Err(HttpError::BodyTooLarge {
                size: self.data.len(),
                limit: config.max_body_size,
            });
        }
        Ok(conn.send_all(&self.data)? as u64)
    }
}
