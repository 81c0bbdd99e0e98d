//! File-backed payload storage.
//!
//! Receives stream incoming octets through a bounded window straight into
//! the file; sends read the file back in 1 KiB windows, shifting any unsent
//! tail to the front of the window between iterations so short writes lose
//! nothing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::body::chunked::{ChunkDecoder, ChunkStatus};
use crate::body::{Body, BodyKind};
use crate::config::ServerConfig;
use crate::error::HttpError;
use crate::net::Connection;

const WINDOW_SIZE: usize = 1024;
const REFILL_THRESHOLD: usize = 256;

/// A body staged in a file.
///
/// A scratch body owns its file: the file is created (truncating any
/// previous content) when the body is constructed and removed when the body
/// is dropped. A named body wraps an existing file a handler supplied and
/// leaves it in place.
pub struct FileBody {
    file: File,
    path: PathBuf,
    size: u64,
    scratch: bool,
}

impl FileBody {
    /// Create a scratch body. The file is opened read/write/truncate and
    /// deleted on drop.
    pub fn scratch(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), "scratch body file created");
        Ok(Self {
            file,
            path,
            size: 0,
            scratch: true,
        })
    }

    /// Wrap an existing file as a body. The file survives the body.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            path,
            size,
            scratch: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileBody {
    fn drop(&mut self) {
        if self.scratch {
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Body for FileBody {
    fn kind(&self) -> BodyKind {
        BodyKind::FileBacked
    }

    fn len(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let want = buf.len().min((self.size - offset) as usize);
        let mut total = 0;
        while total < want {
            let n = self.file.read(&mut buf[total..want])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(data)?;
        self.size = data.len() as u64;
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)?;
        self.size += data.len() as u64;
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
        self.append(&leftovers[..carry])?;
        leftovers.drain(..carry);

        let mut remaining = size - carry;
        let mut window = vec![0u8; WINDOW_SIZE];
        let mut wire = 0u64;
        while remaining > 0 {
            let want = remaining.min(window.len());
            let n = conn.recv_some(&mut window[..want])?;
            if n == 0 {
                return Err(HttpError::PeerClosed);
            }
            self.append(&window[..n])?;
            remaining -= n;
            wire += n as u64;
        }
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
        if buf.len() < WINDOW_SIZE {
            buf.resize(WINDOW_SIZE, 0);
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

            // Spill decoded payload to the file once headroom runs low,
            // then reuse the whole window.
            if buf.len() - filled < REFILL_THRESHOLD {
                self.append(&buf[..write])?;
                buf.copy_within(read..filled, 0);
                filled -= read;
                read = 0;
                write = 0;
            }

            let n = conn.recv_some(&mut buf[filled..])?;
            if n == 0 {
                return Err(HttpError::PeerClosed);
            }
            filled += n;
            wire += n as u64;
        }

        self.append(&buf[..write])?;
        *leftovers = buf[read..filled].to_vec();
        Ok(wire)
    }

    fn send_sized(
        &mut self,
        conn: &mut Connection,
        _size: usize,
        config: &ServerConfig,
    ) -> Result<u64, HttpError> {
        if self.size as usize > config.max_body_size {
            return Err(HttpError::BodyTooLarge {
                size: self.size as usize,
                limit: config.max_body_size,
            });
        }

        self.file.seek(SeekFrom::Start(0))?;
        let mut window = vec![0u8; WINDOW_SIZE];
        let mut filled = self.file.read(&mut window)?;
        let mut total = 0u64;
        while filled > 0 {
            let sent = conn.send_some(&window[..filled])?;
            total += sent as u64;
            window.copy_within(sent..filled, 0);
            filled -= sent;
            filled += self.file.read(&mut window[filled..])?;
        }
        Ok(total)
    }
}
