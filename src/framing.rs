//! Length-prefixed message framing.
//!
//! Each frame is a 2-byte big-endian unsigned length followed by that many
//! payload bytes. Payloads longer than [`MAX_FRAME_LEN`] are rejected before
//! anything reaches the stream.
//!
//! No operation here retries: the first I/O error is returned to the caller.

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Width of the length prefix in bytes
pub const HEADER_LEN: usize = 2;

/// Largest payload the length prefix can describe
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame payload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}

/// Fixed payload sent on every connection
///
/// Only the size matters to the measurement, so one zero-filled buffer is
/// shared by all workers.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Arc<[u8]>,
}

impl Message {
    pub fn zeroed(size: usize) -> Self {
        Self {
            payload: vec![0u8; size].into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Sending side of a framed connection
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Write one frame carrying `payload`.
    ///
    /// Header and payload are assembled into one buffer, so a frame usually
    /// costs a single raw write; a short write costs more.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let len = u16::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
            size: payload.len(),
            max: MAX_FRAME_LEN,
        })?;

        self.buf.clear();
        self.buf.reserve(HEADER_LEN + payload.len());
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(payload);

        self.inner.write_all(&self.buf).await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

/// Receiving side of a framed connection
///
/// Reads are unbuffered: every frame takes at least one raw read for the
/// header and, for non-empty payloads, at least one more for the body.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Read one frame and return its payload.
    pub async fn receive(&mut self) -> Result<&[u8], FrameError> {
        let mut header = [0u8; HEADER_LEN];
        self.inner.read_exact(&mut header).await?;
        let len = u16::from_be_bytes(header) as usize;

        self.buf.resize(len, 0);
        if len > 0 {
            self.inner.read_exact(&mut self.buf).await?;
        }
        Ok(&self.buf)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}
