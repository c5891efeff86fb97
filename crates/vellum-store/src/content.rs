//! Content streams
//!
//! Content is read fully into memory when it enters the repository. The read
//! is bounded by the configured limit, so an oversized source is rejected
//! without buffering more than `limit + 1` bytes.

use std::io::{Cursor, Read};
use std::sync::Arc;

use vellum_core::{InvalidArgument, Result, VellumError};

/// Content attached to a document version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStream {
    filename: String,
    mime_type: String,
    data: Arc<[u8]>,
}

impl ContentStream {
    /// Create a stream from bytes already in memory
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a stream from `source`, failing when it exceeds `limit` bytes
    pub fn from_reader(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        source: impl Read,
        limit: u64,
    ) -> Result<Self> {
        let mut data = Vec::new();
        source.take(limit.saturating_add(1)).read_to_end(&mut data)?;
        if data.len() as u64 > limit {
            return Err(VellumError::invalid(InvalidArgument::ContentTooLarge { limit }));
        }
        Ok(Self::new(filename, mime_type, data))
    }

    /// File name
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Length in bytes
    pub fn length(&self) -> u64 {
        self.data.len() as u64
    }

    /// Raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Fresh reader over the content
    pub fn reader(&self) -> impl Read + '_ {
        Cursor::new(&self.data[..])
    }

    /// Fail when the stream exceeds `limit` bytes
    pub fn ensure_within(&self, limit: u64) -> Result<()> {
        if self.length() > limit {
            return Err(VellumError::invalid(InvalidArgument::ContentTooLarge { limit }));
        }
        Ok(())
    }
}
