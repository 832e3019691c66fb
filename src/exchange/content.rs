//! Bounded request content.
//!
//! Content is read into a list of fixed-size buffers. The list never grows
//! past `1 + max_content_size / buffer_size` buffers, and reading stops as
//! soon as the total would exceed `max_content_size`.

use std::convert::Infallible;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::error::GatewayError;

pub const DEFAULT_MAX_CONTENT_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Size limits applied to request and response content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    max_content_size: usize,
    buffer_size: usize,
}

impl ContentLimits {
    pub fn new(max_content_size: usize, buffer_size: usize) -> Self {
        Self {
            max_content_size,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn max_content_size(&self) -> usize {
        self.max_content_size
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn max_buffers(&self) -> usize {
        1 + self.max_content_size / self.buffer_size
    }
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_SIZE, DEFAULT_BUFFER_SIZE)
    }
}

/// Content held in fixed-size buffers.
#[derive(Debug)]
pub struct ContentBuffers {
    limits: ContentLimits,
    buffers: Vec<BytesMut>,
    len: usize,
}

impl ContentBuffers {
    pub fn new(limits: ContentLimits) -> Self {
        Self {
            limits,
            buffers: Vec::new(),
            len: 0,
        }
    }

    /// Append `chunk`, failing if the content would exceed the limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), GatewayError> {
        let too_large = GatewayError::ContentTooLarge {
            limit: self.limits.max_content_size,
        };
        if self.len + chunk.len() > self.limits.max_content_size {
            return Err(too_large);
        }

        let buffer_size = self.limits.buffer_size;
        let mut rest = chunk;
        while !rest.is_empty() {
            let full = self.buffers.last().map_or(true, |b| b.len() >= buffer_size);
            if full {
                if self.buffers.len() >= self.limits.max_buffers() {
                    return Err(too_large);
                }
                self.buffers.push(BytesMut::with_capacity(buffer_size));
            }
            if let Some(current) = self.buffers.last_mut() {
                let take = (buffer_size - current.len()).min(rest.len());
                current.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
            }
        }
        self.len += chunk.len();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Contiguous copy of the content.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len);
        for buffer in &self.buffers {
            out.extend_from_slice(buffer);
        }
        out.freeze()
    }

    /// Hand the buffers over as a streaming body without copying them.
    pub fn into_body(self) -> Body {
        let chunks: Vec<Result<Bytes, Infallible>> = self
            .buffers
            .into_iter()
            .map(|buffer| Ok(buffer.freeze()))
            .collect();
        Body::from_stream(futures_util::stream::iter(chunks))
    }
}

/// Read `body` into buffers, rejecting content larger than the limit.
///
/// A declared length above the limit is rejected before any byte is read.
pub async fn read_content(
    body: Body,
    limits: ContentLimits,
    declared_len: Option<u64>,
) -> Result<ContentBuffers, GatewayError> {
    if let Some(len) = declared_len {
        if len > limits.max_content_size as u64 {
            return Err(GatewayError::ContentTooLarge {
                limit: limits.max_content_size,
            });
        }
    }

    let mut content = ContentBuffers::new(limits);
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GatewayError::MalformedContent(e.to_string()))?;
        content.push(&chunk)?;
    }
    Ok(content)
}
