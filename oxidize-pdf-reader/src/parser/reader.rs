//! Positioned object loading
//!
//! [`ObjectLoader`] turns offsets into parsed objects and stream byte ranges.
//! It reads a window of bytes at the requested offset and, when the object
//! does not fit, retries with a larger window until the end of the source.

use super::lexer::is_whitespace;
use super::objects::{parse_indirect_object, PdfObject, PdfStream};
use crate::error::{ParseError, ParseResult};
use crate::objects::ObjectId;
use crate::source::{ByteSource, SourceReader};
use std::sync::Arc;
use tracing::debug;

const INITIAL_OBJECT_WINDOW: usize = 4 * 1024;
const ENDSTREAM_SCAN_CHUNK: usize = 64 * 1024;
const ENDSTREAM: &[u8] = b"endstream";

/// Reads indirect objects and stream data out of a [`ByteSource`]
#[derive(Clone)]
pub struct ObjectLoader {
    source: Arc<dyn ByteSource>,
}

impl ObjectLoader {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.source
    }

    /// Parse the `n g obj` unit starting at `offset`
    pub fn read_object_at(&self, offset: u64) -> ParseResult<(ObjectId, PdfObject)> {
        let len = self.source.len();
        if offset >= len {
            return Err(ParseError::syntax(
                offset,
                format!("object offset beyond end of file ({len} bytes)"),
            ));
        }

        let available = len - offset;
        let mut window = INITIAL_OBJECT_WINDOW;
        loop {
            let data = self.source.read_range(offset, window)?;
            let complete = data.len() as u64 >= available;
            match parse_indirect_object(&data, offset, complete) {
                Err(ParseError::UnexpectedEof { .. }) if !complete => {
                    window = window.saturating_mul(4);
                }
                other => return other,
            }
        }
    }

    /// Length of a stream's data: the declared length when it checks out,
    /// otherwise the distance to the `endstream` keyword.
    pub fn stream_length(&self, stream: &PdfStream, declared: Option<u64>) -> ParseResult<u64> {
        if let Some(length) = declared {
            if self.declared_length_fits(stream.offset, length)? {
                return Ok(length);
            }
            debug!(
                "Stream at {} declares /Length {length} but endstream is elsewhere; scanning",
                stream.offset
            );
        }
        self.scan_for_endstream(stream.offset)
    }

    /// The raw, still-encoded bytes of a stream
    pub fn raw_stream_data(&self, stream: &PdfStream, declared: Option<u64>) -> ParseResult<Vec<u8>> {
        let length = self.stream_length(stream, declared)?;
        let length = usize::try_from(length)
            .map_err(|_| ParseError::StreamDecodeError("stream too large".to_string()))?;
        Ok(self.source.read_range(stream.offset, length)?)
    }

    /// Sequential reader over `length` bytes of stream data
    pub(crate) fn stream_reader(&self, stream: &PdfStream, length: u64) -> SourceReader {
        SourceReader::new(self.source.clone(), stream.offset, length)
    }

    fn declared_length_fits(&self, start: u64, length: u64) -> ParseResult<bool> {
        let Some(end) = start.checked_add(length) else {
            return Ok(false);
        };
        if end > self.source.len() {
            return Ok(false);
        }
        let tail = self.source.read_range(end, 32 + ENDSTREAM.len())?;
        let skip = tail.iter().take_while(|&&b| is_whitespace(b)).count();
        Ok(tail[skip..].starts_with(ENDSTREAM))
    }

    fn scan_for_endstream(&self, start: u64) -> ParseResult<u64> {
        let len = self.source.len();
        let mut pos = start;
        while pos < len {
            let chunk = self
                .source
                .read_range(pos, ENDSTREAM_SCAN_CHUNK + ENDSTREAM.len())?;
            if let Some(found) = chunk.windows(ENDSTREAM.len()).position(|w| w == ENDSTREAM) {
                let mut end = pos + found as u64;
                // The end-of-line before the keyword is not part of the data
                let before = &chunk[..found];
                if before.ends_with(b"\r\n") {
                    end -= 2;
                } else if before.ends_with(b"\n") || before.ends_with(b"\r") {
                    end -= 1;
                }
                return Ok(end.max(start) - start);
            }
            if chunk.len() <= ENDSTREAM.len() {
                break;
            }
            pos += (chunk.len() - ENDSTREAM.len()) as u64;
        }
        Err(ParseError::StreamDecodeError(format!(
            "no endstream after stream data at {start}"
        )))
    }
}
