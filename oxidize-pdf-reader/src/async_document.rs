//! Tokio wrapper around the blocking document API
//!
//! Resolution performs positioned reads that may block, so every call here
//! runs on tokio's blocking pool.

use crate::document::{PdfDocument, ReaderOptions};
use crate::error::{ParseError, ParseResult};
use crate::objects::ObjectId;
use crate::source::ByteSource;
use crate::value::Value;
use std::io;
use std::time::Duration;
use tracing::debug;

/// An open document usable from async code
#[derive(Clone, Debug)]
pub struct AsyncDocument {
    doc: PdfDocument,
}

impl AsyncDocument {
    pub async fn open<S: ByteSource + 'static>(source: S, options: ReaderOptions) -> ParseResult<Self> {
        let doc = tokio::task::spawn_blocking(move || PdfDocument::open_with_options(source, options))
            .await
            .map_err(|e| ParseError::Io(io::Error::new(io::ErrorKind::Other, e)))??;
        Ok(Self { doc })
    }

    /// The blocking handle, for work already running off the reactor
    pub fn document(&self) -> &PdfDocument {
        &self.doc
    }

    pub async fn resolve(&self, id: ObjectId) -> Value {
        let doc = self.doc.clone();
        match tokio::task::spawn_blocking(move || doc.resolve(id)).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Resolve task for {id} failed: {e}");
                self.doc.null()
            }
        }
    }

    /// Resolve with a deadline. `None` when it elapses; the work still
    /// finishes in the background and may populate the cache.
    pub async fn resolve_with_timeout(&self, id: ObjectId, timeout: Duration) -> Option<Value> {
        match tokio::time::timeout(timeout, self.resolve(id)).await {
            Ok(value) => Some(value),
            Err(_) => {
                debug!("Resolving {id} timed out after {timeout:?}");
                None
            }
        }
    }

    /// Read a stream's decoded bytes
    pub async fn read_stream(&self, value: Value) -> io::Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || value.bytes())
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

impl From<PdfDocument> for AsyncDocument {
    fn from(doc: PdfDocument) -> Self {
        Self { doc }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::build_classic_pdf;

    fn sample() -> Vec<u8> {
        build_classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
            (3, "<< /Length 4 >>\nstream\ndata\nendstream"),
        ])
    }

    #[tokio::test]
    async fn test_async_resolve_and_read() {
        let doc = AsyncDocument::open(sample(), ReaderOptions::default()).await.unwrap();
        let pages = doc.resolve(ObjectId::new(2, 0)).await;
        assert_eq!(pages.key("Count").int(), 0);

        let stream = doc.resolve(ObjectId::new(3, 0)).await;
        assert_eq!(doc.read_stream(stream).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_resolve_with_timeout() {
        let doc = AsyncDocument::open(sample(), ReaderOptions::default()).await.unwrap();
        let catalog = doc
            .resolve_with_timeout(ObjectId::new(1, 0), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(catalog.key("Type").name(), "Catalog");
    }

    #[tokio::test]
    async fn test_open_error_passes_through() {
        let result = AsyncDocument::open(Vec::new(), ReaderOptions::default()).await;
        assert!(matches!(result, Err(ParseError::EmptyFile)));
    }
}
