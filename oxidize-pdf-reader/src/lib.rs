//! # oxidize-pdf-reader
//!
//! A lazy PDF object model: open a document from any random-access byte
//! source and walk its object graph, resolving indirect references on demand.
//!
//! ## Features
//!
//! - **Both xref formats**: classic tables and compressed xref streams, hybrid
//!   files, and incremental updates chained through `/Prev`
//! - **Object streams**: objects packed in compressed containers, including
//!   `/Extends` chains (bounded, so cyclic chains terminate)
//! - **Object cache**: LRU with runtime capacity, shareable across documents,
//!   with an optional time-to-live sweeper
//! - **Decryption**: Standard Security Handler revisions 2 to 4, RC4 and AES-128
//! - **Filters**: Flate, LZW, ASCII85, ASCIIHex and RunLength with PNG/TIFF
//!   predictors; image codecs are passed through undecoded
//! - **Recovery**: rebuilds the xref table by scanning for `obj` markers when the
//!   structured data is damaged
//! - **Total accessors**: navigation never panics; missing or broken data reads
//!   as Null or a zero value
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use oxidize_pdf_reader::{PdfDocument, ValueKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = PdfDocument::open_path("document.pdf")?;
//! println!("Version: {}", doc.version());
//!
//! let catalog = doc.root();
//! assert_eq!(catalog.key("Type").name(), "Catalog");
//!
//! let kids = catalog.key("Pages").key("Kids");
//! for i in 0..kids.len() {
//!     let page = kids.index(i);
//!     if page.key("Contents").kind() == ValueKind::Stream {
//!         let bytes = page.key("Contents").bytes()?;
//!         println!("Page {} content: {} bytes", i + 1, bytes.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Encrypted documents
//!
//! ```rust,no_run
//! use oxidize_pdf_reader::{PdfDocument, ReaderOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("secret.pdf")?;
//! let mut attempts = vec!["guess".to_string(), "s3cret".to_string()].into_iter();
//! let mut provider = move || attempts.next().unwrap_or_default();
//! let doc = PdfDocument::open_with_provider(data, ReaderOptions::default(), &mut provider)?;
//! println!("Can print: {}", doc.permissions().can_print());
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod encryption;
pub mod error;
pub mod filters;
pub mod memory;
pub mod objects;
pub mod parser;
pub mod recovery;
pub mod source;
pub mod value;

#[cfg(feature = "async")]
pub mod async_document;

pub use document::{PasswordProvider, PdfDocument, ReaderOptions};
pub use encryption::Permissions;
pub use error::{ParseError, ParseResult, ValueError};
pub use memory::{CacheStats, CacheSweeper, ObjectCache};
pub use objects::ObjectId;
pub use parser::PdfVersion;
pub use recovery::RecoveryStats;
pub use source::{ByteSource, FileSource};
pub use value::{Value, ValueKind};

#[cfg(feature = "async")]
pub use async_document::AsyncDocument;

/// Current version of oxidize-pdf-reader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
