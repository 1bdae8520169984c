//! PDF Parser Module
//!
//! Tokenizer, object parser and cross-reference machinery according to
//! ISO 32000-1. Everything here works on byte windows read from a
//! [`ByteSource`](crate::source::ByteSource); nothing holds the whole file.

pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod reader;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use self::header::{PdfHeader, PdfVersion};
pub use self::object_stream::ObjectStream;
pub use self::objects::{PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use self::reader::ObjectLoader;
pub use self::trailer::PdfTrailer;
pub use self::xref::{XRefEntry, XRefTable};
pub use self::xref_stream::XRefStream;
