//! PDF Trailer
//!
//! Typed view over the trailer dictionary (ISO 32000-1 Section 7.5.5). For
//! files using cross-reference streams the stream dictionary plays this role.

use super::objects::{PdfDictionary, PdfObject};
use crate::error::{ParseError, ParseResult};
use crate::objects::ObjectId;

/// PDF Trailer information
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfTrailer {
    pub dict: PdfDictionary,
}

impl PdfTrailer {
    pub fn new(dict: PdfDictionary) -> Self {
        Self { dict }
    }

    /// Number of entries in the cross-reference space
    pub fn size(&self) -> Option<u32> {
        self.dict
            .get("Size")
            .and_then(PdfObject::as_integer)
            .and_then(|i| u32::try_from(i).ok())
    }

    /// Document catalog reference
    pub fn root(&self) -> ParseResult<ObjectId> {
        self.dict
            .get("Root")
            .and_then(PdfObject::as_reference)
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))
    }

    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get("Info").and_then(PdfObject::as_reference)
    }

    /// The encryption dictionary entry, direct or indirect
    pub fn encrypt(&self) -> Option<&PdfObject> {
        self.dict.get("Encrypt").filter(|obj| !obj.is_null())
    }

    /// First element of the document identifier array
    pub fn id(&self) -> Option<&[u8]> {
        self.dict
            .get("ID")
            .and_then(PdfObject::as_array)
            .and_then(|arr| arr.get(0))
            .and_then(PdfObject::as_string)
            .map(|s| s.as_bytes())
    }

    /// Offset of the previous revision's cross-reference section
    pub fn prev(&self) -> Option<u64> {
        offset_value(self.dict.get("Prev"))
    }

    /// Offset of the cross-reference stream of a hybrid file
    pub fn xref_stm(&self) -> Option<u64> {
        offset_value(self.dict.get("XRefStm"))
    }

    /// Reject trailers the reader cannot navigate from
    pub fn validate(&self) -> ParseResult<()> {
        self.root()?;
        if let Some(size) = self.dict.get("Size") {
            if size.as_integer().map_or(true, |s| s < 0) {
                return Err(ParseError::InvalidTrailer(format!(
                    "Size must be a non-negative integer, found {}",
                    size.kind_name()
                )));
            }
        }
        Ok(())
    }
}

fn offset_value(obj: Option<&PdfObject>) -> Option<u64> {
    match obj? {
        PdfObject::Integer(i) => u64::try_from(*i).ok(),
        PdfObject::Real(r) if *r >= 0.0 => Some(*r as u64),
        _ => None,
    }
}
