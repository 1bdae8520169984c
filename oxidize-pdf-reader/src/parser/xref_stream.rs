//! Cross-reference streams (ISO 32000-1 Section 7.5.8)
//!
//! Each record is `W[0] + W[1] + W[2]` bytes of big-endian fields:
//! type, then two type-dependent fields. `Index` lists the `(first, count)`
//! subsections the records cover, defaulting to `[0 Size]`.

use super::objects::{PdfDictionary, PdfObject};
use super::reader::ObjectLoader;
use super::trailer::PdfTrailer;
use super::xref::{XRefEntry, XRefSection};
use crate::error::{ParseError, ParseResult};
use crate::filters;
use tracing::{debug, warn};

/// Decoded cross-reference stream
#[derive(Debug, Clone)]
pub struct XRefStream {
    dict: PdfDictionary,
    widths: [usize; 3],
    index: Vec<(u32, u32)>,
    data: Vec<u8>,
}

impl XRefStream {
    /// Build from the stream dictionary and its already-decoded data
    pub fn parse(dict: PdfDictionary, data: Vec<u8>) -> ParseResult<Self> {
        let widths = Self::parse_widths(&dict)?;
        let index = Self::parse_index(&dict)?;
        Ok(Self {
            dict,
            widths,
            index,
            data,
        })
    }

    /// Read the stream object at `offset`, decode it and parse it
    pub fn load(loader: &ObjectLoader, offset: u64) -> ParseResult<Self> {
        let (id, object) = loader.read_object_at(offset)?;
        let stream = match object {
            PdfObject::Stream(stream) => stream,
            other => {
                return Err(ParseError::InvalidXRef(format!(
                    "expected xref stream at {offset}, found {}",
                    other.kind_name()
                )))
            }
        };

        match stream.dict.get_type() {
            Some("XRef") => {}
            None if stream.dict.contains_key("W") => {
                debug!("Xref stream {id} has no /Type; accepting because /W is present")
            }
            other => {
                return Err(ParseError::InvalidXRef(format!(
                    "object {id} at {offset} is not an xref stream (Type {other:?})"
                )))
            }
        }

        // Xref streams are never encrypted and their /Length must be direct
        let declared = stream
            .dict
            .get("Length")
            .and_then(PdfObject::as_integer)
            .and_then(|l| u64::try_from(l).ok());
        let raw = loader.raw_stream_data(&stream, declared)?;
        let data = filters::decode_stream(raw, &stream.dict)
            .map_err(|e| ParseError::InvalidXRef(format!("xref stream {id}: {e}")))?;

        Self::parse(stream.dict, data)
    }

    fn parse_widths(dict: &PdfDictionary) -> ParseResult<[usize; 3]> {
        let w = dict
            .get("W")
            .and_then(PdfObject::as_array)
            .ok_or_else(|| ParseError::MissingKey("W".to_string()))?;
        if w.len() < 3 {
            return Err(ParseError::InvalidXRef(format!(
                "W must have 3 entries, found {}",
                w.len()
            )));
        }

        let mut widths = [0usize; 3];
        for (slot, obj) in widths.iter_mut().zip(w.0.iter()) {
            *slot = obj
                .as_integer()
                .and_then(|v| usize::try_from(v).ok())
                .filter(|&v| v <= 8)
                .ok_or_else(|| ParseError::InvalidXRef("W entries must be 0..=8".to_string()))?;
        }
        if widths.iter().sum::<usize>() == 0 {
            return Err(ParseError::InvalidXRef("entry size is 0".to_string()));
        }
        Ok(widths)
    }

    fn parse_index(dict: &PdfDictionary) -> ParseResult<Vec<(u32, u32)>> {
        let Some(index) = dict.get("Index").and_then(PdfObject::as_array) else {
            let size = PdfTrailer::new(dict.clone())
                .size()
                .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
            return Ok(vec![(0, size)]);
        };

        let numbers: Vec<u32> = index
            .0
            .iter()
            .map(|obj| obj.as_integer().and_then(|v| u32::try_from(v).ok()))
            .collect::<Option<_>>()
            .ok_or_else(|| ParseError::InvalidXRef("Index must hold integers".to_string()))?;
        if numbers.len() % 2 != 0 {
            return Err(ParseError::InvalidXRef(
                "Index must hold (first, count) pairs".to_string(),
            ));
        }
        Ok(numbers.chunks(2).map(|pair| (pair[0], pair[1])).collect())
    }

    pub fn dict(&self) -> &PdfDictionary {
        &self.dict
    }

    pub fn widths(&self) -> [usize; 3] {
        self.widths
    }

    /// Unpack every record. Records cut short by truncated data are dropped.
    pub fn entries(&self) -> Vec<(u32, XRefEntry)> {
        let record_len: usize = self.widths.iter().sum();
        let mut records = self.data.chunks_exact(record_len);
        let mut entries = Vec::new();

        'subsections: for &(first, count) in &self.index {
            for i in 0..count {
                let Some(record) = records.next() else {
                    warn!(
                        "Xref stream data ends early: {} subsection entries missing",
                        count - i
                    );
                    break 'subsections;
                };
                let Some(number) = first.checked_add(i) else {
                    continue;
                };

                let (type_field, rest) = record.split_at(self.widths[0]);
                let (field2, field3) = rest.split_at(self.widths[1]);
                // A zero-width type field defaults to type 1
                let kind = if self.widths[0] == 0 {
                    1
                } else {
                    read_field(type_field)
                };
                let field2 = read_field(field2);
                let field3 = read_field(field3);

                let entry = match kind {
                    0 => XRefEntry::Free,
                    1 => XRefEntry::Direct {
                        offset: field2,
                        generation: u16::try_from(field3).unwrap_or(u16::MAX),
                    },
                    2 => match (u32::try_from(field2), u32::try_from(field3)) {
                        (Ok(container), Ok(index)) => XRefEntry::InContainer { container, index },
                        _ => continue,
                    },
                    other => {
                        // Unknown types are references to the null object
                        debug!("Skipping xref stream entry {number} with type {other}");
                        continue;
                    }
                };
                entries.push((number, entry));
            }
        }

        entries
    }

    pub fn into_section(self) -> XRefSection {
        let entries = self.entries();
        XRefSection {
            entries,
            trailer: PdfTrailer::new(self.dict),
        }
    }
}

/// Big-endian unsigned integer of up to 8 bytes
fn read_field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |value, &byte| (value << 8) | u64::from(byte))
}
