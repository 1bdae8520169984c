//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+, ISO 32000-1
//! Section 7.5.7). The decoded data starts with `N` pairs of
//! `object-number offset`, and offsets are relative to `First`.

use super::lexer::Lexer;
use super::objects::{PdfDictionary, PdfObject};
use crate::error::{ParseError, ParseResult};
use crate::objects::ObjectId;

/// A decoded object stream
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// `(object number, offset relative to First)` in header order
    offsets: Vec<(u32, usize)>,
    first: usize,
    data: Vec<u8>,
    extends: Option<ObjectId>,
}

impl ObjectStream {
    /// Parse the header of an already-decoded object stream
    pub fn parse(dict: &PdfDictionary, data: Vec<u8>) -> ParseResult<Self> {
        let n = dict
            .get("N")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;
        let first = dict
            .get("First")
            .and_then(PdfObject::as_integer)
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;

        let n = usize::try_from(n)
            .map_err(|_| ParseError::syntax(0, format!("Invalid object count {n}")))?;
        let first = usize::try_from(first)
            .ok()
            .filter(|&f| f <= data.len())
            .ok_or_else(|| ParseError::syntax(0, format!("Invalid First offset {first}")))?;

        let mut lexer = Lexer::new(&data[..first]);
        // Each header pair takes at least 4 bytes, which bounds a lying /N
        let mut offsets = Vec::with_capacity(n.min(first / 4 + 1));
        for _ in 0..n {
            let number = lexer.read_unsigned()?;
            let offset = lexer.read_unsigned()?;
            let number = u32::try_from(number)
                .map_err(|_| ParseError::syntax(0, format!("Object number {number} too large")))?;
            let offset = usize::try_from(offset)
                .map_err(|_| ParseError::syntax(0, "Object offset too large"))?;
            offsets.push((number, offset));
        }

        let extends = dict.get("Extends").and_then(PdfObject::as_reference);

        Ok(Self {
            offsets,
            first,
            data,
            extends,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The container this one extends, if any
    pub fn extends(&self) -> Option<ObjectId> {
        self.extends
    }

    /// Object numbers stored in this container, in header order
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.offsets.iter().map(|(number, _)| *number)
    }

    /// Find and parse object `number`.
    ///
    /// `index` is the position the xref entry claims; it is checked first and
    /// the whole header is scanned when it does not match. Returns `None` when
    /// the object is not in this container.
    pub fn get_object(&self, number: u32, index: u32) -> Option<ParseResult<PdfObject>> {
        let hinted = self
            .offsets
            .get(index as usize)
            .filter(|(n, _)| *n == number);
        let (_, offset) = hinted.or_else(|| self.offsets.iter().find(|(n, _)| *n == number))?;
        Some(self.parse_at(*offset))
    }

    fn parse_at(&self, offset: usize) -> ParseResult<PdfObject> {
        let start = self
            .first
            .checked_add(offset)
            .filter(|&s| s < self.data.len())
            .ok_or_else(|| ParseError::syntax(0, format!("Object offset {offset} out of range")))?;
        let mut lexer = Lexer::new(&self.data[start..]);
        PdfObject::parse(&mut lexer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::PdfName;

    fn container(n: i64, first: usize) -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("ObjStm")));
        dict.insert("N", PdfObject::Integer(n));
        dict.insert("First", PdfObject::Integer(first as i64));
        dict
    }

    fn sample() -> (PdfDictionary, Vec<u8>) {
        let header = b"10 0 11 6 ";
        let body = b"(ten) << /Eleven 11 >>";
        let mut data = header.to_vec();
        data.extend_from_slice(body);
        (container(2, header.len()), data)
    }

    #[test]
    fn test_get_objects() {
        let (dict, data) = sample();
        let objstm = ObjectStream::parse(&dict, data).unwrap();
        assert_eq!(objstm.len(), 2);
        assert_eq!(objstm.object_numbers().collect::<Vec<_>>(), vec![10, 11]);

        let ten = objstm.get_object(10, 0).unwrap().unwrap();
        assert_eq!(ten.as_string().unwrap().as_bytes(), b"ten");

        let eleven = objstm.get_object(11, 1).unwrap().unwrap();
        assert_eq!(
            eleven.as_dict().unwrap().get("Eleven"),
            Some(&PdfObject::Integer(11))
        );
    }

    #[test]
    fn test_wrong_index_hint_falls_back_to_scan() {
        let (dict, data) = sample();
        let objstm = ObjectStream::parse(&dict, data).unwrap();
        assert!(objstm.get_object(11, 0).unwrap().is_ok());
        assert!(objstm.get_object(11, 99).unwrap().is_ok());
        assert!(objstm.get_object(12, 0).is_none());
    }

    #[test]
    fn test_extends() {
        let (mut dict, data) = sample();
        dict.insert("Extends", PdfObject::Reference(ObjectId::new(4, 0)));
        let objstm = ObjectStream::parse(&dict, data).unwrap();
        assert_eq!(objstm.extends(), Some(ObjectId::new(4, 0)));
    }

    #[test]
    fn test_bad_headers() {
        let (dict, _) = sample();
        // First beyond the data
        assert!(ObjectStream::parse(&dict, b"10 0".to_vec()).is_err());
        // N claims more pairs than the header holds
        let lying = container(5, 10);
        let (_, data) = sample();
        assert!(ObjectStream::parse(&lying, data).is_err());
        // Missing N
        let mut dict = PdfDictionary::new();
        dict.insert("First", PdfObject::Integer(0));
        assert!(matches!(
            ObjectStream::parse(&dict, vec![]),
            Err(ParseError::MissingKey(_))
        ));
    }

    #[test]
    fn test_offset_out_of_range() {
        let dict = container(1, 5);
        let objstm = ObjectStream::parse(&dict, b"1 99 null".to_vec()).unwrap();
        assert!(objstm.get_object(1, 0).unwrap().is_err());
    }
}
