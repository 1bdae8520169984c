//! Navigable view over resolved PDF objects
//!
//! A [`Value`] is a handle on one object of an open [`PdfDocument`](crate::PdfDocument).
//! Accessors never fail: asking a value for something it is not returns the
//! zero value of the requested kind (`false`, `0`, `""`, Null, an empty reader).
//! Callers that need to tell "absent" from "wrong kind" use the `try_` family
//! or check [`Value::kind`] first.
//!
//! ```rust,no_run
//! use oxidize_pdf_reader::PdfDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = PdfDocument::open_path("input.pdf")?;
//! let pages = doc.root().key("Pages");
//! println!("{} pages", pages.key("Count").int());
//!
//! let first = pages.key("Kids").index(0);
//! let content = first.key("Contents").bytes()?;
//! # let _ = content;
//! # Ok(())
//! # }
//! ```

use crate::document::DocumentInner;
use crate::error::ValueError;
use crate::objects::ObjectId;
use crate::parser::{PdfDictionary, PdfObject};
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

/// The type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Real,
    String,
    Name,
    Dict,
    Array,
    Stream,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Real => "real",
            ValueKind::String => "string",
            ValueKind::Name => "name",
            ValueKind::Dict => "dictionary",
            ValueKind::Array => "array",
            ValueKind::Stream => "stream",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single PDF value together with the document it came from
#[derive(Clone)]
pub struct Value {
    doc: Arc<DocumentInner>,
    /// Indirect object this value lives in; decides the decryption key of streams
    container: ObjectId,
    object: Arc<PdfObject>,
}

impl Value {
    pub(crate) fn new(doc: Arc<DocumentInner>, container: ObjectId, object: Arc<PdfObject>) -> Self {
        Self {
            doc,
            container,
            object,
        }
    }

    /// Resolve `id` in `doc`; Null when it cannot be resolved
    pub(crate) fn resolved(doc: Arc<DocumentInner>, id: ObjectId) -> Self {
        match doc.resolve(id) {
            Some((found, object)) => Self::new(doc, found, object),
            None => Self::new(doc, id, Arc::new(PdfObject::Null)),
        }
    }

    /// Wrap a child of this value, resolving it if it is a reference
    fn child(&self, object: Option<&PdfObject>) -> Value {
        match object {
            Some(PdfObject::Reference(id)) => Self::resolved(self.doc.clone(), *id),
            Some(direct) => Self::new(self.doc.clone(), self.container, Arc::new(direct.clone())),
            None => Self::new(self.doc.clone(), self.container, Arc::new(PdfObject::Null)),
        }
    }

    /// What this value holds; unresolved references read as Null
    pub fn kind(&self) -> ValueKind {
        match self.object.as_ref() {
            PdfObject::Null | PdfObject::Reference(_) => ValueKind::Null,
            PdfObject::Boolean(_) => ValueKind::Bool,
            PdfObject::Integer(_) => ValueKind::Integer,
            PdfObject::Real(_) => ValueKind::Real,
            PdfObject::String(_) => ValueKind::String,
            PdfObject::Name(_) => ValueKind::Name,
            PdfObject::Array(_) => ValueKind::Array,
            PdfObject::Dictionary(_) => ValueKind::Dict,
            PdfObject::Stream(_) => ValueKind::Stream,
        }
    }

    pub fn is_null(&self) -> bool {
        self.kind() == ValueKind::Null
    }

    /// The indirect object this value was found in
    pub fn container(&self) -> ObjectId {
        self.container
    }

    /// The underlying parsed object
    pub fn object(&self) -> &PdfObject {
        &self.object
    }

    /// Boolean value, or false
    pub fn bool(&self) -> bool {
        self.object.as_bool().unwrap_or(false)
    }

    /// Integer value, or 0. Reals are not truncated.
    pub fn int(&self) -> i64 {
        match self.object.as_ref() {
            PdfObject::Integer(i) => *i,
            _ => 0,
        }
    }

    /// Real value; integers are widened
    pub fn real(&self) -> f64 {
        self.object.as_real().unwrap_or(0.0)
    }

    /// The bytes of a string, undecoded
    pub fn raw_string(&self) -> &[u8] {
        match self.object.as_ref() {
            PdfObject::String(s) => s.as_bytes(),
            _ => &[],
        }
    }

    /// A string decoded as text: UTF-16BE or UTF-8 when marked, PDFDocEncoding otherwise
    pub fn text(&self) -> String {
        decode_text(self.raw_string())
    }

    /// Strict UTF-16BE decoding; empty unless the string is marked and well-formed
    pub fn text_from_utf16(&self) -> String {
        text_from_utf16(self.raw_string())
    }

    /// Name without the leading slash
    pub fn name(&self) -> &str {
        self.object.as_name().unwrap_or("")
    }

    fn dict(&self) -> Option<&PdfDictionary> {
        match self.object.as_ref() {
            PdfObject::Dictionary(dict) => Some(dict),
            PdfObject::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    /// Dictionary (or stream dictionary) entry; Null when absent
    pub fn key(&self, key: &str) -> Value {
        self.child(self.dict().and_then(|dict| dict.get(key)))
    }

    /// Dictionary keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .dict()
            .map(|dict| dict.iter().map(|(k, _)| k.as_str().to_string()).collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Array element; Null when out of range
    pub fn index(&self, index: usize) -> Value {
        self.child(self.object.as_array().and_then(|array| array.get(index)))
    }

    /// Array length; 0 for anything but an array
    pub fn len(&self) -> usize {
        self.object.as_array().map_or(0, |array| array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded stream contents.
    ///
    /// Errors from decryption or filters surface as `InvalidData` read errors.
    /// Anything but a stream yields an empty reader.
    pub fn reader(&self) -> Box<dyn Read + Send> {
        match self.object.as_ref() {
            PdfObject::Stream(stream) => self.doc.stream_reader(self.container, stream),
            _ => Box::new(io::empty()),
        }
    }

    /// Read the whole decoded stream
    pub fn bytes(&self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.reader().read_to_end(&mut data)?;
        Ok(data)
    }

    /// A `D:YYYYMMDDHHmmSSOHH'mm'` date string
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        parse_date(&self.text())
    }

    fn wrong_kind(&self, expected: ValueKind) -> ValueError {
        match self.kind() {
            ValueKind::Null => ValueError::Missing,
            found => ValueError::WrongKind {
                expected: expected.as_str(),
                found: found.as_str(),
            },
        }
    }

    /// Strict accessors: `Missing` for Null, `WrongKind` for anything else.
    pub fn try_bool(&self) -> Result<bool, ValueError> {
        self.object
            .as_bool()
            .ok_or_else(|| self.wrong_kind(ValueKind::Bool))
    }

    pub fn try_int(&self) -> Result<i64, ValueError> {
        match self.object.as_ref() {
            PdfObject::Integer(i) => Ok(*i),
            _ => Err(self.wrong_kind(ValueKind::Integer)),
        }
    }

    /// Integers are accepted and widened, as in [`Value::real`]
    pub fn try_real(&self) -> Result<f64, ValueError> {
        self.object
            .as_real()
            .ok_or_else(|| self.wrong_kind(ValueKind::Real))
    }

    pub fn try_raw_string(&self) -> Result<&[u8], ValueError> {
        match self.object.as_ref() {
            PdfObject::String(s) => Ok(s.as_bytes()),
            _ => Err(self.wrong_kind(ValueKind::String)),
        }
    }

    /// Decoded as in [`Value::text`]
    pub fn try_text(&self) -> Result<String, ValueError> {
        self.try_raw_string().map(decode_text)
    }

    pub fn try_name(&self) -> Result<&str, ValueError> {
        match self.object.as_ref() {
            PdfObject::Name(name) => Ok(name.as_str()),
            _ => Err(self.wrong_kind(ValueKind::Name)),
        }
    }

    /// Like [`Value::key`], but an absent key or unresolvable entry is `Missing`
    pub fn try_key(&self, key: &str) -> Result<Value, ValueError> {
        let dict = self.dict().ok_or_else(|| self.wrong_kind(ValueKind::Dict))?;
        let value = self.child(Some(dict.get(key).ok_or(ValueError::Missing)?));
        if value.is_null() {
            return Err(ValueError::Missing);
        }
        Ok(value)
    }

    /// Like [`Value::index`], but out of range or unresolvable is `Missing`
    pub fn try_index(&self, index: usize) -> Result<Value, ValueError> {
        let array = self
            .object
            .as_array()
            .ok_or_else(|| self.wrong_kind(ValueKind::Array))?;
        let value = self.child(Some(array.get(index).ok_or(ValueError::Missing)?));
        if value.is_null() {
            return Err(ValueError::Missing);
        }
        Ok(value)
    }

    /// A decoding reader, or `WrongKind` when this is not a stream
    pub fn try_reader(&self) -> Result<Box<dyn Read + Send>, ValueError> {
        match self.kind() {
            ValueKind::Stream => Ok(self.reader()),
            _ => Err(self.wrong_kind(ValueKind::Stream)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.container == other.container && self.object == other.object
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("container", &self.container)
            .field("object", &self.object)
            .finish()
    }
}

/// PDF syntax; references print as `n g R` and are not followed
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_object(f, &self.object)
    }
}

fn write_object(f: &mut fmt::Formatter<'_>, object: &PdfObject) -> fmt::Result {
    match object {
        PdfObject::Null => f.write_str("null"),
        PdfObject::Boolean(b) => write!(f, "{b}"),
        PdfObject::Integer(i) => write!(f, "{i}"),
        PdfObject::Real(r) => write!(f, "{r}"),
        PdfObject::String(s) => write_string(f, s.as_bytes()),
        PdfObject::Name(name) => write!(f, "/{}", name.as_str()),
        PdfObject::Array(array) => {
            f.write_str("[")?;
            for (i, item) in array.0.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write_object(f, item)?;
            }
            f.write_str("]")
        }
        PdfObject::Dictionary(dict) => write_dict(f, dict),
        PdfObject::Stream(stream) => {
            write_dict(f, &stream.dict)?;
            f.write_str("@stream")
        }
        PdfObject::Reference(id) => write!(f, "{id}"),
    }
}

fn write_dict(f: &mut fmt::Formatter<'_>, dict: &PdfDictionary) -> fmt::Result {
    let mut entries: Vec<_> = dict.iter().collect();
    entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    f.write_str("<<")?;
    for (key, value) in entries {
        write!(f, "/{} ", key.as_str())?;
        write_object(f, value)?;
    }
    f.write_str(">>")
}

fn write_string(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    if bytes.iter().all(|&b| (0x20..0x7f).contains(&b)) {
        f.write_str("(")?;
        for &b in bytes {
            if matches!(b, b'(' | b')' | b'\\') {
                f.write_str("\\")?;
            }
            write!(f, "{}", b as char)?;
        }
        f.write_str(")")
    } else {
        f.write_str("<")?;
        for b in bytes {
            write!(f, "{b:02x}")?;
        }
        f.write_str(">")
    }
}

/// Decode a text string: byte order marks pick UTF-16BE or UTF-8, anything
/// else is PDFDocEncoding. Invalid sequences become U+FFFD.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(body) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(body).into_owned();
    }
    bytes.iter().map(|&b| pdf_doc_char(b)).collect()
}

/// Strict UTF-16BE text: requires the FE FF mark, an even length and valid
/// surrogate pairs. Returns an empty string otherwise.
pub fn text_from_utf16(bytes: &[u8]) -> String {
    let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) else {
        return String::new();
    };
    if body.len() % 2 != 0 {
        return String::new();
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).unwrap_or_default()
}

/// PDFDocEncoding (ISO 32000-1 Annex D) differs from Latin-1 in these ranges
const PDF_DOC_18: [char; 8] = [
    '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}',
];

const PDF_DOC_80: [char; 31] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}',
];

fn pdf_doc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => PDF_DOC_18[usize::from(byte - 0x18)],
        0x80..=0x9E => PDF_DOC_80[usize::from(byte - 0x80)],
        0xA0 => '\u{20AC}',
        0x7F | 0x9F | 0xAD => '\u{FFFD}',
        other => char::from(other),
    }
}

fn parse_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let s = text.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if !(4..=14).contains(&digits) || digits % 2 != 0 {
        return None;
    }

    let field = |start: usize, default: u32| -> Option<u32> {
        if start + 2 <= digits {
            s[start..start + 2].parse().ok()
        } else {
            Some(default)
        }
    };
    let year: i32 = s[..4].parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4, 1)?, field(6, 1)?)?.and_hms_opt(
        field(8, 0)?,
        field(10, 0)?,
        field(12, 0)?,
    )?;
    let offset = parse_utc_offset(&s[digits..])?;
    naive.and_local_timezone(offset).single()
}

/// `Z`, `+HH'mm'`, `-HH'mm`, `+HH` or nothing (taken as UTC)
fn parse_utc_offset(rest: &str) -> Option<FixedOffset> {
    let sign = match rest.as_bytes().first() {
        None => return FixedOffset::east_opt(0),
        Some(b'Z') => 0,
        Some(b'+') => 1,
        Some(b'-') => -1,
        Some(_) => return None,
    };
    let tail: String = rest[1..].chars().filter(|&c| c != '\'').collect();
    if !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if sign == 0 {
        return tail.bytes().all(|b| b == b'0').then(|| FixedOffset::east_opt(0)).flatten();
    }
    if tail.len() != 2 && tail.len() != 4 {
        return None;
    }
    let hours: i32 = tail[..2].parse().ok()?;
    let minutes: i32 = if tail.len() == 4 { tail[2..].parse().ok()? } else { 0 };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::build_classic_pdf;
    use crate::PdfDocument;
    use chrono::{Datelike, Timelike};

    fn doc() -> PdfDocument {
        PdfDocument::open(build_classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R /Flag true /Scale 1.5 /Arr [1 2.5 (x) 3 0 R] >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
            (3, "(three)"),
            (4, "<< /Length 5 >>\nstream\nhello\nendstream"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_zero_values_on_mismatch() {
        let root = doc().root();
        assert_eq!(root.kind(), ValueKind::Dict);
        assert_eq!(root.int(), 0);
        assert_eq!(root.real(), 0.0);
        assert!(!root.bool());
        assert_eq!(root.raw_string(), b"");
        assert_eq!(root.name(), "");
        assert_eq!(root.len(), 0);
        assert!(root.index(0).is_null());
        assert!(root.key("Missing").is_null());
        assert!(root.key("Missing").key("Deeper").index(3).is_null());
        assert!(root.bytes().unwrap().is_empty());
    }

    #[test]
    fn test_scalar_accessors() {
        let root = doc().root();
        assert!(root.key("Flag").bool());
        assert_eq!(root.key("Scale").real(), 1.5);

        let arr = root.key("Arr");
        assert_eq!(arr.kind(), ValueKind::Array);
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.index(0).int(), 1);
        assert_eq!(arr.index(0).real(), 1.0);
        assert_eq!(arr.index(1).int(), 0);
        assert_eq!(arr.index(2).text(), "x");
        assert_eq!(arr.index(3).raw_string(), b"three");
        assert_eq!(arr.index(3).container(), ObjectId::new(3, 0));
        assert!(arr.index(4).is_null());
    }

    #[test]
    fn test_keys_sorted() {
        let pages = doc().root().key("Pages");
        assert_eq!(pages.keys(), vec!["Count", "Kids", "Type"]);
        assert!(pages.key("Count").keys().is_empty());
    }

    #[test]
    fn test_stream_value() {
        let stream = doc().resolve(ObjectId::new(4, 0));
        assert_eq!(stream.kind(), ValueKind::Stream);
        assert_eq!(stream.key("Length").int(), 5);
        assert_eq!(stream.bytes().unwrap(), b"hello");
    }

    #[test]
    fn test_try_accessors() {
        let root = doc().root();
        assert_eq!(root.try_key("Flag").and_then(|v| v.try_bool()), Ok(true));
        assert_eq!(root.try_key("Nope").unwrap_err(), ValueError::Missing);
        assert_eq!(
            root.key("Flag").try_int().unwrap_err(),
            ValueError::WrongKind {
                expected: "integer",
                found: "boolean"
            }
        );
        assert_eq!(root.try_key("Type").unwrap().try_name(), Ok("Catalog"));
        assert_eq!(root.key("Arr").try_index(9).unwrap_err(), ValueError::Missing);
        assert!(root.try_index(0).is_err());
        assert!(root.try_reader().is_err());
        assert_eq!(root.key("Scale").try_real(), Ok(1.5));
    }

    #[test]
    fn test_equal_values_from_repeated_resolution() {
        let doc = doc();
        let a = doc.resolve(ObjectId::new(3, 0));
        let b = doc.resolve(ObjectId::new(3, 0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_display() {
        let root = doc().root();
        assert_eq!(root.key("Arr").to_string(), "[1 2.5 (x) 3 0 R]");
        assert_eq!(
            root.key("Pages").to_string(),
            "<</Count 0/Kids []/Type /Pages>>"
        );
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"plain"), "plain");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0x00, 0x41, 0x04, 0x14]), "A\u{0414}");
        assert_eq!(decode_text(&[0xEF, 0xBB, 0xBF, 0xC3, 0xA9]), "\u{e9}");
        // PDFDocEncoding specials
        assert_eq!(decode_text(&[0x80, 0x84, 0xA0, 0xE9]), "\u{2022}\u{2014}\u{20AC}\u{e9}");
        assert_eq!(decode_text(&[0x18]), "\u{02D8}");
        assert_eq!(decode_text(&[0x9F]), "\u{FFFD}");
    }

    #[test]
    fn test_text_from_utf16_is_strict() {
        assert_eq!(text_from_utf16(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
        assert_eq!(text_from_utf16(&[0x00, 0x48, 0x00, 0x69]), "");
        assert_eq!(text_from_utf16(&[0xFE, 0xFF, 0x00, 0x48, 0x00]), "");
        // Lone high surrogate
        assert_eq!(text_from_utf16(&[0xFE, 0xFF, 0xD8, 0x00]), "");
        // Surrogate pair
        assert_eq!(text_from_utf16(&[0xFE, 0xFF, 0xD8, 0x3D, 0xDE, 0x00]), "\u{1F600}");
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("D:20240315123045+05'30'").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 15));
        assert_eq!((date.hour(), date.minute(), date.second()), (12, 30, 45));
        assert_eq!(date.offset().local_minus_utc(), 5 * 3600 + 30 * 60);

        let date = parse_date("D:2023").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 1, 1));
        assert_eq!(date.offset().local_minus_utc(), 0);

        assert_eq!(parse_date("D:19991231235959Z").unwrap().year(), 1999);
        assert_eq!(
            parse_date("D:20200101000000-08'00").unwrap().offset().local_minus_utc(),
            -8 * 3600
        );

        assert!(parse_date("").is_none());
        assert!(parse_date("D:20241").is_none());
        assert!(parse_date("D:20241301").is_none());
        assert!(parse_date("D:20240101000000+25'00'").is_none());
        assert!(parse_date("D:20240101000000junk").is_none());
    }
}
