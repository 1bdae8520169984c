//! PDF Header Parser
//!
//! Locates the `%PDF-x.y` magic according to ISO 32000-1 Section 7.5.2.
//! Producers sometimes put a byte-order mark, whitespace or other junk in
//! front of the magic, so the first kilobyte is searched instead of requiring
//! it at offset 0.

use crate::error::{ParseError, ParseResult};
use crate::source::ByteSource;

/// How far into the file the header magic may start
pub const HEADER_SEARCH_WINDOW: usize = 1024;

const MAGIC: &[u8] = b"%PDF-";

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Cross-reference streams and object streams arrived with 1.5
    pub fn supports_xref_streams(&self) -> bool {
        *self >= PdfVersion::new(1, 5)
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Offset of the `%` of the magic
    pub offset: u64,
    /// Whether a comment line with high-bit bytes follows the header
    pub has_binary_marker: bool,
}

impl PdfHeader {
    /// Find and parse the header in the first [`HEADER_SEARCH_WINDOW`] bytes
    pub fn scan(source: &dyn ByteSource) -> ParseResult<Self> {
        let window = source.read_range(0, HEADER_SEARCH_WINDOW + 16)?;
        Self::parse_bytes(&window)
    }

    pub fn parse_bytes(window: &[u8]) -> ParseResult<Self> {
        let search = &window[..window.len().min(HEADER_SEARCH_WINDOW + MAGIC.len())];
        let start = search
            .windows(MAGIC.len())
            .position(|w| w == MAGIC)
            .ok_or(ParseError::InvalidHeader)?;

        let rest = &window[start + MAGIC.len()..];
        let version = match rest {
            [major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9', ..] => {
                PdfVersion::new(major - b'0', minor - b'0')
            }
            _ => return Err(ParseError::InvalidHeader),
        };

        Ok(PdfHeader {
            version,
            offset: start as u64,
            has_binary_marker: Self::check_binary_marker(&rest[3..]),
        })
    }

    fn check_binary_marker(after_version: &[u8]) -> bool {
        let line_start = after_version
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .map(|p| p + 1);
        let Some(mut pos) = line_start else {
            return false;
        };
        while after_version.get(pos).is_some_and(|&b| b == b'\n' || b == b'\r') {
            pos += 1;
        }
        match after_version.get(pos..) {
            Some([b'%', rest @ ..]) => rest.iter().take(4).filter(|&&b| b >= 128).count() >= 4,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_header() {
        let header = PdfHeader::parse_bytes(b"%PDF-1.7\n1 0 obj").unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 7));
        assert_eq!(header.offset, 0);
        assert!(!header.has_binary_marker);
        assert_eq!(header.version.to_string(), "1.7");
    }

    #[test]
    fn test_header_after_junk() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"  \r\n%PDF-1.4\r\n%\xE2\xE3\xCF\xD3\r\n");
        let header = PdfHeader::parse_bytes(&data).unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 4));
        assert_eq!(header.offset, 7);
        assert!(header.has_binary_marker);
    }

    #[test]
    fn test_missing_or_bad_header() {
        assert!(matches!(
            PdfHeader::parse_bytes(b"not a pdf"),
            Err(ParseError::InvalidHeader)
        ));
        assert!(matches!(
            PdfHeader::parse_bytes(b"%PDF-x.y\n"),
            Err(ParseError::InvalidHeader)
        ));

        let mut far = vec![b' '; HEADER_SEARCH_WINDOW + 10];
        far.extend_from_slice(b"%PDF-1.4\n");
        assert!(PdfHeader::parse_bytes(&far).is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(PdfVersion::new(1, 5).supports_xref_streams());
        assert!(PdfVersion::new(2, 0).supports_xref_streams());
        assert!(!PdfVersion::new(1, 4).supports_xref_streams());
    }
}
