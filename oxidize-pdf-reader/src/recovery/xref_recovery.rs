//! XRef recovery for corrupted PDF files
//!
//! Rebuilds a cross-reference table by scanning the raw bytes for
//! `id gen obj` headers, and finds a trailer by looking for the last
//! `trailer` keyword. Nothing is returned unless both halves succeed.

use crate::error::{ParseError, ParseResult};
use crate::parser::lexer::{is_delimiter, is_whitespace, Lexer};
use crate::parser::objects::{PdfDictionary, PdfObject};
use crate::parser::reader::ObjectLoader;
use crate::parser::trailer::PdfTrailer;
use crate::parser::xref::{XRefEntry, XRefTable, MAX_OBJECT_NUMBER};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Recovery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Distinct objects found by the scan
    pub objects_found: usize,
    /// Later definitions of an already-seen object number
    pub duplicates_skipped: usize,
    pub max_object_id: u32,
    /// The trailer came from an xref stream dictionary rather than a `trailer` keyword
    pub trailer_from_xref_stream: bool,
}

/// A reconstructed table and how it was found
#[derive(Debug, Clone)]
pub struct RecoveredXRef {
    pub table: XRefTable,
    pub stats: RecoveryStats,
}

/// XRef recovery engine
#[derive(Debug, Clone)]
pub struct XRefRecovery {
    max_bytes: u64,
}

impl XRefRecovery {
    /// `max_bytes` caps the size of source the scan is willing to read
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn recover(&self, loader: &ObjectLoader) -> ParseResult<RecoveredXRef> {
        let size = loader.source().len();
        if size > self.max_bytes {
            return Err(ParseError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        let len = usize::try_from(size).map_err(|_| ParseError::FileTooLarge {
            size,
            limit: self.max_bytes,
        })?;
        let data = loader.source().read_range(0, len)?;

        let (objects, duplicates_skipped) = scan_objects(&data);
        if objects.is_empty() {
            return Err(ParseError::RecoveryFailed("no objects found".to_string()));
        }

        let mut table = XRefTable::new();
        for (&number, &(offset, generation)) in &objects {
            table.insert_if_absent(number, XRefEntry::Direct { offset, generation });
        }
        let max_object_id = objects.keys().next_back().copied().unwrap_or(0);

        let (mut trailer, trailer_from_xref_stream) = match find_trailer(&data) {
            Some(dict) => (dict, false),
            None => {
                let dict = find_xref_stream_trailer(loader, &objects).ok_or_else(|| {
                    ParseError::RecoveryFailed("no trailer dictionary found".to_string())
                })?;
                (dict, true)
            }
        };

        // The recovered table replaces every revision
        trailer.remove("Prev");
        trailer.remove("XRefStm");
        let declared = PdfTrailer::new(trailer.clone()).size().unwrap_or(0);
        let size = declared.max(max_object_id.saturating_add(1));
        trailer.insert("Size", PdfObject::Integer(i64::from(size)));
        table.set_trailer(PdfTrailer::new(trailer));

        let stats = RecoveryStats {
            objects_found: objects.len(),
            duplicates_skipped,
            max_object_id,
            trailer_from_xref_stream,
        };
        warn!(
            "Recovered xref table: {} objects, {} duplicates skipped",
            stats.objects_found, stats.duplicates_skipped
        );
        Ok(RecoveredXRef { table, stats })
    }
}

/// Map of object number to (offset, generation), first occurrence wins
fn scan_objects(data: &[u8]) -> (BTreeMap<u32, (u64, u16)>, usize) {
    let mut objects = BTreeMap::new();
    let mut duplicates = 0;

    let mut pos = 0;
    while let Some(found) = find(&data[pos..], b"obj") {
        let at = pos + found;
        pos = at + 3;

        let followed_ok = data.get(at + 3).map_or(true, |&b| !is_regular(b));
        let preceded_ok = at > 0 && is_whitespace(data[at - 1]);
        if !followed_ok || !preceded_ok {
            continue;
        }

        let Some((number, generation, offset)) = parse_header_before(data, at) else {
            continue;
        };
        if number > MAX_OBJECT_NUMBER {
            continue;
        }
        match objects.entry(number) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert((offset as u64, generation));
            }
            std::collections::btree_map::Entry::Occupied(_) => {
                debug!("Object {number} defined again at {offset}; keeping the first");
                duplicates += 1;
            }
        }
    }

    (objects, duplicates)
}

/// Read the last two integers on the line ending at `obj_at`
fn parse_header_before(data: &[u8], obj_at: usize) -> Option<(u32, u16, usize)> {
    let line_start = data[..obj_at]
        .iter()
        .rposition(|&b| b == b'\n' || b == b'\r')
        .map_or(0, |p| p + 1);
    let line = &data[line_start..obj_at];

    let mut tokens = Vec::with_capacity(2);
    let mut end = line.len();
    while tokens.len() < 2 {
        while end > 0 && is_whitespace(line[end - 1]) {
            end -= 1;
        }
        let start = line[..end]
            .iter()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |p| p + 1);
        if start == end {
            return None;
        }
        tokens.push((start, end));
        end = start;
        // The token must be separated from what precedes it
        if end > 0 && !is_whitespace(line[end - 1]) && !is_delimiter(line[end - 1]) {
            return None;
        }
    }

    let (gen_start, gen_end) = tokens[0];
    let (id_start, id_end) = tokens[1];
    let generation = std::str::from_utf8(&line[gen_start..gen_end]).ok()?.parse().ok()?;
    let number = std::str::from_utf8(&line[id_start..id_end]).ok()?.parse().ok()?;
    Some((number, generation, line_start + id_start))
}

/// The dictionary after the last `trailer` keyword
fn find_trailer(data: &[u8]) -> Option<PdfDictionary> {
    let at = rfind(data, b"trailer")?;
    let body = at + b"trailer".len();
    let mut lexer = Lexer::with_base(&data[body..], body as u64);
    match PdfObject::parse(&mut lexer) {
        Ok(PdfObject::Dictionary(dict)) => Some(dict),
        Ok(other) => {
            debug!("trailer keyword at {at} is followed by a {}", other.kind_name());
            None
        }
        Err(e) => {
            debug!("Unparseable trailer at {at}: {e}");
            None
        }
    }
}

/// The dictionary of the last xref stream that names a Root
fn find_xref_stream_trailer(
    loader: &ObjectLoader,
    objects: &BTreeMap<u32, (u64, u16)>,
) -> Option<PdfDictionary> {
    let mut offsets: Vec<u64> = objects.values().map(|&(offset, _)| offset).collect();
    offsets.sort_unstable_by(|a, b| b.cmp(a));

    offsets.into_iter().find_map(|offset| {
        let (_, object) = loader.read_object_at(offset).ok()?;
        let stream = object.as_stream()?;
        (stream.dict.get_type() == Some("XRef") && stream.dict.contains_key("Root"))
            .then(|| stream.dict.clone())
    })
}

fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ObjectId;
    use crate::parser::test_helpers::loader_for;

    #[test]
    fn test_parse_header_before() {
        let data = b"garbage\n12 0 obj\n";
        assert_eq!(parse_header_before(data, 13), Some((12, 0, 8)));

        // Header preceded by other tokens on the same line
        let data = b"endobj 7 2 obj";
        assert_eq!(parse_header_before(data, 11), Some((7, 2, 7)));

        assert_eq!(parse_header_before(b"x obj", 2), None);
        assert_eq!(parse_header_before(b"a7 0 obj", 5), None);
    }

    #[test]
    fn test_scan_skips_endobj_and_keeps_first() {
        let data = b"1 0 obj\n(a)\nendobj\n2 0 obj\n(b)\nendobj\n1 0 obj\n(c)\nendobj\n";
        let (objects, duplicates) = scan_objects(data);
        assert_eq!(objects.len(), 2);
        assert_eq!(duplicates, 1);
        assert_eq!(objects[&1], (0, 0));
        assert_eq!(objects[&2].0, 19);
    }

    #[test]
    fn test_recover_with_trailer() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n\
            3 0 obj\n42\nendobj\nxref\ngarbage\ntrailer\n<< /Size 2 /Root 1 0 R /Prev 999 >>\n"
            .to_vec();
        let recovered = XRefRecovery::new(1 << 20).recover(&loader_for(data)).unwrap();

        assert_eq!(recovered.stats.objects_found, 2);
        assert_eq!(recovered.stats.max_object_id, 3);
        assert!(!recovered.stats.trailer_from_xref_stream);

        let trailer = recovered.table.trailer();
        assert_eq!(trailer.root().unwrap(), ObjectId::new(1, 0));
        assert_eq!(trailer.size(), Some(4));
        assert_eq!(trailer.prev(), None);
        assert_eq!(
            recovered.table.get(1),
            Some(XRefEntry::Direct { offset: 9, generation: 0 })
        );
    }

    #[test]
    fn test_recover_trailer_from_xref_stream() {
        let data = b"%PDF-1.5\n1 0 obj\n<< /Type /Catalog >>\nendobj\n\
            2 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Root 1 0 R /Length 0 >>\nstream\n\nendstream\nendobj\n"
            .to_vec();
        let recovered = XRefRecovery::new(1 << 20).recover(&loader_for(data)).unwrap();
        assert!(recovered.stats.trailer_from_xref_stream);
        assert_eq!(recovered.table.trailer().root().unwrap(), ObjectId::new(1, 0));
    }

    #[test]
    fn test_recover_failures() {
        let no_trailer = b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n".to_vec();
        assert!(matches!(
            XRefRecovery::new(1 << 20).recover(&loader_for(no_trailer)),
            Err(ParseError::RecoveryFailed(_))
        ));

        let no_objects = b"%PDF-1.4\nnothing here\n".to_vec();
        assert!(XRefRecovery::new(1 << 20).recover(&loader_for(no_objects)).is_err());

        let big = b"%PDF-1.4\n1 0 obj\n1\nendobj\n".to_vec();
        assert!(matches!(
            XRefRecovery::new(8).recover(&loader_for(big)),
            Err(ParseError::FileTooLarge { limit: 8, .. })
        ));
    }
}
