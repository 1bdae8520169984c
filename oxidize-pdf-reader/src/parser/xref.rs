//! PDF Cross-Reference Table Parser
//!
//! Parses xref sections according to ISO 32000-1 Section 7.5.4 (classic
//! tables) and 7.5.8 (cross-reference streams), and walks the `Prev` chain of
//! incremental updates. Entries are kept in a dense vector indexed by object
//! number. Sections are visited newest first and an entry, once set, is never
//! replaced by an older revision.

use super::lexer::{Lexer, Token};
use super::objects::PdfObject;
use super::reader::ObjectLoader;
use super::trailer::PdfTrailer;
use super::xref_stream::XRefStream;
use crate::error::{ParseError, ParseResult};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Largest object number the table will grow to hold
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// How many trailing bytes are searched for `startxref`
const STARTXREF_WINDOW: usize = 1024;

const INITIAL_SECTION_WINDOW: usize = 64 * 1024;

/// Where an object lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Deleted or never used
    Free,
    /// Stored at a byte offset in the file
    Direct { offset: u64, generation: u16 },
    /// Stored at position `index` of the object stream `container`
    InContainer { container: u32, index: u32 },
}

/// One parsed cross-reference section and its trailer
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub entries: Vec<(u32, XRefEntry)>,
    pub trailer: PdfTrailer,
}

/// Cross-reference table
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: Vec<Option<XRefEntry>>,
    trailer: PdfTrailer,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for an object number; `None` when the table knows nothing about it
    pub fn get(&self, number: u32) -> Option<XRefEntry> {
        self.entries.get(number as usize).copied().flatten()
    }

    /// Size of the dense table (highest object number + 1)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    pub fn trailer(&self) -> &PdfTrailer {
        &self.trailer
    }

    pub fn set_trailer(&mut self, trailer: PdfTrailer) {
        self.trailer = trailer;
    }

    /// Record an entry unless one is already present. Returns whether it was stored.
    pub fn insert_if_absent(&mut self, number: u32, entry: XRefEntry) -> bool {
        if number > MAX_OBJECT_NUMBER {
            debug!("Ignoring xref entry for object {number}: beyond table limit");
            return false;
        }
        let index = number as usize;
        if index >= self.entries.len() {
            self.entries.resize(index + 1, None);
        }
        match self.entries[index] {
            Some(_) => false,
            None => {
                self.entries[index] = Some(entry);
                true
            }
        }
    }

    /// Merge a section; existing entries win
    pub fn merge(&mut self, entries: impl IntoIterator<Item = (u32, XRefEntry)>) -> usize {
        entries
            .into_iter()
            .filter(|&(number, entry)| self.insert_if_absent(number, entry))
            .count()
    }

    /// Drop every entry at or beyond `size`
    pub fn truncate(&mut self, size: usize) {
        self.entries.truncate(size);
    }

    /// Known entries in object-number order
    pub fn iter(&self) -> impl Iterator<Item = (u32, XRefEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|e| (i as u32, e)))
    }

    /// Locate `startxref` and load the whole revision chain it points at
    pub fn parse(loader: &ObjectLoader) -> ParseResult<Self> {
        let start = find_startxref(loader)?;
        Self::load_chain(loader, start)
    }

    /// Load the section at `start` and every older revision reachable through `Prev`
    pub fn load_chain(loader: &ObjectLoader, start: u64) -> ParseResult<Self> {
        let mut table = XRefTable::new();
        let mut visited = HashSet::new();
        let mut newest: Option<PdfTrailer> = None;
        let mut largest_size: Option<u32> = None;
        let mut next = Some(start);

        while let Some(offset) = next {
            if !visited.insert(offset) {
                warn!("Xref Prev chain loops back to offset {offset}; stopping");
                break;
            }

            let section = parse_section_at(loader, offset)?;
            let added = table.merge(section.entries);
            debug!("Xref section at {offset}: {added} new entries");

            // Hybrid files: the stream fills gaps of this revision's table
            if let Some(stm) = section.trailer.xref_stm() {
                if visited.insert(stm) {
                    match parse_section_at(loader, stm) {
                        Ok(stream_section) => {
                            table.merge(stream_section.entries);
                        }
                        Err(e) => warn!("Ignoring unreadable XRefStm at {stm}: {e}"),
                    }
                }
            }

            largest_size = largest_size.max(section.trailer.size());
            next = section.trailer.prev();
            if newest.is_none() {
                newest = Some(section.trailer);
            }
        }

        let mut trailer = newest.ok_or_else(|| ParseError::InvalidXRef("no sections".into()))?;
        let size = match trailer.size() {
            Some(size) => size,
            None => {
                let size = largest_size.unwrap_or(table.len() as u32);
                trailer.dict.insert("Size", PdfObject::Integer(i64::from(size)));
                size
            }
        };
        table.truncate(size as usize);
        table.trailer = trailer;
        Ok(table)
    }
}

/// Find the offset named by the last `startxref` keyword near the end of the file
pub fn find_startxref(loader: &ObjectLoader) -> ParseResult<u64> {
    let source = loader.source();
    let len = source.len();
    let window_start = len.saturating_sub(STARTXREF_WINDOW as u64);
    let tail = source.read_range(window_start, STARTXREF_WINDOW)?;

    if !tail.windows(5).any(|w| w == b"%%EOF") {
        debug!("No %%EOF marker near the end of the file");
    }

    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| ParseError::InvalidXRef("startxref not found".to_string()))?;

    let mut lexer = Lexer::with_base(&tail[pos + keyword.len()..], window_start);
    let offset = lexer
        .read_unsigned()
        .map_err(|_| ParseError::InvalidXRef("startxref has no offset".to_string()))?;

    if offset >= len {
        return Err(ParseError::InvalidXRef(format!(
            "startxref offset {offset} beyond end of file ({len} bytes)"
        )));
    }
    Ok(offset)
}

/// Parse whichever kind of section starts at `offset`
pub fn parse_section_at(loader: &ObjectLoader, offset: u64) -> ParseResult<XRefSection> {
    let head = loader.source().read_range(offset, 64)?;
    let start = head
        .iter()
        .position(|&b| !super::lexer::is_whitespace(b))
        .unwrap_or(head.len());

    if head[start..].starts_with(b"xref") {
        parse_classic_at(loader, offset + start as u64)
    } else {
        XRefStream::load(loader, offset + start as u64).map(XRefStream::into_section)
    }
}

fn parse_classic_at(loader: &ObjectLoader, offset: u64) -> ParseResult<XRefSection> {
    let source = loader.source();
    let available = source.len().saturating_sub(offset);
    let mut window = INITIAL_SECTION_WINDOW;

    loop {
        let data = source.read_range(offset, window)?;
        let complete = data.len() as u64 >= available;
        match parse_classic_section(&data, offset, complete) {
            Err(ParseError::UnexpectedEof { .. }) if !complete => {
                window = window.saturating_mul(4);
            }
            other => return other,
        }
    }
}

/// Parse a classic `xref ... trailer << >>` section held in `data`
pub fn parse_classic_section(data: &[u8], base: u64, complete: bool) -> ParseResult<XRefSection> {
    let mut lexer = Lexer::with_base(data, base);
    match lexer.next_token()? {
        Token::XRef => {}
        other => {
            return Err(ParseError::InvalidXRef(format!(
                "expected 'xref', found {other:?}"
            )))
        }
    }

    let mut entries = Vec::new();
    loop {
        lexer.skip_whitespace();
        if lexer.remaining().starts_with(b"trailer") {
            lexer.next_token()?;
            break;
        }
        if lexer.is_at_end() {
            return Err(ParseError::UnexpectedEof {
                position: lexer.position(),
            });
        }

        let first = xref_number(&mut lexer)?;
        let count = xref_number(&mut lexer)?;
        for i in 0..count {
            let offset = xref_number(&mut lexer)?;
            let generation = xref_number(&mut lexer)?;
            lexer.skip_whitespace();
            let flag = match lexer.remaining().first() {
                Some(&flag) => flag,
                None => {
                    return Err(ParseError::UnexpectedEof {
                        position: lexer.position(),
                    })
                }
            };
            lexer.seek(lexer.offset() + 1);

            let Some(number) = first.checked_add(i).and_then(|n| u32::try_from(n).ok()) else {
                continue;
            };
            let generation = u16::try_from(generation).map_err(|_| {
                ParseError::InvalidXRef(format!("generation {generation} out of range"))
            })?;
            let entry = match flag {
                b'n' => XRefEntry::Direct { offset, generation },
                b'f' => XRefEntry::Free,
                other => {
                    return Err(ParseError::InvalidXRef(format!(
                        "invalid entry type '{}' for object {number}",
                        other as char
                    )))
                }
            };
            entries.push((number, entry));
        }
    }

    let trailer = match PdfObject::parse(&mut lexer) {
        Ok(PdfObject::Dictionary(dict)) => PdfTrailer::new(dict),
        Ok(other) => {
            return Err(ParseError::InvalidTrailer(format!(
                "expected dictionary, found {}",
                other.kind_name()
            )))
        }
        Err(e @ ParseError::UnexpectedEof { .. }) if !complete => return Err(e),
        Err(e) => return Err(ParseError::InvalidTrailer(e.to_string())),
    };

    Ok(XRefSection { entries, trailer })
}

fn xref_number(lexer: &mut Lexer<'_>) -> ParseResult<u64> {
    lexer.read_unsigned().map_err(|e| match e {
        ParseError::UnexpectedEof { .. } => e,
        other => ParseError::InvalidXRef(other.to_string()),
    })
}
