//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2. The lexer works
//! over an in-memory byte window; `base` is the absolute file offset of the
//! first byte so that positions reported in errors and stream offsets are
//! absolute.

use crate::error::{ParseError, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// String (literal or hexadecimal)
    String(Vec<u8>),

    /// Name object without its leading slash, `#xx` escapes decoded
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Stream keyword
    Stream,

    /// Endstream keyword
    EndStream,

    /// Obj keyword
    Obj,

    /// Endobj keyword
    EndObj,

    /// The `R` of an indirect reference
    Ref,

    /// xref keyword
    XRef,

    /// trailer keyword
    Trailer,

    /// StartXRef keyword
    StartXRef,

    /// Null object
    Null,

    /// Any other bare word (operators, garbage)
    Keyword(String),

    /// End of the window
    Eof,
}

pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(ch: u8) -> bool {
    !is_whitespace(ch) && !is_delimiter(ch)
}

fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// PDF Lexer over a byte window
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Lexer<'a> {
    /// Create a lexer whose first byte sits at file offset 0
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Create a lexer whose first byte sits at file offset `base`
    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Position inside the window
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Absolute file position
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn eof(&self) -> ParseError {
        ParseError::UnexpectedEof {
            position: self.position(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if is_whitespace(ch) {
                self.pos += 1;
            } else if ch == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Peek the next token without consuming it
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    Ok(Token::DictStart)
                } else {
                    self.read_hex_string()
                }
            }
            b'>' => {
                if self.data.get(self.pos + 1) == Some(&b'>') {
                    self.pos += 2;
                    Ok(Token::DictEnd)
                } else if self.pos + 1 >= self.data.len() {
                    Err(self.eof())
                } else {
                    Err(ParseError::syntax(self.position(), "Expected '>' after '>'"))
                }
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ArrayEnd)
            }
            b'{' | b'}' | b')' => {
                self.pos += 1;
                Ok(Token::Keyword((ch as char).to_string()))
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            _ => self.read_keyword(),
        }
    }

    fn read_name(&mut self) -> ParseResult<Token> {
        self.pos += 1; // '/'
        let mut bytes = Vec::new();
        while let Some(ch) = self.peek() {
            if !is_regular(ch) {
                break;
            }
            self.pos += 1;
            if ch == b'#' {
                let hi = self.data.get(self.pos).copied().and_then(hex_value);
                let lo = self.data.get(self.pos + 1).copied().and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    bytes.push(hi << 4 | lo);
                    self.pos += 2;
                    continue;
                }
            }
            bytes.push(ch);
        }
        Ok(Token::Name(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_literal_string(&mut self) -> ParseResult<Token> {
        self.pos += 1; // '('
        let mut out = Vec::new();
        let mut depth = 1usize;

        loop {
            let ch = self.bump().ok_or_else(|| self.eof())?;
            match ch {
                b'(' => {
                    depth += 1;
                    out.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(ch);
                }
                b'\\' => {
                    let esc = self.bump().ok_or_else(|| self.eof())?;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'(' | b')' | b'\\' => out.push(esc),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        other => out.push(other),
                    }
                }
                b'\r' => {
                    // Unescaped end-of-line markers read as a single \n
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    out.push(b'\n');
                }
                _ => out.push(ch),
            }
        }

        Ok(Token::String(out))
    }

    fn read_hex_string(&mut self) -> ParseResult<Token> {
        self.pos += 1; // '<'
        let mut out = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let ch = self.bump().ok_or_else(|| self.eof())?;
            if ch == b'>' {
                break;
            }
            if is_whitespace(ch) {
                continue;
            }
            let nibble = hex_value(ch).ok_or_else(|| {
                ParseError::syntax(self.position() - 1, "Invalid character in hex string")
            })?;
            match pending.take() {
                Some(hi) => out.push(hi << 4 | nibble),
                None => pending = Some(nibble),
            }
        }

        // Odd number of digits: the final digit is followed by an implied 0
        if let Some(hi) = pending {
            out.push(hi << 4);
        }

        Ok(Token::String(out))
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        let mut seen_dot = false;
        let mut text = String::new();

        // Collapse runs of leading signs ("--5", "+-5") to the last one
        while let Some(ch @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            text.clear();
            text.push(ch as char);
        }

        while let Some(ch) = self.peek() {
            match ch {
                b'0'..=b'9' => text.push(ch as char),
                b'.' if !seen_dot => {
                    seen_dot = true;
                    text.push('.');
                }
                _ => break,
            }
            self.pos += 1;
        }

        // Trailing garbage such as "12.5.3" or "1e5" is swallowed up to the next delimiter
        while let Some(ch) = self.peek() {
            if !is_regular(ch) {
                break;
            }
            self.pos += 1;
        }

        let digits = text.trim_start_matches(['+', '-']).replace('.', "");
        if digits.is_empty() {
            // A lone sign or dot reads as zero
            return Ok(Token::Integer(0));
        }

        if seen_dot {
            let normalized = if text.ends_with('.') {
                format!("{text}0")
            } else {
                text.clone()
            };
            normalized
                .parse::<f64>()
                .map(Token::Real)
                .map_err(|_| ParseError::syntax(self.base + start as u64, "Invalid real number"))
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                // Out of range integers degrade to reals
                Err(_) => text.parse::<f64>().map(Token::Real).map_err(|_| {
                    ParseError::syntax(self.base + start as u64, "Invalid integer")
                }),
            }
        }
    }

    fn read_keyword(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !is_regular(ch) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // A lone delimiter we have no token for
            self.pos += 1;
        }
        let word = &self.data[start..self.pos];
        Ok(match word {
            b"true" => Token::Boolean(true),
            b"false" => Token::Boolean(false),
            b"null" => Token::Null,
            b"obj" => Token::Obj,
            b"endobj" => Token::EndObj,
            b"stream" => Token::Stream,
            b"endstream" => Token::EndStream,
            b"R" => Token::Ref,
            b"xref" => Token::XRef,
            b"trailer" => Token::Trailer,
            b"startxref" => Token::StartXRef,
            _ => Token::Keyword(String::from_utf8_lossy(word).into_owned()),
        })
    }

    /// Consume the end-of-line marker that follows the `stream` keyword.
    ///
    /// Accepts CRLF, LF and, leniently, a lone CR. Spaces before the marker are skipped.
    pub fn read_newline(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
    }

    /// Read an unsigned integer made only of ASCII digits
    pub fn read_unsigned(&mut self) -> ParseResult<u64> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
        if start == self.pos {
            return if self.is_at_end() {
                Err(self.eof())
            } else {
                Err(ParseError::syntax(self.position(), "Expected digits"))
            };
        }
        let mut value: u64 = 0;
        for &d in &self.data[start..self.pos] {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(d - b'0')))
                .ok_or_else(|| ParseError::syntax(self.base + start as u64, "Number overflow"))?;
        }
        Ok(value)
    }
}
