//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3.
//! Streams are recorded by position only: the parser stops right after the
//! `stream` keyword and keeps the absolute offset of the first data byte.

use super::lexer::{Lexer, Token};
use crate::error::{ParseError, ParseResult};
use crate::objects::ObjectId;
use std::collections::HashMap;

/// Arrays and dictionaries nested deeper than this are rejected
pub const MAX_NESTING_DEPTH: usize = 512;

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PDF String object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

/// PDF Dictionary object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub HashMap<PdfName, PdfObject>);

/// PDF Stream object: header dictionary plus where its data starts in the file
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    /// Absolute offset of the first byte after the `stream` line
    pub offset: u64,
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PdfObject {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(ObjectId),
}

impl PdfObject {
    /// Parse a direct object from a lexer
    pub fn parse(lexer: &mut Lexer<'_>) -> ParseResult<Self> {
        Self::parse_at_depth(lexer, 0)
    }

    fn parse_at_depth(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<Self> {
        let token = lexer.next_token()?;
        Self::parse_from_token(lexer, token, depth)
    }

    fn parse_from_token(lexer: &mut Lexer<'_>, token: Token, depth: usize) -> ParseResult<Self> {
        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Integer(i) => Ok(Self::integer_or_reference(lexer, i)),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::String(s) => Ok(PdfObject::String(PdfString(s))),
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::ArrayStart => Self::parse_array(lexer, depth + 1),
            Token::DictStart => Self::parse_dictionary(lexer, depth + 1).map(PdfObject::Dictionary),
            Token::Eof => Err(ParseError::UnexpectedEof {
                position: lexer.position(),
            }),
            _ => Err(ParseError::UnexpectedToken {
                expected: "PDF object".to_string(),
                found: format!("{token:?}"),
            }),
        }
    }

    /// `n g R` is a reference; anything else leaves the integer alone
    fn integer_or_reference(lexer: &mut Lexer<'_>, value: i64) -> PdfObject {
        let saved = lexer.offset();
        if let (Ok(Token::Integer(generation)), Ok(Token::Ref)) =
            (lexer.next_token(), lexer.next_token())
        {
            if let (Ok(number), Ok(generation)) = (u32::try_from(value), u16::try_from(generation))
            {
                return PdfObject::Reference(ObjectId::new(number, generation));
            }
        }
        lexer.seek(saved);
        PdfObject::Integer(value)
    }

    fn check_depth(lexer: &Lexer<'_>, depth: usize) -> ParseResult<()> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::syntax(
                lexer.position(),
                format!("Nesting deeper than {MAX_NESTING_DEPTH} levels"),
            ));
        }
        Ok(())
    }

    fn parse_array(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<Self> {
        Self::check_depth(lexer, depth)?;
        let mut elements = Vec::new();

        loop {
            let token = lexer.next_token()?;
            match token {
                Token::ArrayEnd => break,
                _ => elements.push(Self::parse_from_token(lexer, token, depth)?),
            }
        }

        Ok(PdfObject::Array(PdfArray(elements)))
    }

    fn parse_dictionary(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<PdfDictionary> {
        Self::check_depth(lexer, depth)?;
        let mut dict = HashMap::new();

        loop {
            let token = lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    // A key directly followed by `>>` has no value; treat it as null
                    if lexer.peek_token()? == Token::DictEnd {
                        dict.insert(PdfName(key), PdfObject::Null);
                        continue;
                    }
                    let value = Self::parse_at_depth(lexer, depth)?;
                    dict.insert(PdfName(key), value);
                }
                Token::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        position: lexer.position(),
                    })
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "dictionary key (name) or >>".to_string(),
                        found: format!("{token:?}"),
                    });
                }
            }
        }

        Ok(PdfDictionary(dict))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Reals, with integers widened
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PdfObject::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionaries, and the header dictionary of streams
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Short lowercase name of the variant
    pub fn kind_name(&self) -> &'static str {
        match self {
            PdfObject::Null => "null",
            PdfObject::Boolean(_) => "boolean",
            PdfObject::Integer(_) => "integer",
            PdfObject::Real(_) => "real",
            PdfObject::String(_) => "string",
            PdfObject::Name(_) => "name",
            PdfObject::Array(_) => "array",
            PdfObject::Dictionary(_) => "dictionary",
            PdfObject::Stream(_) => "stream",
            PdfObject::Reference(_) => "reference",
        }
    }
}

impl PdfDictionary {
    pub fn new() -> Self {
        PdfDictionary(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(&PdfName(key.to_string()))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(PdfName(key.into()), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&PdfName(key.to_string()))
    }

    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.remove(&PdfName(key.to_string()))
    }

    /// Value of the /Type key
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfObject)> {
        self.0.iter()
    }
}

impl PdfArray {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }
}

/// Parse one `n g obj ... endobj` unit.
///
/// `base` is the file offset of `data[0]`. When `complete` is false the window
/// may have cut the object short, and running out of bytes is reported as
/// [`ParseError::UnexpectedEof`] so the caller can retry with a larger window.
pub fn parse_indirect_object(
    data: &[u8],
    base: u64,
    complete: bool,
) -> ParseResult<(ObjectId, PdfObject)> {
    let mut lexer = Lexer::with_base(data, base);

    let number = expect_integer(&mut lexer, "object number")?;
    let generation = expect_integer(&mut lexer, "generation number")?;
    match lexer.next_token()? {
        Token::Obj => {}
        Token::Eof => {
            return Err(ParseError::UnexpectedEof {
                position: lexer.position(),
            })
        }
        other => {
            return Err(ParseError::UnexpectedToken {
                expected: "obj".to_string(),
                found: format!("{other:?}"),
            })
        }
    }

    let number = u32::try_from(number)
        .map_err(|_| ParseError::syntax(base, format!("Object number {number} out of range")))?;
    let generation = u16::try_from(generation)
        .map_err(|_| ParseError::syntax(base, format!("Generation {generation} out of range")))?;
    let id = ObjectId::new(number, generation);

    let object = PdfObject::parse(&mut lexer)?;

    let object = match (object, lexer.peek_token()?) {
        (PdfObject::Dictionary(dict), Token::Stream) => {
            lexer.next_token()?;
            lexer.read_newline();
            PdfObject::Stream(PdfStream {
                dict,
                offset: lexer.position(),
            })
        }
        (_, Token::Eof) if !complete => {
            return Err(ParseError::UnexpectedEof {
                position: lexer.position(),
            })
        }
        (object, _) => object,
    };

    Ok((id, object))
}

fn expect_integer(lexer: &mut Lexer<'_>, what: &str) -> ParseResult<i64> {
    match lexer.next_token()? {
        Token::Integer(i) => Ok(i),
        Token::Eof => Err(ParseError::UnexpectedEof {
            position: lexer.position(),
        }),
        other => Err(ParseError::UnexpectedToken {
            expected: what.to_string(),
            found: format!("{other:?}"),
        }),
    }
}
