//! Error types for the reader
//!
//! Every parsing entry point returns [`ParseResult`]. Navigation through
//! [`Value`](crate::Value) never surfaces these errors: a reference that fails
//! to resolve degrades to Null instead.

use std::io;

/// Result type for parsing and resolution
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while opening a document or decoding its structures
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Empty file")]
    EmptyFile,

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: u64, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Unexpected end of data at position {position}")]
    UnexpectedEof { position: u64 },

    #[error("Invalid xref table: {0}")]
    InvalidXRef(String),

    #[error("Invalid trailer: {0}")]
    InvalidTrailer(String),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Encryption not supported: {0}")]
    EncryptionNotSupported(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Xref recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("File too large for recovery: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Document is closed")]
    DocumentClosed,
}

impl ParseError {
    /// Malformed header, footer, xref or trailer syntax.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ParseError::EmptyFile
                | ParseError::InvalidHeader
                | ParseError::SyntaxError { .. }
                | ParseError::UnexpectedToken { .. }
                | ParseError::UnexpectedEof { .. }
                | ParseError::InvalidXRef(_)
                | ParseError::InvalidTrailer(_)
                | ParseError::MissingKey(_)
                | ParseError::RecoveryFailed(_)
                | ParseError::FileTooLarge { .. }
        )
    }

    /// Security handler problems: unsupported configurations and wrong passwords.
    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            ParseError::EncryptionNotSupported(_) | ParseError::InvalidPassword
        )
    }

    /// Whether the caller can retry `open` and hope for a different outcome.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ParseError::InvalidPassword)
    }

    pub(crate) fn syntax(position: u64, message: impl Into<String>) -> Self {
        ParseError::SyntaxError {
            position,
            message: message.into(),
        }
    }
}

impl From<ParseError> for io::Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Strict accessor failures on [`Value`](crate::Value)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("value is missing")]
    Missing,

    #[error("expected {expected}, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
}
