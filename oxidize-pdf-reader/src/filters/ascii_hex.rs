//! ASCIIHexDecode (ISO 32000-1 Section 7.4.2)

use crate::error::{ParseError, ParseResult};
use crate::parser::lexer::is_whitespace;

/// Decode hex pairs up to `>`. Whitespace is ignored and a trailing odd
/// digit is read as if followed by `0`.
pub fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        if is_whitespace(byte) {
            continue;
        }
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => {
                return Err(ParseError::StreamDecodeError(format!(
                    "ASCIIHexDecode: invalid character 0x{byte:02x}"
                )))
            }
        };
        match high.take() {
            Some(h) => out.push(h << 4 | digit),
            None => high = Some(digit),
        }
    }

    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}
