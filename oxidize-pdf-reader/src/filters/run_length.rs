//! RunLengthDecode (ISO 32000-1 Section 7.4.5)

use crate::error::{ParseError, ParseResult};

pub fn decode_run_length(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let n = usize::from(length) + 1;
                let literal = data.get(i..i + n).ok_or_else(|| {
                    ParseError::StreamDecodeError("RunLengthDecode: literal run truncated".to_string())
                })?;
                out.extend_from_slice(literal);
                i += n;
            }
            129..=255 => {
                let byte = *data.get(i).ok_or_else(|| {
                    ParseError::StreamDecodeError("RunLengthDecode: repeat run truncated".to_string())
                })?;
                let n = 257 - usize::from(length);
                out.resize(out.len() + n, byte);
                i += 1;
            }
        }
    }
    Ok(out)
}
