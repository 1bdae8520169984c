//! ASCII85Decode (ISO 32000-1 Section 7.4.3)

use crate::error::{ParseError, ParseResult};

/// Decode base-85 data up to the `~>` end marker.
///
/// Bytes outside the `!`..=`u` alphabet (whitespace included) are skipped.
/// A final group of `k` characters yields `k - 1` bytes.
pub fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut count = 0;

    for &byte in data {
        match byte {
            b'~' => break,
            b'z' if count == 0 => out.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[count] = byte - b'!';
                count += 1;
                if count == 5 {
                    out.extend_from_slice(&group_value(&group)?.to_be_bytes());
                    count = 0;
                }
            }
            _ => {}
        }
    }

    match count {
        0 => {}
        1 => {
            return Err(ParseError::StreamDecodeError(
                "ASCII85Decode: final group has a single character".to_string(),
            ))
        }
        _ => {
            // Pad with the highest digit and keep count - 1 bytes
            for slot in &mut group[count..] {
                *slot = 84;
            }
            let bytes = group_value(&group)?.to_be_bytes();
            out.extend_from_slice(&bytes[..count - 1]);
        }
    }
    Ok(out)
}

fn group_value(group: &[u8; 5]) -> ParseResult<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));
    u32::try_from(value)
        .map_err(|_| ParseError::StreamDecodeError("ASCII85Decode: group overflows".to_string()))
}
