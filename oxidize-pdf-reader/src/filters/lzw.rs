//! LZWDecode (ISO 32000-1 Section 7.4.4)

use crate::error::{ParseError, ParseResult};
use tracing::debug;
use weezl::{decode::Decoder, BitOrder};

/// Decode LZW data.
///
/// `early_change` is the `/EarlyChange` parameter: when set, the code width
/// grows one code early, which is the TIFF variant of the algorithm.
pub fn decode_lzw(data: &[u8], early_change: bool) -> ParseResult<Vec<u8>> {
    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };

    let mut out = Vec::new();
    let result = decoder.into_vec(&mut out).decode(data);
    match result.status {
        Ok(_) => Ok(out),
        // Keep what was decoded before a bad code, as long as there is something
        Err(e) if !out.is_empty() => {
            debug!("LZW stream stopped after {} bytes: {e}", out.len());
            Ok(out)
        }
        Err(e) => Err(ParseError::StreamDecodeError(format!("LZWDecode: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weezl::encode::Encoder;

    fn encode(data: &[u8], early_change: bool) -> Vec<u8> {
        let mut encoder = if early_change {
            Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Encoder::new(BitOrder::Msb, 8)
        };
        encoder.encode(data).unwrap()
    }

    #[test]
    fn test_decode_both_code_width_modes() {
        let text = b"-----A---B-----A---B-----A---B ".repeat(40);
        assert_eq!(decode_lzw(&encode(&text, true), true).unwrap(), text);
        assert_eq!(decode_lzw(&encode(&text, false), false).unwrap(), text);
    }

    #[test]
    fn test_garbage_is_an_error() {
        // A code far beyond the table on the very first read
        assert!(decode_lzw(&[0xFF, 0xFF, 0xFF, 0xFF], true).is_err());
    }
}
