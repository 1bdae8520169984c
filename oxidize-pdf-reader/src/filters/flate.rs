//! FlateDecode, streamed through zlib
//!
//! Some writers emit bare deflate data without the two-byte zlib header.
//! The first two bytes decide which decoder runs.

use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::{self, Chain, Cursor, Read};
use tracing::debug;

type Input = Chain<Cursor<Vec<u8>>, Box<dyn Read + Send>>;

enum Decoder {
    Pending(Box<dyn Read + Send>),
    Zlib(ZlibDecoder<Input>),
    Raw(DeflateDecoder<Input>),
    Failed,
}

/// Inflates zlib or raw deflate data as it is read
pub struct FlateReader {
    decoder: Decoder,
}

impl FlateReader {
    pub fn new(input: Box<dyn Read + Send>) -> Self {
        Self {
            decoder: Decoder::Pending(input),
        }
    }

    fn start(mut input: Box<dyn Read + Send>) -> io::Result<Decoder> {
        let mut header = [0u8; 2];
        let mut filled = 0;
        while filled < header.len() {
            match input.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        let zlib = filled == 2 && is_zlib_header(header[0], header[1]);
        let input = Cursor::new(header[..filled].to_vec()).chain(input);
        Ok(if zlib {
            Decoder::Zlib(ZlibDecoder::new(input))
        } else {
            debug!("FlateDecode data has no zlib header, inflating raw deflate");
            Decoder::Raw(DeflateDecoder::new(input))
        })
    }
}

/// CMF/FLG check from RFC 1950: deflate method and a valid header checksum
fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    (cmf & 0x0F) == 8 && ((u16::from(cmf) << 8) | u16::from(flg)) % 31 == 0
}

impl Read for FlateReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Decoder::Pending(_) = self.decoder {
            if let Decoder::Pending(input) = std::mem::replace(&mut self.decoder, Decoder::Failed) {
                self.decoder = Self::start(input)?;
            }
        }
        let result = match &mut self.decoder {
            Decoder::Zlib(inner) => inner.read(buf),
            Decoder::Raw(inner) => inner.read(buf),
            Decoder::Pending(_) | Decoder::Failed => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "stream input failed",
            )),
        };
        result.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => io::Error::new(
                io::ErrorKind::InvalidData,
                format!("FlateDecode: {e}"),
            ),
            _ => e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn inflate(data: Vec<u8>) -> io::Result<Vec<u8>> {
        let mut reader = FlateReader::new(Box::new(Cursor::new(data)));
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_inflate() {
        let text = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET".repeat(50);
        assert_eq!(inflate(compress(&text)).unwrap(), text);
    }

    #[test]
    fn test_raw_deflate_without_header() {
        let text = b"0 0 m 100 100 l S\n".repeat(40);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&text).unwrap();
        let raw = encoder.finish().unwrap();
        assert!(!is_zlib_header(raw[0], raw[1]));

        assert_eq!(inflate(raw).unwrap(), text);
    }

    #[test]
    fn test_zlib_header_detection() {
        assert!(is_zlib_header(0x78, 0x9c));
        assert!(is_zlib_header(0x78, 0x01));
        assert!(is_zlib_header(0x78, 0xda));
        assert!(!is_zlib_header(0x78, 0x9d));
        assert!(!is_zlib_header(0x79, 0x9c));
    }

    #[test]
    fn test_truncated_input_does_not_panic() {
        for data in [vec![], vec![0x78], vec![0x78, 0x9c]] {
            let _ = inflate(data);
        }
    }

    #[test]
    fn test_corrupt_data_is_invalid_data() {
        let err = inflate(vec![0x78, 0x9c, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
