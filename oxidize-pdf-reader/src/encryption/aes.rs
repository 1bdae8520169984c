//! AES-128-CBC decryption (AESV2 crypt filter)
//!
//! Encrypted strings and streams start with a 16-byte IV, followed by the
//! ciphertext padded to the block size with PKCS#7.

use crate::error::{ParseError, ParseResult};
use aes::cipher::{block_padding::NoPadding, generic_array::GenericArray, BlockDecryptMut, KeyIvInit};
use std::io::{self, Read};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const BLOCK: usize = 16;

fn decryptor(key: &[u8], iv: &[u8]) -> ParseResult<Aes128CbcDec> {
    Aes128CbcDec::new_from_slices(key, iv).map_err(|_| {
        ParseError::EncryptionNotSupported(format!("AES key must be 16 bytes, got {}", key.len()))
    })
}

/// Strip PKCS#7 padding when it is well formed; leave the data alone otherwise
pub fn unpad(data: &mut Vec<u8>) {
    let Some(&last) = data.last() else {
        return;
    };
    let n = usize::from(last);
    if (1..=BLOCK).contains(&n)
        && n <= data.len()
        && data[data.len() - n..].iter().all(|&b| b == last)
    {
        data.truncate(data.len() - n);
    }
}

/// Decrypt a whole IV-prefixed buffer
pub fn decrypt_aes_cbc(key: &[u8], data: &[u8]) -> ParseResult<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < BLOCK {
        return Err(ParseError::StreamDecodeError(format!(
            "AES data of {} bytes is shorter than the IV",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(BLOCK);
    if ciphertext.len() % BLOCK != 0 {
        return Err(ParseError::StreamDecodeError(format!(
            "AES ciphertext length {} is not a multiple of {BLOCK}",
            ciphertext.len()
        )));
    }

    let mut buf = ciphertext.to_vec();
    let len = decryptor(key, iv)?
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| ParseError::StreamDecodeError("AES decryption failed".to_string()))?
        .len();
    buf.truncate(len);
    unpad(&mut buf);
    Ok(buf)
}

/// Decrypts an IV-prefixed AES-CBC stream block by block as it is read.
///
/// The final block is held back until the input ends so its padding can be
/// removed.
pub struct AesCbcReader<R> {
    inner: R,
    key: Vec<u8>,
    cipher: Option<Aes128CbcDec>,
    pending: Vec<u8>,
    output: Vec<u8>,
    output_pos: usize,
    finished: bool,
}

impl<R: Read> AesCbcReader<R> {
    pub fn new(inner: R, key: &[u8]) -> Self {
        Self {
            inner,
            key: key.to_vec(),
            cipher: None,
            pending: Vec::new(),
            output: Vec::new(),
            output_pos: 0,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        let n = self.inner.read(&mut chunk)?;
        let eof = n == 0;
        self.pending.extend_from_slice(&chunk[..n]);

        if self.cipher.is_none() {
            if self.pending.len() >= BLOCK {
                let iv: Vec<u8> = self.pending.drain(..BLOCK).collect();
                self.cipher = Some(decryptor(&self.key, &iv).map_err(io::Error::from)?);
            } else if eof {
                self.finished = true;
                if !self.pending.is_empty() {
                    return Err(invalid("AES stream is shorter than the IV"));
                }
                return Ok(());
            } else {
                return Ok(());
            }
        }

        let ready = if eof {
            if self.pending.len() % BLOCK != 0 {
                self.finished = true;
                return Err(invalid("AES stream length is not a multiple of the block size"));
            }
            self.pending.len()
        } else {
            // Keep the newest complete block back in case it is the last one
            self.pending.len().saturating_sub(1) / BLOCK * BLOCK
        };

        self.output.clear();
        self.output_pos = 0;
        if let Some(cipher) = self.cipher.as_mut() {
            for block in self.pending[..ready].chunks_exact_mut(BLOCK) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
        }
        self.output.extend(self.pending.drain(..ready));

        if eof {
            unpad(&mut self.output);
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for AesCbcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.output_pos < self.output.len() {
                let n = buf.len().min(self.output.len() - self.output_pos);
                buf[..n].copy_from_slice(&self.output[self.output_pos..self.output_pos + n]);
                self.output_pos += n;
                return Ok(n);
            }
            if self.finished || buf.is_empty() {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}
