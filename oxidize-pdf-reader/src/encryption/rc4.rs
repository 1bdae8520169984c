//! RC4 stream cipher

use std::io::{self, Read};

/// RC4 cipher state. Encryption and decryption are the same operation.
#[derive(Clone)]
pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Key-schedule a new cipher. An empty key behaves like a single zero byte.
    pub fn new(key: &[u8]) -> Self {
        let key: &[u8] = if key.is_empty() { &[0] } else { key };
        let mut s = [0u8; 256];
        for (i, byte) in s.iter_mut().enumerate() {
            *byte = i as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }

        Self { s, i: 0, j: 0 }
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let index = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[index as usize]
    }

    pub fn process_in_place(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }

    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut output = data.to_vec();
        self.process_in_place(&mut output);
        output
    }
}

/// One-shot RC4 over `data` with `key`
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    Rc4::new(key).process(data)
}

/// Decrypts an RC4 stream as it is read
pub struct Rc4Reader<R> {
    inner: R,
    cipher: Rc4,
}

impl<R: Read> Rc4Reader<R> {
    pub fn new(inner: R, key: &[u8]) -> Self {
        Self {
            inner,
            cipher: Rc4::new(key),
        }
    }
}

impl<R: Read> Read for Rc4Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.process_in_place(&mut buf[..n]);
        Ok(n)
    }
}
