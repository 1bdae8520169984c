//! Fixture builders shared by the integration tests
//!
//! [`PdfBuilder`] writes small but structurally real PDF files: classic xref
//! tables or xref streams, object streams, incremental updates chained through
//! `/Prev`, and Standard Security Handler encryption.

#![allow(dead_code)]

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use oxidize_pdf_reader::encryption::rc4;
use oxidize_pdf_reader::ByteSource;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

pub const FILE_ID: [u8; 16] = [
    0x5a, 0x1e, 0x2b, 0x93, 0x00, 0x7c, 0xd4, 0x61, 0x8f, 0x3a, 0xee, 0x10, 0x42, 0x99, 0xc7, 0x05,
];

#[derive(Debug, Clone, Copy)]
enum Entry {
    Direct { offset: usize, generation: u16 },
    InContainer { container: u32, index: u32 },
}

/// Writes one revision of a PDF file, optionally appended to an older one
pub struct PdfBuilder {
    out: Vec<u8>,
    entries: BTreeMap<u32, Entry>,
    prev: Option<usize>,
    base_size: u32,
    trailer_extra: Vec<String>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut out = format!("%PDF-{version}\n").into_bytes();
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            out,
            entries: BTreeMap::new(),
            prev: None,
            base_size: 0,
            trailer_extra: Vec::new(),
        }
    }

    /// Start an incremental update of `base`
    pub fn update(base: Vec<u8>) -> Self {
        let prev = last_number_after(&base, b"startxref").expect("base has startxref");
        let base_size = last_number_after(&base, b"/Size").unwrap_or(0) as u32;
        Self {
            out: base,
            entries: BTreeMap::new(),
            prev: Some(prev),
            base_size,
            trailer_extra: Vec::new(),
        }
    }

    pub fn object(&mut self, number: u32, body: &str) -> &mut Self {
        self.object_bytes(number, 0, body.as_bytes())
    }

    pub fn object_bytes(&mut self, number: u32, generation: u16, body: &[u8]) -> &mut Self {
        let offset = self.out.len();
        self.out
            .extend_from_slice(format!("{number} {generation} obj\n").as_bytes());
        self.out.extend_from_slice(body);
        self.out.extend_from_slice(b"\nendobj\n");
        self.entries
            .insert(number, Entry::Direct { offset, generation });
        self
    }

    /// A stream object; `/Length` is appended to `dict_entries`
    pub fn stream(&mut self, number: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        let mut body = format!("<< {dict_entries} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(number, 0, &body)
    }

    /// An object stream holding `members`, Flate-compressed when `compress` is set
    pub fn object_stream(
        &mut self,
        number: u32,
        members: &[(u32, &str)],
        extends: Option<u32>,
        compress: bool,
    ) -> &mut Self {
        let mut header = String::new();
        let mut bodies = String::new();
        for (index, (member, body)) in members.iter().enumerate() {
            header.push_str(&format!("{member} {} ", bodies.len()));
            bodies.push_str(body);
            bodies.push('\n');
            self.entries.insert(
                *member,
                Entry::InContainer {
                    container: number,
                    index: index as u32,
                },
            );
        }
        let first = header.len();
        let data = format!("{header}{bodies}").into_bytes();

        let mut dict = format!("/Type /ObjStm /N {} /First {first}", members.len());
        if let Some(parent) = extends {
            dict.push_str(&format!(" /Extends {parent} 0 R"));
        }
        if compress {
            dict.push_str(" /Filter /FlateDecode");
            self.stream(number, &dict, &deflate(&data))
        } else {
            self.stream(number, &dict, &data)
        }
    }

    /// Extra trailer entries, e.g. `/Encrypt 9 0 R`
    /// Map `number` into an object stream without writing anything there
    pub fn compressed_entry(&mut self, number: u32, container: u32, index: u32) -> &mut Self {
        self.entries
            .insert(number, Entry::InContainer { container, index });
        self
    }

    pub fn trailer(&mut self, entries: &str) -> &mut Self {
        self.trailer_extra.push(entries.to_string());
        self
    }

    fn size(&self) -> u32 {
        let max = self.entries.keys().next_back().copied().unwrap_or(0);
        (max + 1).max(self.base_size)
    }

    fn trailer_body(&self, size: u32) -> String {
        let mut dict = format!("/Size {size} /Root 1 0 R");
        for extra in &self.trailer_extra {
            dict.push(' ');
            dict.push_str(extra);
        }
        if let Some(prev) = self.prev {
            dict.push_str(&format!(" /Prev {prev}"));
        }
        dict
    }

    /// Subsections of this revision: a new file covers object 0 and every
    /// gap, an update only the objects it writes
    fn subsections(&self, size: u32) -> Vec<(u32, u32)> {
        if self.prev.is_none() {
            return vec![(0, size)];
        }
        runs(self.entries.keys().copied())
    }

    /// Finish with a classic `xref` table
    pub fn finish_classic(mut self) -> Vec<u8> {
        let size = self.size();
        let xref_at = self.out.len();
        let mut table = String::from("xref\n");
        for (start, count) in self.subsections(size) {
            table.push_str(&format!("{start} {count}\n"));
            for number in start..start + count {
                match self.entries.get(&number) {
                    Some(Entry::Direct { offset, generation }) => {
                        table.push_str(&format!("{offset:010} {generation:05} n\r\n"))
                    }
                    Some(Entry::InContainer { .. }) => {
                        panic!("object {number} is compressed; use finish_xref_stream")
                    }
                    None => table.push_str("0000000000 65535 f\r\n"),
                }
            }
        }
        self.out.extend_from_slice(table.as_bytes());
        let trailer = self.trailer_body(size);
        self.out.extend_from_slice(
            format!("trailer\n<< {trailer} >>\nstartxref\n{xref_at}\n%%EOF\n").as_bytes(),
        );
        self.out
    }

    /// Finish with an xref stream (object number `Size`), Flate-compressed when asked
    pub fn finish_xref_stream(mut self, compress: bool) -> Vec<u8> {
        let number = self.size();
        let xref_at = self.out.len();
        self.entries.insert(
            number,
            Entry::Direct {
                offset: xref_at,
                generation: 0,
            },
        );
        let size = number + 1;

        let mut records = Vec::new();
        let subsections = self.subsections(size);
        for &(start, count) in &subsections {
            for n in start..start + count {
                let (kind, field2, field3) = match self.entries.get(&n) {
                    Some(Entry::Direct { offset, generation }) => (1u8, *offset as u32, *generation),
                    Some(Entry::InContainer { container, index }) => (2u8, *container, *index as u16),
                    None => (0u8, 0, if n == 0 { 0xFFFF } else { 0 }),
                };
                xref_record(&mut records, kind, field2, field3);
            }
        }

        let mut dict = format!("/Type /XRef /W [1 4 2] {}", self.trailer_body(size));
        if self.prev.is_some() {
            let index: Vec<String> = subsections
                .iter()
                .map(|(start, count)| format!("{start} {count}"))
                .collect();
            dict.push_str(&format!(" /Index [{}]", index.join(" ")));
        }
        let data = if compress {
            dict.push_str(" /Filter /FlateDecode");
            deflate(&records)
        } else {
            records
        };

        let mut body = format!("<< {dict} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\nendstream");
        self.out
            .extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        self.out.extend_from_slice(&body);
        self.out.extend_from_slice(
            format!("\nendobj\nstartxref\n{xref_at}\n%%EOF\n").as_bytes(),
        );
        self.out
    }

    /// Finish a hybrid file: a classic table for the directly stored
    /// objects whose trailer points through `/XRefStm` at an xref stream
    /// listing the compressed ones
    pub fn finish_hybrid(mut self) -> Vec<u8> {
        let stream_number = self.size();
        let stm_at = self.out.len();

        let compressed: Vec<(u32, u32, u32)> = self
            .entries
            .iter()
            .filter_map(|(&n, entry)| match *entry {
                Entry::InContainer { container, index } => Some((n, container, index)),
                Entry::Direct { .. } => None,
            })
            .collect();
        let mut records = Vec::new();
        for &(_, container, index) in &compressed {
            xref_record(&mut records, 2, container, index as u16);
        }
        let index: Vec<String> = runs(compressed.iter().map(|&(n, _, _)| n))
            .iter()
            .map(|(start, count)| format!("{start} {count}"))
            .collect();
        let mut body = format!(
            "<< /Type /XRef /Size {} /W [1 4 2] /Index [{}] /Length {} >>\nstream\n",
            stream_number + 1,
            index.join(" "),
            records.len()
        )
        .into_bytes();
        body.extend_from_slice(&records);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(stream_number, 0, &body);

        let size = stream_number + 1;
        let xref_at = self.out.len();
        let direct: Vec<u32> = std::iter::once(0)
            .chain(self.entries.iter().filter_map(|(&n, entry)| match entry {
                Entry::Direct { .. } => Some(n),
                Entry::InContainer { .. } => None,
            }))
            .collect();
        let mut table = String::from("xref\n");
        for (start, count) in runs(direct.into_iter()) {
            table.push_str(&format!("{start} {count}\n"));
            for number in start..start + count {
                match self.entries.get(&number) {
                    Some(Entry::Direct { offset, generation }) => {
                        table.push_str(&format!("{offset:010} {generation:05} n\r\n"))
                    }
                    _ => table.push_str("0000000000 65535 f\r\n"),
                }
            }
        }
        self.out.extend_from_slice(table.as_bytes());
        let trailer = self.trailer_body(size);
        self.out.extend_from_slice(
            format!("trailer\n<< {trailer} /XRefStm {stm_at} >>\nstartxref\n{xref_at}\n%%EOF\n")
                .as_bytes(),
        );
        self.out
    }
}

/// Consecutive runs of ascending object numbers as `(first, count)`
fn runs(numbers: impl Iterator<Item = u32>) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for number in numbers {
        match runs.last_mut() {
            Some((start, count)) if *start + *count == number => *count += 1,
            _ => runs.push((number, 1)),
        }
    }
    runs
}

fn xref_record(records: &mut Vec<u8>, kind: u8, field2: u32, field3: u16) {
    records.push(kind);
    records.extend_from_slice(&field2.to_be_bytes());
    records.extend_from_slice(&field3.to_be_bytes());
}

/// The integer after the last occurrence of `keyword`
fn last_number_after(data: &[u8], keyword: &[u8]) -> Option<usize> {
    let at = data.windows(keyword.len()).rposition(|w| w == keyword)?;
    let digits: String = data[at + keyword.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();
    digits.parse().ok()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("write to Vec");
    encoder.finish().expect("finish zlib")
}

pub fn hex_string(bytes: &[u8]) -> String {
    format!("<{}>", hex::encode(bytes))
}

/// The catalog and empty page tree most fixtures start from
pub fn minimal_catalog(builder: &mut PdfBuilder) -> &mut PdfBuilder {
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
}

/// Which cipher a [`StandardEncryption`] writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// V2 R3, 128-bit RC4
    Rc4R3,
    /// V4 R4, AESV2 crypt filter for streams and strings
    AesV4,
    /// V4 R4, 40-bit RC4 (`/CFM /V2`) crypt filter whose `/Length` is in bytes
    Rc4V4Short,
}

/// Computes the `/Encrypt` dictionary and encrypts strings and streams the way
/// a writer implementing the Standard Security Handler does
pub struct StandardEncryption {
    pub cipher: Cipher,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub permissions: i32,
    pub file_key: Vec<u8>,
}

impl StandardEncryption {
    pub fn new(cipher: Cipher, user_password: &str, owner_password: &str, permissions: i32) -> Self {
        let key_len = if cipher == Cipher::Rc4V4Short { 5 } else { 16 };
        let user = pad(user_password.as_bytes());
        let owner = pad(owner_password.as_bytes());

        // Algorithm 3: the owner hash
        let mut digest = md5::compute(owner).0.to_vec();
        for _ in 0..50 {
            digest = md5::compute(&digest).0.to_vec();
        }
        let owner_key = &digest[..key_len];
        let mut owner_hash = rc4(owner_key, &user);
        for round in 1..=19u8 {
            let key: Vec<u8> = owner_key.iter().map(|b| b ^ round).collect();
            owner_hash = rc4(&key, &owner_hash);
        }

        // Algorithm 2: the file key
        let mut input = user.to_vec();
        input.extend_from_slice(&owner_hash);
        input.extend_from_slice(&permissions.to_le_bytes());
        input.extend_from_slice(&FILE_ID);
        let mut file_key = md5::compute(&input).0.to_vec();
        for _ in 0..50 {
            file_key = md5::compute(&file_key[..key_len]).0.to_vec();
        }
        file_key.truncate(key_len);

        // Algorithm 5: the user hash
        let mut input = PASSWORD_PADDING.to_vec();
        input.extend_from_slice(&FILE_ID);
        let mut user_hash = rc4(&file_key, &md5::compute(&input).0);
        for round in 1..=19u8 {
            let key: Vec<u8> = file_key.iter().map(|b| b ^ round).collect();
            user_hash = rc4(&key, &user_hash);
        }
        user_hash.extend_from_slice(&[0u8; 16]);

        Self {
            cipher,
            owner_hash,
            user_hash,
            permissions,
            file_key,
        }
    }

    /// Body of the encryption dictionary object
    pub fn dict(&self) -> String {
        let common = format!(
            "/Filter /Standard /O {} /U {} /P {}",
            hex_string(&self.owner_hash),
            hex_string(&self.user_hash),
            self.permissions
        );
        match self.cipher {
            Cipher::Rc4R3 => format!("<< {common} /V 2 /R 3 /Length 128 >>"),
            Cipher::AesV4 => format!(
                "<< {common} /V 4 /R 4 /Length 128 \
                 /CF << /StdCF << /CFM /AESV2 /AuthEvent /DocOpen /Length 16 >> >> \
                 /StmF /StdCF /StrF /StdCF >>"
            ),
            Cipher::Rc4V4Short => format!(
                "<< {common} /V 4 /R 4 /Length 40 \
                 /CF << /StdCF << /CFM /V2 /Length 5 >> >> \
                 /StmF /StdCF /StrF /StdCF >>"
            ),
        }
    }

    /// Trailer entries naming the encryption dictionary object and the file ID
    pub fn trailer_entries(&self, encrypt_object: u32) -> String {
        format!(
            "/Encrypt {encrypt_object} 0 R /ID [{} {}]",
            hex_string(&FILE_ID),
            hex_string(&FILE_ID)
        )
    }

    fn object_key(&self, number: u32, generation: u16) -> Vec<u8> {
        let mut input = self.file_key.clone();
        input.extend_from_slice(&number.to_le_bytes()[..3]);
        input.extend_from_slice(&generation.to_le_bytes());
        if self.cipher == Cipher::AesV4 {
            input.extend_from_slice(b"sAlT");
        }
        let digest = md5::compute(&input).0;
        digest[..(self.file_key.len() + 5).min(16)].to_vec()
    }

    /// Encrypt data belonging to object `number 0`
    pub fn encrypt(&self, number: u32, data: &[u8]) -> Vec<u8> {
        let key = self.object_key(number, 0);
        match self.cipher {
            Cipher::Rc4R3 | Cipher::Rc4V4Short => rc4(&key, data),
            Cipher::AesV4 => {
                let iv = [0x24u8; 16];
                let encryptor = cbc::Encryptor::<aes::Aes128>::new_from_slices(&key, &iv)
                    .expect("16-byte key and iv");
                let mut buf = data.to_vec();
                buf.resize(data.len() + 16, 0);
                let ciphertext = encryptor
                    .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
                    .expect("room for padding");
                let mut out = iv.to_vec();
                out.extend_from_slice(ciphertext);
                out
            }
        }
    }

    /// An encrypted string literal for object `number`
    pub fn string(&self, number: u32, text: &str) -> String {
        hex_string(&self.encrypt(number, text.as_bytes()))
    }
}

fn pad(password: &[u8]) -> [u8; 32] {
    let mut out = PASSWORD_PADDING;
    let n = password.len().min(32);
    out[..n].copy_from_slice(&password[..n]);
    out[n..].copy_from_slice(&PASSWORD_PADDING[..32 - n]);
    out
}

/// In-memory source that counts positioned reads
pub struct CountingSource {
    data: Vec<u8>,
    reads: AtomicUsize,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ByteSource for CountingSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.data.read_at(offset, buf)
    }
}

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
