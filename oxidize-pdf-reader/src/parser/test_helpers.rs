//! Builders shared by the parser unit tests

use super::reader::ObjectLoader;
use std::sync::Arc;

/// A minimal PDF 1.4 file with a classic xref table covering `objects`.
/// Object 0 is free, numbers not listed are free, and the root is `1 0 R`.
pub(crate) fn build_classic_pdf(objects: &[(u32, &str)]) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for &(number, body) in objects {
        offsets.push((number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    let size = objects.iter().map(|&(n, _)| n).max().unwrap_or(0) + 1;
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
    for number in 0..size {
        match offsets.iter().find(|&&(n, _)| n == number) {
            Some(&(_, offset)) => out.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes()),
            None => out.extend_from_slice(b"0000000000 65535 f\r\n"),
        }
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n").as_bytes(),
    );
    out
}

pub(crate) fn loader_for(data: Vec<u8>) -> ObjectLoader {
    ObjectLoader::new(Arc::new(data))
}
