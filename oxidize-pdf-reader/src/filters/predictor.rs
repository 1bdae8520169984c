//! Predictor functions for Flate and LZW (ISO 32000-1 Section 7.4.4.4)
//!
//! Predictor 2 is TIFF horizontal differencing; 10 to 15 are the PNG
//! filters, where each row carries its own filter-type byte and the exact
//! value of `/Predictor` does not matter.

use super::DecodeParams;
use crate::error::{ParseError, ParseResult};

pub fn apply_predictor(data: &[u8], params: &DecodeParams) -> ParseResult<Vec<u8>> {
    params.validate()?;
    match params.predictor {
        i64::MIN..=1 => Ok(data.to_vec()),
        2 => tiff_predictor(data, params),
        10..=15 => png_predictor(data, params),
        other => Err(ParseError::StreamDecodeError(format!(
            "unsupported predictor {other}"
        ))),
    }
}

/// Bytes in one row of samples
fn row_length(params: &DecodeParams) -> ParseResult<usize> {
    (params.colors as usize)
        .checked_mul(params.bits_per_component as usize)
        .and_then(|bits| bits.checked_mul(params.columns as usize))
        .map(|bits| bits.div_ceil(8))
        .ok_or_else(|| {
            ParseError::StreamDecodeError(format!("row of {} columns is too long", params.columns))
        })
}

/// Distance in bytes to the corresponding byte of the previous pixel
fn bytes_per_pixel(params: &DecodeParams) -> usize {
    (params.colors as usize * params.bits_per_component as usize)
        .div_ceil(8)
        .max(1)
}

fn png_predictor(data: &[u8], params: &DecodeParams) -> ParseResult<Vec<u8>> {
    // No row can hold more bytes than the input, whatever /Columns claims
    let row_len = row_length(params)?.min(data.len());
    let bpp = bytes_per_pixel(params);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let (&tag, encoded) = match chunk.split_first() {
            Some(split) => split,
            None => break,
        };
        // A short final row is decoded as far as it goes
        let mut row = encoded.to_vec();

        match tag {
            0 => {}
            1 => {
                for i in bpp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for (i, byte) in row.iter_mut().enumerate() {
                    *byte = byte.wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..row.len() {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let average = (u16::from(left) + u16::from(prev[i])) / 2;
                    row[i] = row[i].wrapping_add(average as u8);
                }
            }
            4 => {
                for i in 0..row.len() {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, prev[i], upper_left));
                }
            }
            other => {
                return Err(ParseError::StreamDecodeError(format!(
                    "invalid PNG filter type {other}"
                )))
            }
        }

        out.extend_from_slice(&row);
        prev[..row.len()].copy_from_slice(&row);
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn tiff_predictor(data: &[u8], params: &DecodeParams) -> ParseResult<Vec<u8>> {
    let row_len = row_length(params)?.max(1);
    let colors = params.colors as usize;
    let bpc = params.bits_per_component as usize;
    let mut out = data.to_vec();

    for row in out.chunks_mut(row_len) {
        match bpc {
            8 => {
                for i in colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
            16 => {
                let stride = colors * 2;
                let mut i = stride;
                while i + 1 < row.len() {
                    let left = u16::from_be_bytes([row[i - stride], row[i - stride + 1]]);
                    let value = u16::from_be_bytes([row[i], row[i + 1]]).wrapping_add(left);
                    row[i..i + 2].copy_from_slice(&value.to_be_bytes());
                    i += 2;
                }
            }
            _ => {
                // Sub-byte samples
                let samples = row.len() * 8 / bpc;
                let mask = (1u16 << bpc) - 1;
                for s in colors..samples {
                    let left = read_bits(row, (s - colors) * bpc, bpc);
                    let value = (read_bits(row, s * bpc, bpc) + left) & mask;
                    write_bits(row, s * bpc, bpc, value);
                }
            }
        }
    }

    Ok(out)
}

fn read_bits(row: &[u8], bit: usize, width: usize) -> u16 {
    let shift = 8 - width - bit % 8;
    u16::from(row[bit / 8] >> shift) & ((1 << width) - 1)
}

fn write_bits(row: &mut [u8], bit: usize, width: usize, value: u16) {
    let shift = 8 - width - bit % 8;
    let mask = (((1u16 << width) - 1) << shift) as u8;
    row[bit / 8] = (row[bit / 8] & !mask) | (((value << shift) as u8) & mask);
}
