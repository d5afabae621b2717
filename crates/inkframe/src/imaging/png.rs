//! Minimal PNG writer for sub-byte grayscale
//!
//! General-purpose encoders only emit 1/2/4-bit data through the indexed
//! color type, which panels render differently from true grayscale. This
//! writer emits color type 0 at the exact bit depth instead:
//!
//! ```text
//! signature | IHDR | IDAT (zlib, filter type 0 per row) | IEND
//! chunk     = length:u32be | type:4 | data | crc32(type + data):u32be
//! ```

use super::grayscale::BitDepth;
use crate::errors::{EncodeError, EncodeResult};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const COLOR_TYPE_GRAYSCALE: u8 = 0;
const FILTER_NONE: u8 = 0;
const MAX_DIMENSION: u32 = i32::MAX as u32;

/// CRC-32 (ISO 3309 / zlib), reflected polynomial 0xEDB88320.
///
/// Compile-time generated 256-entry lookup table.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize];
    }
    crc
}

/// Compute the PNG chunk CRC over a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_update(0xFFFF_FFFF, data) ^ 0xFFFF_FFFF
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let crc = crc32_update(crc32_update(0xFFFF_FFFF, kind), data) ^ 0xFFFF_FFFF;
    out.extend_from_slice(&crc.to_be_bytes());
}

/// Pack palette indices into filtered scanlines, MSB first.
pub fn pack_scanlines(indices: &[u8], width: u32, height: u32, depth: BitDepth) -> Vec<u8> {
    let width = width as usize;
    let bits = depth.bits() as usize;
    let per_byte = depth.pixels_per_byte();
    let row_bytes = width.div_ceil(per_byte);
    let mask = (depth.levels() - 1) as u8;

    let mut out = Vec::with_capacity((row_bytes + 1) * height as usize);
    for row in indices.chunks(width).take(height as usize) {
        out.push(FILTER_NONE);
        let start = out.len();
        out.resize(start + row_bytes, 0);
        for (x, &index) in row.iter().enumerate() {
            let shift = 8 - bits * (x % per_byte + 1);
            out[start + x / per_byte] |= (index & mask) << shift;
        }
    }
    out
}

fn ihdr(width: u32, height: u32, depth: BitDepth) -> [u8; 13] {
    let mut data = [0u8; 13];
    data[0..4].copy_from_slice(&width.to_be_bytes());
    data[4..8].copy_from_slice(&height.to_be_bytes());
    data[8] = depth.bits();
    data[9] = COLOR_TYPE_GRAYSCALE;
    // compression, filter method and interlace all stay 0
    data
}

/// Encode palette indices as a grayscale PNG at `depth`.
///
/// Each index is written directly as the gray sample; palettes are built so
/// index `i` is the `i`-th evenly spaced gray level, which is exactly how a
/// decoder scales a `depth`-bit sample.
pub fn encode_grayscale(
    indices: &[u8],
    width: u32,
    height: u32,
    depth: BitDepth,
) -> EncodeResult<Vec<u8>> {
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    let expected = width as usize * height as usize;
    if indices.len() != expected {
        return Err(EncodeError::BufferMismatch {
            expected,
            actual: indices.len(),
        });
    }

    let scanlines = pack_scanlines(indices, width, height, depth);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&scanlines)?;
    let compressed = encoder.finish()?;

    let mut out = Vec::with_capacity(PNG_SIGNATURE.len() + compressed.len() + 64);
    out.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut out, b"IHDR", &ihdr(width, height, depth));
    write_chunk(&mut out, b"IDAT", &compressed);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}
