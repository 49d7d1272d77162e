//! Chunk codecs
//!
//! Every stored chunk is a small frame followed by the compressed payload:
//!
//! | bytes | content |
//! |---|---|
//! | 0..4 | magic `TSC1` |
//! | 4 | codec (`CompressionMethod` as u8) |
//! | 5..8 | reserved, zero |
//! | 8..16 | uncompressed length, u64 LE |
//! | 16..20 | CRC32 of the uncompressed bytes, u32 LE |

use crate::error::{Result, SegyError};
use crate::utils::calculate_checksum;
use crate::CHUNK_MAGIC;
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::io::Read;

const FRAME_BYTES: usize = 20;

/// Compression methods for stored chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CompressionMethod {
    /// No compression
    None = 0,
    /// Deflate/ZIP compression
    Deflate = 1,
    /// Zstandard compression
    Zstd = 3,
}

impl CompressionMethod {
    /// Get the method from a byte value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Deflate),
            3 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }
}

/// Compression level (0-9, where 0 is no compression and 9 is maximum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

/// Trait for compression/decompression operations
pub trait Compressor: Send + Sync {
    /// Compress data
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>>;

    /// Get the compression method
    fn method(&self) -> CompressionMethod;
}

/// No compression
#[derive(Debug, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }
}

/// Deflate compression
#[derive(Debug, Default)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(data, FlateCompression::new(level.value() as u32));
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(|e| SegyError::Compression(e.to_string()))?;
        Ok(compressed)
    }

    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut decompressed = Vec::with_capacity(expected_size);
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| SegyError::Decompression(e.to_string()))?;
        Ok(decompressed)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }
}

/// Zstandard compression
#[derive(Debug, Default)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        zstd::encode_all(data, level.value() as i32)
            .map_err(|e| SegyError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], _expected_size: usize) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| SegyError::Decompression(e.to_string()))
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

/// Get a compressor for a given method
pub fn get_compressor(method: CompressionMethod) -> Box<dyn Compressor> {
    match method {
        CompressionMethod::None => Box::new(NoneCompressor),
        CompressionMethod::Deflate => Box::new(DeflateCompressor),
        CompressionMethod::Zstd => Box::new(ZstdCompressor),
    }
}

/// Compress `raw` and wrap it in a checksummed frame
pub fn encode_chunk(raw: &[u8], method: CompressionMethod, level: CompressionLevel) -> Result<Vec<u8>> {
    let payload = get_compressor(method).compress(raw, level)?;
    let mut frame = Vec::with_capacity(FRAME_BYTES + payload.len());
    frame.extend_from_slice(CHUNK_MAGIC);
    frame.push(method as u8);
    frame.extend_from_slice(&[0u8; 3]);
    frame.extend_from_slice(&(raw.len() as u64).to_le_bytes());
    frame.extend_from_slice(&calculate_checksum(raw).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Unwrap a frame written by [`encode_chunk`], verifying length and checksum
pub fn decode_chunk(frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < FRAME_BYTES || &frame[..4] != CHUNK_MAGIC {
        return Err(SegyError::InvalidFormat(
            "Chunk is missing its frame header".to_string(),
        ));
    }
    let method = CompressionMethod::from_u8(frame[4]).ok_or_else(|| {
        SegyError::InvalidFormat(format!("Unknown chunk codec {}", frame[4]))
    })?;

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&frame[8..16]);
    let raw_len = usize::try_from(u64::from_le_bytes(len_bytes))
        .map_err(|_| SegyError::InvalidFormat("Chunk length overflows usize".to_string()))?;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&frame[16..20]);
    let checksum = u32::from_le_bytes(crc_bytes);

    let raw = get_compressor(method).decompress(&frame[FRAME_BYTES..], raw_len)?;
    if raw.len() != raw_len {
        return Err(SegyError::Decompression(format!(
            "Chunk decoded to {} bytes, frame says {}",
            raw.len(),
            raw_len
        )));
    }
    if calculate_checksum(&raw) != checksum {
        return Err(SegyError::InvalidFormat("Chunk checksum mismatch".to_string()));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        b"Seismic trace samples ".repeat(100)
    }

    #[test]
    fn test_no_compression() {
        let compressor = NoneCompressor;
        let data = b"Hello, world!";
        let compressed = compressor
            .compress(data, CompressionLevel::default())
            .unwrap();
        assert_eq!(compressed, data);
    }

    #[test]
    fn test_deflate_and_zstd_shrink() {
        let data = sample_bytes();
        for method in [CompressionMethod::Deflate, CompressionMethod::Zstd] {
            let compressor = get_compressor(method);
            let compressed = compressor
                .compress(&data, CompressionLevel::default())
                .unwrap();
            assert!(compressed.len() < data.len(), "{method:?} did not shrink");
            assert_eq!(compressor.method(), method);
        }
    }

    #[test]
    fn test_frame_round_trip() {
        let data = sample_bytes();
        for method in [
            CompressionMethod::None,
            CompressionMethod::Deflate,
            CompressionMethod::Zstd,
        ] {
            let frame = encode_chunk(&data, method, CompressionLevel::fast()).unwrap();
            assert_eq!(&frame[..4], CHUNK_MAGIC);
            assert_eq!(decode_chunk(&frame).unwrap(), data);
        }
    }

    #[test]
    fn test_corrupt_frame_is_detected() {
        let data = sample_bytes();
        let mut frame = encode_chunk(&data, CompressionMethod::None, CompressionLevel::default())
            .unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decode_chunk(&frame),
            Err(SegyError::InvalidFormat(_))
        ));

        assert!(decode_chunk(b"short").is_err());
        let mut bad_codec = encode_chunk(&data, CompressionMethod::None, CompressionLevel::default())
            .unwrap();
        bad_codec[4] = 42;
        assert!(matches!(
            decode_chunk(&bad_codec),
            Err(SegyError::InvalidFormat(_))
        ));
    }
}
