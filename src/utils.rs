//! Utility functions

use crate::error::{Result, SegyError};
use crate::types::ArrayElement;

/// Encode elements as little-endian bytes
pub fn typed_data_to_bytes<T: ArrayElement>(data: &[T]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(data.len() * T::DATA_TYPE.size_in_bytes());
    for &value in data {
        value.write_le(&mut bytes);
    }
    bytes
}

/// Decode little-endian bytes into elements
pub fn bytes_to_typed_data<T: ArrayElement>(bytes: &[u8]) -> Result<Vec<T>> {
    let size = T::DATA_TYPE.size_in_bytes();
    if bytes.len() % size != 0 {
        return Err(SegyError::InvalidFormat(
            "Byte length not aligned with data type size".to_string(),
        ));
    }
    Ok(bytes.chunks_exact(size).map(T::read_le).collect())
}

/// Calculate checksum (CRC32) for data
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Manifest path of a named array
pub fn array_manifest_path(name: &str) -> String {
    format!("arrays/{}/array.json", name)
}

/// Directory holding one write generation of an array
pub fn array_generation_prefix(name: &str, generation: &str) -> String {
    format!("arrays/{}/{}", name, generation)
}

/// Path of a chunk within a write generation
pub fn chunk_path(name: &str, generation: &str, index: usize) -> String {
    format!("{}/{:08}.chunk", array_generation_prefix(name, generation), index)
}

/// Path of a metadata document
pub fn metadata_path(key: &str) -> String {
    format!("meta/{}.json", key)
}
