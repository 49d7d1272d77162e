//! Array layout - how a dense array is divided into chunks

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{Result, SegyError};
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Shape, chunking and encoding of one stored array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayLayout {
    /// Number of elements along each dimension
    pub shape: Vec<usize>,

    /// Chunk extent along each dimension
    pub chunk_shape: Vec<usize>,

    /// Element type
    pub data_type: DataType,

    /// Codec applied to every chunk
    pub compression: CompressionMethod,

    /// Codec level used when writing
    pub compression_level: CompressionLevel,
}

impl ArrayLayout {
    /// Create a new layout; chunk extents larger than the array are clamped
    pub fn new(shape: Vec<usize>, chunk_shape: Vec<usize>, data_type: DataType) -> Result<Self> {
        if shape.is_empty() {
            return Err(SegyError::InvalidDimensions(
                "Array must have at least one dimension".to_string(),
            ));
        }

        if chunk_shape.len() != shape.len() {
            return Err(SegyError::InvalidDimensions(format!(
                "Chunk shape {:?} does not match array shape {:?}",
                chunk_shape, shape
            )));
        }

        if chunk_shape.iter().any(|&c| c == 0) {
            return Err(SegyError::InvalidDimensions(
                "Chunk extents must be positive".to_string(),
            ));
        }

        let chunk_shape = chunk_shape
            .iter()
            .zip(&shape)
            .map(|(&c, &s)| c.min(s.max(1)))
            .collect();

        Ok(Self {
            shape,
            chunk_shape,
            data_type,
            compression: CompressionMethod::Zstd,
            compression_level: CompressionLevel::default(),
        })
    }

    /// Set the chunk codec
    pub fn with_compression(mut self, method: CompressionMethod, level: CompressionLevel) -> Self {
        self.compression = method;
        self.compression_level = level;
        self
    }

    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Get the number of chunks in each dimension
    pub fn chunk_count(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&size, &chunk)| size.div_ceil(chunk))
            .collect()
    }

    /// Get the total number of chunks
    pub fn total_chunks(&self) -> usize {
        self.chunk_count().iter().product()
    }

    /// Convert a chunk index to chunk coordinates
    pub fn chunk_index_to_coords(&self, index: usize) -> Vec<usize> {
        let chunk_count = self.chunk_count();
        let mut coords = vec![0; self.dimensionality()];
        let mut remaining = index;

        for (i, coord) in coords.iter_mut().enumerate() {
            let stride: usize = chunk_count.iter().skip(i + 1).product();
            *coord = remaining / stride;
            remaining %= stride;
        }

        coords
    }

    /// Convert chunk coordinates to a chunk index
    pub fn chunk_coords_to_index(&self, coords: &[usize]) -> usize {
        let chunk_count = self.chunk_count();
        let mut index = 0;

        for (i, &coord) in coords.iter().enumerate().take(self.dimensionality()) {
            let stride: usize = chunk_count.iter().skip(i + 1).product();
            index += coord * stride;
        }

        index
    }

    /// Element range covered by a chunk along each dimension
    pub fn chunk_data_range(&self, chunk_coords: &[usize]) -> Vec<Range<usize>> {
        chunk_coords
            .iter()
            .enumerate()
            .map(|(i, &coord)| {
                let chunk = self.chunk_shape[i];
                let start = coord * chunk;
                let end = (start + chunk).min(self.shape[i]);
                start..end
            })
            .collect()
    }

    /// Extent of a chunk, trimmed at the array edge
    pub fn chunk_extent(&self, chunk_coords: &[usize]) -> Vec<usize> {
        self.chunk_data_range(chunk_coords)
            .iter()
            .map(|r| r.len())
            .collect()
    }

    /// Number of elements in a chunk, trimmed at the array edge
    pub fn chunk_elements(&self, chunk_coords: &[usize]) -> usize {
        self.chunk_extent(chunk_coords).iter().product()
    }

    /// Calculate the total array size in bytes (uncompressed)
    pub fn total_size_bytes(&self) -> usize {
        self.shape.iter().product::<usize>() * self.data_type.size_in_bytes()
    }

    /// Check if element coordinates are within bounds
    pub fn is_in_bounds(&self, coords: &[usize]) -> bool {
        coords.len() == self.dimensionality()
            && coords.iter().zip(&self.shape).all(|(&c, &s)| c < s)
    }

    /// Validate a slice request: one non-empty, in-bounds range per dimension
    pub fn check_ranges(&self, ranges: &[Range<usize>]) -> Result<()> {
        if ranges.len() != self.dimensionality() {
            return Err(SegyError::InvalidDimensions(format!(
                "Expected {} ranges, got {}",
                self.dimensionality(),
                ranges.len()
            )));
        }
        for (dim, (range, &size)) in ranges.iter().zip(&self.shape).enumerate() {
            if range.start >= range.end {
                return Err(SegyError::InvalidDimensions(format!(
                    "Empty range {:?} on dimension {}",
                    range, dim
                )));
            }
            if range.end > size {
                return Err(SegyError::OutOfBounds(format!(
                    "Range {:?} exceeds size {} of dimension {}",
                    range, size, dim
                )));
            }
        }
        Ok(())
    }

    /// Coordinates of every chunk overlapping `ranges`, in row-major order
    pub fn overlapping_chunks(&self, ranges: &[Range<usize>]) -> Vec<Vec<usize>> {
        let min_chunk: Vec<usize> = ranges
            .iter()
            .zip(&self.chunk_shape)
            .map(|(r, &c)| r.start / c)
            .collect();
        let max_chunk: Vec<usize> = ranges
            .iter()
            .zip(&self.chunk_shape)
            .map(|(r, &c)| (r.end - 1) / c)
            .collect();

        let mut chunks = Vec::new();
        let mut coords = min_chunk.clone();
        loop {
            chunks.push(coords.clone());

            let mut dim = self.dimensionality() - 1;
            loop {
                coords[dim] += 1;
                if coords[dim] <= max_chunk[dim] {
                    break;
                }
                coords[dim] = min_chunk[dim];
                if dim == 0 {
                    return chunks;
                }
                dim -= 1;
            }
        }
    }

    /// Get a summary string of the layout
    pub fn summary(&self) -> String {
        let join = |dims: &[usize]| {
            dims.iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" x ")
        };

        format!(
            "{}D array: {} ({:?}), {} chunks of {}, {} uncompressed",
            self.dimensionality(),
            join(&self.shape),
            self.data_type,
            self.total_chunks(),
            join(&self.chunk_shape),
            crate::utils::format_bytes(self.total_size_bytes())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_layout() -> ArrayLayout {
        ArrayLayout::new(vec![100, 80, 1, 50], vec![1, 64, 1, 50], DataType::F32).unwrap()
    }

    #[test]
    fn test_layout_creation() {
        let layout = create_test_layout();
        assert_eq!(layout.dimensionality(), 4);
        assert_eq!(layout.data_type, DataType::F32);
        assert_eq!(layout.chunk_count(), vec![100, 2, 1, 1]);
        assert_eq!(layout.total_chunks(), 200);
    }

    #[test]
    fn test_chunk_shape_is_clamped() {
        let layout = ArrayLayout::new(vec![3, 10], vec![256, 64], DataType::I64).unwrap();
        assert_eq!(layout.chunk_shape, vec![3, 10]);
        assert_eq!(layout.total_chunks(), 1);
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(ArrayLayout::new(vec![], vec![], DataType::F32).is_err());
        assert!(ArrayLayout::new(vec![4, 4], vec![4], DataType::F32).is_err());
        assert!(ArrayLayout::new(vec![4, 4], vec![0, 4], DataType::F32).is_err());
    }

    #[test]
    fn test_chunk_index_conversion() {
        let layout = create_test_layout();
        let coords = vec![57, 1, 0, 0];
        let index = layout.chunk_coords_to_index(&coords);
        assert_eq!(index, 115);
        assert_eq!(layout.chunk_index_to_coords(index), coords);
    }

    #[test]
    fn test_chunk_data_range() {
        let layout = create_test_layout();
        assert_eq!(
            layout.chunk_data_range(&[0, 0, 0, 0]),
            vec![0..1, 0..64, 0..1, 0..50]
        );
        // Last chunk along crossline is trimmed
        assert_eq!(
            layout.chunk_data_range(&[99, 1, 0, 0]),
            vec![99..100, 64..80, 0..1, 0..50]
        );
        assert_eq!(layout.chunk_elements(&[99, 1, 0, 0]), 16 * 50);
    }

    #[test]
    fn test_overlapping_chunks() {
        let layout = create_test_layout();
        let chunks = layout.overlapping_chunks(&[3..5, 60..70, 0..1, 0..50]);
        assert_eq!(
            chunks,
            vec![
                vec![3, 0, 0, 0],
                vec![3, 1, 0, 0],
                vec![4, 0, 0, 0],
                vec![4, 1, 0, 0]
            ]
        );
        // A single inline stays inside one chunk row
        let chunks = layout.overlapping_chunks(&[7..8, 0..80, 0..1, 0..50]);
        assert!(chunks.iter().all(|c| c[0] == 7));
    }

    #[test]
    fn test_check_ranges() {
        let layout = create_test_layout();
        assert!(layout.check_ranges(&[0..100, 0..80, 0..1, 0..50]).is_ok());
        assert!(matches!(
            layout.check_ranges(&[0..101, 0..80, 0..1, 0..50]),
            Err(SegyError::OutOfBounds(_))
        ));
        assert!(matches!(
            layout.check_ranges(&[5..5, 0..80, 0..1, 0..50]),
            Err(SegyError::InvalidDimensions(_))
        ));
        assert!(layout.check_ranges(&[0..1]).is_err());
    }

    #[test]
    fn test_is_in_bounds() {
        let layout = create_test_layout();
        assert!(layout.is_in_bounds(&[0, 0, 0, 0]));
        assert!(layout.is_in_bounds(&[99, 79, 0, 49]));
        assert!(!layout.is_in_bounds(&[100, 0, 0, 0]));
        assert!(!layout.is_in_bounds(&[0, 0, 0]));
    }
}
