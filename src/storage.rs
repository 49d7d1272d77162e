//! Write-once chunked array storage
//!
//! An [`ArrayStore`] holds named dense arrays and JSON metadata documents on
//! top of an [`IOManager`]. Arrays are written through an [`ArraySink`]:
//! chunks go into a fresh generation directory, and nothing is visible to
//! [`ArrayStore::open_array`] until [`ArraySink::commit`] writes the manifest.
//! A sink that is aborted or dropped without committing leaves no readable
//! array behind.
//!
//! Chunks that were never written read back as zeros.

use crate::compression::{decode_chunk, encode_chunk};
use crate::error::{Result, SegyError};
use crate::io::{create_io_manager, IOManager, MemoryIOManager};
use crate::layout::ArrayLayout;
use crate::types::ArrayElement;
use crate::utils::{
    array_generation_prefix, array_manifest_path, bytes_to_typed_data, chunk_path, metadata_path,
    typed_data_to_bytes,
};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use ndarray::{ArrayD, IxDyn, Slice};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

/// Persisted description of a committed array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayManifest {
    pub layout: ArrayLayout,
    /// Generation directory holding the chunks
    pub generation: String,
    pub chunks_written: usize,
    pub committed_at: DateTime<Utc>,
}

/// Named arrays and metadata documents under one root
#[derive(Clone)]
pub struct ArrayStore {
    io: Arc<dyn IOManager>,
}

impl ArrayStore {
    pub fn new(io: Arc<dyn IOManager>) -> Self {
        Self { io }
    }

    /// Store rooted at a URL (see [`create_io_manager`])
    pub async fn open(url: &str) -> Result<Self> {
        Ok(Self::new(create_io_manager(url).await?))
    }

    /// Fresh in-memory store
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryIOManager::new()))
    }

    pub fn io(&self) -> &Arc<dyn IOManager> {
        &self.io
    }

    /// Start writing a new array. Fails if `name` is already committed.
    pub async fn create_array<T: ArrayElement>(
        &self,
        name: &str,
        layout: ArrayLayout,
    ) -> Result<ArraySink<T>> {
        if layout.data_type != T::DATA_TYPE {
            return Err(SegyError::Configuration(format!(
                "Array {} is laid out as {} but written as {}",
                name,
                layout.data_type,
                T::DATA_TYPE
            )));
        }
        if self.array_exists(name).await? {
            return Err(SegyError::AlreadyExists(format!("array {}", name)));
        }

        let generation = uuid::Uuid::new_v4().to_string();
        tracing::debug!(array = name, generation = %generation, layout = %layout.summary(), "Creating array");
        Ok(ArraySink {
            io: Arc::clone(&self.io),
            name: name.to_string(),
            layout,
            generation,
            written: HashSet::new(),
            _element: PhantomData,
        })
    }

    /// Open a committed array
    pub async fn open_array<T: ArrayElement>(&self, name: &str) -> Result<ArrayHandle<T>> {
        let bytes = self
            .io
            .read(&array_manifest_path(name))
            .await
            .map_err(|e| match e {
                SegyError::NotFound(_) => SegyError::NotFound(format!("array {}", name)),
                other => other,
            })?;
        let manifest: ArrayManifest = serde_json::from_slice(&bytes)?;
        if manifest.layout.data_type != T::DATA_TYPE {
            return Err(SegyError::InvalidFormat(format!(
                "Array {} holds {} but was opened as {}",
                name,
                manifest.layout.data_type,
                T::DATA_TYPE
            )));
        }

        Ok(ArrayHandle {
            io: Arc::clone(&self.io),
            name: name.to_string(),
            layout: manifest.layout,
            generation: manifest.generation,
            _element: PhantomData,
        })
    }

    pub async fn array_exists(&self, name: &str) -> Result<bool> {
        self.io.exists(&array_manifest_path(name)).await
    }

    /// Remove an array with every generation written for it
    pub async fn delete_array(&self, name: &str) -> Result<()> {
        let manifest = array_manifest_path(name);
        if self.io.exists(&manifest).await? {
            self.io.delete(&manifest).await?;
        }
        self.io.delete_prefix(&format!("arrays/{}", name)).await
    }

    /// Top-level entries under the array root. An array named `a/b` is
    /// listed as its group `a`.
    pub async fn array_groups(&self) -> Result<Vec<String>> {
        self.io.list("arrays").await
    }

    /// Remove every array whose name starts with `group/`
    pub async fn delete_group(&self, group: &str) -> Result<()> {
        if group.is_empty() || group.contains('/') {
            return Err(SegyError::Configuration(format!(
                "invalid array group {:?}",
                group
            )));
        }
        self.io.delete_prefix(&format!("arrays/{}", group)).await
    }

    /// Write a JSON metadata document
    pub async fn put_metadata<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        self.io.write(&metadata_path(key), &json).await
    }

    /// Read a JSON metadata document
    pub async fn get_metadata<V: DeserializeOwned>(&self, key: &str) -> Result<V> {
        let bytes = self.io.read(&metadata_path(key)).await?;
        serde_json::from_slice(&bytes).map_err(|e| SegyError::Metadata(e.to_string()))
    }

    pub async fn has_metadata(&self, key: &str) -> Result<bool> {
        self.io.exists(&metadata_path(key)).await
    }
}

/// Uncommitted array being written chunk by chunk
pub struct ArraySink<T: ArrayElement> {
    io: Arc<dyn IOManager>,
    name: String,
    layout: ArrayLayout,
    generation: String,
    written: HashSet<usize>,
    _element: PhantomData<T>,
}

impl<T: ArrayElement> ArraySink<T> {
    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one chunk; `data` is the chunk's elements in row-major order,
    /// trimmed at the array edge
    pub async fn write_chunk(&mut self, chunk_coords: &[usize], data: &[T]) -> Result<()> {
        let chunk_count = self.layout.chunk_count();
        if chunk_coords.len() != chunk_count.len()
            || chunk_coords.iter().zip(&chunk_count).any(|(&c, &n)| c >= n)
        {
            return Err(SegyError::OutOfBounds(format!(
                "Chunk {:?} outside chunk grid {:?}",
                chunk_coords, chunk_count
            )));
        }

        let expected = self.layout.chunk_elements(chunk_coords);
        if data.len() != expected {
            return Err(SegyError::InvalidDimensions(format!(
                "Chunk {:?} needs {} elements, got {}",
                chunk_coords,
                expected,
                data.len()
            )));
        }

        let index = self.layout.chunk_coords_to_index(chunk_coords);
        let frame = encode_chunk(
            &typed_data_to_bytes(data),
            self.layout.compression,
            self.layout.compression_level,
        )?;
        self.io
            .write(&chunk_path(&self.name, &self.generation, index), &frame)
            .await?;
        self.written.insert(index);
        Ok(())
    }

    /// Publish the array. Fails if another writer committed it first.
    pub async fn commit(self) -> Result<ArrayHandle<T>> {
        let manifest_path = array_manifest_path(&self.name);
        if self.io.exists(&manifest_path).await? {
            self.io
                .delete_prefix(&array_generation_prefix(&self.name, &self.generation))
                .await?;
            return Err(SegyError::AlreadyExists(format!("array {}", self.name)));
        }

        let manifest = ArrayManifest {
            layout: self.layout.clone(),
            generation: self.generation.clone(),
            chunks_written: self.written.len(),
            committed_at: Utc::now(),
        };
        self.io
            .write(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)
            .await?;

        tracing::debug!(array = %self.name, chunks = manifest.chunks_written, "Committed array");
        Ok(ArrayHandle {
            io: self.io,
            name: self.name,
            layout: manifest.layout,
            generation: manifest.generation,
            _element: PhantomData,
        })
    }

    /// Discard every chunk written so far
    pub async fn abort(self) -> Result<()> {
        tracing::debug!(array = %self.name, chunks = self.written.len(), "Aborting array");
        self.io
            .delete_prefix(&array_generation_prefix(&self.name, &self.generation))
            .await
    }
}

/// Read handle on a committed array
pub struct ArrayHandle<T: ArrayElement> {
    io: Arc<dyn IOManager>,
    name: String,
    layout: ArrayLayout,
    generation: String,
    _element: PhantomData<T>,
}

impl<T: ArrayElement> Clone for ArrayHandle<T> {
    fn clone(&self) -> Self {
        Self {
            io: Arc::clone(&self.io),
            name: self.name.clone(),
            layout: self.layout.clone(),
            generation: self.generation.clone(),
            _element: PhantomData,
        }
    }
}

impl<T: ArrayElement> ArrayHandle<T> {
    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Elements of one chunk in row-major order
    pub async fn read_chunk(&self, chunk_coords: &[usize]) -> Result<Vec<T>> {
        let index = self.layout.chunk_coords_to_index(chunk_coords);
        let expected = self.layout.chunk_elements(chunk_coords);
        read_chunk_at(
            Arc::clone(&self.io),
            chunk_path(&self.name, &self.generation, index),
            expected,
        )
        .await
    }

    /// Dense copy of the elements in `ranges`, one range per dimension
    pub async fn read_slice(&self, ranges: &[Range<usize>]) -> Result<ArrayD<T>> {
        self.layout.check_ranges(ranges)?;

        let chunks = self.layout.overlapping_chunks(ranges);
        let futures: Vec<_> = chunks
            .iter()
            .map(|coords| {
                let index = self.layout.chunk_coords_to_index(coords);
                let path = chunk_path(&self.name, &self.generation, index);
                read_chunk_at(
                    Arc::clone(&self.io),
                    path,
                    self.layout.chunk_elements(coords),
                )
            })
            .collect();
        let chunk_data = try_join_all(futures).await?;

        let out_shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        let mut out = ArrayD::<T>::zeros(IxDyn(&out_shape));

        for (coords, data) in chunks.iter().zip(chunk_data) {
            let chunk_ranges = self.layout.chunk_data_range(coords);
            let extent: Vec<usize> = chunk_ranges.iter().map(|r| r.len()).collect();
            let chunk = ArrayD::from_shape_vec(IxDyn(&extent), data)
                .map_err(|e| SegyError::InvalidFormat(e.to_string()))?;

            // Intersection in array coordinates, then shifted into each frame
            let overlap: Vec<Range<usize>> = chunk_ranges
                .iter()
                .zip(ranges)
                .map(|(c, r)| c.start.max(r.start)..c.end.min(r.end))
                .collect();

            let source = chunk.slice_each_axis(|ax| {
                let d = ax.axis.index();
                Slice::from(
                    overlap[d].start - chunk_ranges[d].start..overlap[d].end - chunk_ranges[d].start,
                )
            });
            out.slice_each_axis_mut(|ax| {
                let d = ax.axis.index();
                Slice::from(overlap[d].start - ranges[d].start..overlap[d].end - ranges[d].start)
            })
            .assign(&source);
        }

        Ok(out)
    }
}

async fn read_chunk_at<T: ArrayElement>(
    io: Arc<dyn IOManager>,
    path: String,
    expected: usize,
) -> Result<Vec<T>> {
    let frame = match io.read(&path).await {
        Ok(frame) => frame,
        Err(SegyError::NotFound(_)) => return Ok(vec![T::zero(); expected]),
        Err(e) => return Err(e),
    };
    let data: Vec<T> = bytes_to_typed_data(&decode_chunk(&frame)?)?;
    if data.len() != expected {
        return Err(SegyError::InvalidFormat(format!(
            "Chunk {} holds {} elements, expected {}",
            path,
            data.len(),
            expected
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CompressionLevel, CompressionMethod};
    use crate::types::DataType;
    use tempfile::TempDir;

    fn layout() -> ArrayLayout {
        ArrayLayout::new(vec![5, 4], vec![2, 3], DataType::I32).unwrap()
    }

    /// Fill a 5x4 array with value = row * 10 + col, chunk by chunk
    async fn write_grid(store: &ArrayStore, name: &str) -> ArrayHandle<i32> {
        let mut sink = store.create_array::<i32>(name, layout()).await.unwrap();
        for index in 0..sink.layout().total_chunks() {
            let coords = sink.layout().chunk_index_to_coords(index);
            let ranges = sink.layout().chunk_data_range(&coords);
            let mut data = Vec::new();
            for row in ranges[0].clone() {
                for col in ranges[1].clone() {
                    data.push((row * 10 + col) as i32);
                }
            }
            sink.write_chunk(&coords, &data).await.unwrap();
        }
        sink.commit().await.unwrap()
    }

    #[tokio::test]
    async fn test_read_slice_across_chunks() {
        let store = ArrayStore::memory();
        let handle = write_grid(&store, "grid").await;

        let slice = handle.read_slice(&[1..4, 2..4]).await.unwrap();
        assert_eq!(slice.shape(), &[3, 2]);
        assert_eq!(slice[[0, 0]], 12);
        assert_eq!(slice[[2, 1]], 33);

        let full = handle.read_slice(&[0..5, 0..4]).await.unwrap();
        assert_eq!(full[[4, 3]], 43);
    }

    #[tokio::test]
    async fn test_uncommitted_array_is_invisible() {
        let store = ArrayStore::memory();
        let mut sink = store.create_array::<i32>("grid", layout()).await.unwrap();
        sink.write_chunk(&[0, 0], &[1; 6]).await.unwrap();

        assert!(matches!(
            store.open_array::<i32>("grid").await,
            Err(SegyError::NotFound(_))
        ));
        sink.abort().await.unwrap();
        assert!(store.io().list("arrays/grid").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_arrays_are_write_once() {
        let store = ArrayStore::memory();
        write_grid(&store, "grid").await;
        assert!(matches!(
            store.create_array::<i32>("grid", layout()).await,
            Err(SegyError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_array() {
        let store = ArrayStore::memory();
        write_grid(&store, "grid").await;
        store.delete_array("grid").await.unwrap();
        assert!(!store.array_exists("grid").await.unwrap());
        assert!(store.io().list("arrays").await.unwrap().is_empty());
        write_grid(&store, "grid").await;
    }

    #[tokio::test]
    async fn test_delete_group() {
        let store = ArrayStore::memory();
        write_grid(&store, "g1/grid").await;
        write_grid(&store, "g1/other").await;
        write_grid(&store, "g2/grid").await;
        assert_eq!(store.array_groups().await.unwrap(), vec!["g1", "g2"]);

        store.delete_group("g1").await.unwrap();
        assert!(!store.array_exists("g1/grid").await.unwrap());
        assert!(!store.array_exists("g1/other").await.unwrap());
        assert!(store.array_exists("g2/grid").await.unwrap());
        assert_eq!(store.array_groups().await.unwrap(), vec!["g2"]);

        assert!(matches!(
            store.delete_group("g2/grid").await,
            Err(SegyError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_unwritten_chunks_read_zero() {
        let store = ArrayStore::memory();
        let mut sink = store.create_array::<i32>("sparse", layout()).await.unwrap();
        sink.write_chunk(&[2, 1], &[7]).await.unwrap();
        let handle = sink.commit().await.unwrap();

        let full = handle.read_slice(&[0..5, 0..4]).await.unwrap();
        assert_eq!(full[[4, 3]], 7);
        assert_eq!(full.iter().filter(|&&v| v == 0).count(), 19);
    }

    #[tokio::test]
    async fn test_chunk_validation() {
        let store = ArrayStore::memory();
        let mut sink = store.create_array::<i32>("grid", layout()).await.unwrap();
        assert!(matches!(
            sink.write_chunk(&[3, 0], &[0; 6]).await,
            Err(SegyError::OutOfBounds(_))
        ));
        assert!(matches!(
            sink.write_chunk(&[0, 0], &[0; 5]).await,
            Err(SegyError::InvalidDimensions(_))
        ));
        assert!(store.create_array::<f32>("other", layout()).await.is_err());
    }

    #[tokio::test]
    async fn test_filesystem_store_and_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArrayStore::open(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        let layout = ArrayLayout::new(vec![3, 8], vec![1, 8], DataType::F32)
            .unwrap()
            .with_compression(CompressionMethod::Deflate, CompressionLevel::fast());
        let mut sink = store.create_array::<f32>("traces", layout).await.unwrap();
        for row in 0..3 {
            let data: Vec<f32> = (0..8).map(|i| row as f32 + i as f32 / 10.0).collect();
            sink.write_chunk(&[row, 0], &data).await.unwrap();
        }
        sink.commit().await.unwrap();

        store.put_metadata("info", &vec![1, 2, 3]).await.unwrap();
        let reopened = ArrayStore::open(&format!("file://{}", temp_dir.path().display()))
            .await
            .unwrap();
        let info: Vec<i32> = reopened.get_metadata("info").await.unwrap();
        assert_eq!(info, vec![1, 2, 3]);

        let handle = reopened.open_array::<f32>("traces").await.unwrap();
        let row = handle.read_slice(&[2..3, 0..8]).await.unwrap();
        assert_eq!(row[[0, 5]], 2.5);
        assert!(reopened.open_array::<i64>("traces").await.is_err());
    }
}
