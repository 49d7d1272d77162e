//! SEG-Y reader contract consumed by ingestion
//!
//! Byte-level SEG-Y decoding (EBCDIC text headers, binary header layout,
//! IBM float samples) lives outside this crate. Anything that can enumerate
//! traces, hand out their header fields by name and decode their samples can
//! be ingested by implementing [`SegyReader`].
//!
//! [`MemorySegyReader`] holds a whole survey in memory. It backs the tests and
//! is handy for synthetic surveys.

use crate::catalog::HeaderFieldMap;
use crate::error::{Result, SegyError};
use crate::types::{HeaderRole, RawTraceHeader};
use std::collections::BTreeMap;

/// Size of the textual file header plus the binary file header
pub const FILE_HEADER_BYTES: u64 = 3600;

/// Size of one trace header
pub const TRACE_HEADER_BYTES: u64 = 240;

/// Physical layout of a SEG-Y file with fixed-length traces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileExtent {
    /// Total file size in bytes
    pub file_size: u64,
    /// Bytes before the first trace (text + binary + extended headers)
    pub header_bytes: u64,
    /// Bytes per trace, header included
    pub trace_bytes: u64,
}

impl FileExtent {
    /// Extent of a standard file with `samples` samples of `sample_bytes` each
    pub fn standard(file_size: u64, samples: usize, sample_bytes: u64) -> Self {
        Self {
            file_size,
            header_bytes: FILE_HEADER_BYTES,
            trace_bytes: TRACE_HEADER_BYTES + samples as u64 * sample_bytes,
        }
    }

    /// Number of whole traces the file can hold, or None if the trace
    /// region is not a whole multiple of the trace length
    pub fn implied_trace_count(&self) -> Option<usize> {
        if self.trace_bytes == 0 || self.file_size < self.header_bytes {
            return None;
        }
        let body = self.file_size - self.header_bytes;
        if body % self.trace_bytes != 0 {
            return None;
        }
        usize::try_from(body / self.trace_bytes).ok()
    }

    /// Fails with `TruncatedFile` unless the extent holds exactly `trace_count` traces
    pub fn check(&self, trace_count: usize) -> Result<()> {
        match self.implied_trace_count() {
            Some(n) if n == trace_count => Ok(()),
            _ => Err(SegyError::TruncatedFile {
                file_size: self.file_size,
                header_bytes: self.header_bytes,
                trace_bytes: self.trace_bytes,
                trace_count,
            }),
        }
    }
}

/// Random-access reader over the traces of one SEG-Y file.
///
/// Methods are synchronous and may block on file I/O. [`crate::ingest`]
/// moves them off the async workers of a multi-threaded runtime; on a
/// current-thread runtime they run inline.
pub trait SegyReader: Send + Sync {
    /// Number of traces in the file
    fn trace_count(&self) -> usize;

    /// Number of samples in every trace
    fn samples_per_trace(&self) -> usize;

    /// All header fields of trace `index`, without touching its samples
    fn read_header(&self, index: usize) -> Result<RawTraceHeader>;

    /// Decoded samples of trace `index`
    fn read_samples(&self, index: usize) -> Result<Vec<f32>>;

    /// File layout, when the reader is backed by a fixed-trace-length file
    fn extent(&self) -> Option<FileExtent> {
        None
    }

    /// Textual file headers (the 3200 byte header and any extended ones)
    fn text_headers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Binary file header fields by name
    fn binary_header(&self) -> BTreeMap<String, i64> {
        BTreeMap::new()
    }

    /// Time or depth of every sample; sample indices when unknown
    fn sample_axis(&self) -> Vec<f64> {
        (0..self.samples_per_trace()).map(|i| i as f64).collect()
    }
}

/// In-memory SEG-Y survey
#[derive(Debug, Clone, Default)]
pub struct MemorySegyReader {
    samples_per_trace: usize,
    headers: Vec<RawTraceHeader>,
    samples: Vec<Vec<f32>>,
    text: Vec<String>,
    binary: BTreeMap<String, i64>,
    sample_axis: Option<Vec<f64>>,
    extent: Option<FileExtent>,
}

impl MemorySegyReader {
    /// Create an empty survey whose traces have `samples_per_trace` samples
    pub fn new(samples_per_trace: usize) -> Self {
        Self {
            samples_per_trace,
            ..Default::default()
        }
    }

    /// Append a trace in file order
    pub fn push_trace(&mut self, header: RawTraceHeader, samples: Vec<f32>) -> Result<()> {
        if samples.len() != self.samples_per_trace {
            return Err(SegyError::InvalidDimensions(format!(
                "trace {} has {} samples, expected {}",
                self.headers.len(),
                samples.len(),
                self.samples_per_trace
            )));
        }
        self.headers.push(header);
        self.samples.push(samples);
        Ok(())
    }

    /// Append a trace whose header carries the standard geometry fields
    /// plus a 1-based `TRACE_SEQUENCE_FILE`
    pub fn push_grid_trace(
        &mut self,
        inline: i32,
        crossline: i32,
        offset: i32,
        samples: Vec<f32>,
    ) -> Result<()> {
        let fields = HeaderFieldMap::default();
        let mut header = RawTraceHeader::new();
        header.insert(
            "TRACE_SEQUENCE_FILE".to_string(),
            self.headers.len() as i64 + 1,
        );
        header.insert(fields.field(HeaderRole::Inline).to_string(), inline.into());
        header.insert(
            fields.field(HeaderRole::Crossline).to_string(),
            crossline.into(),
        );
        header.insert(fields.field(HeaderRole::Offset).to_string(), offset.into());
        header.insert(
            fields.field(HeaderRole::CdpX).to_string(),
            i64::from(inline) * 25,
        );
        header.insert(
            fields.field(HeaderRole::CdpY).to_string(),
            i64::from(crossline) * 25,
        );
        self.push_trace(header, samples)
    }

    pub fn with_text_header(mut self, text: impl Into<String>) -> Self {
        self.text.push(text.into());
        self
    }

    pub fn with_binary_field(mut self, name: impl Into<String>, value: i64) -> Self {
        self.binary.insert(name.into(), value);
        self
    }

    pub fn with_sample_axis(mut self, axis: Vec<f64>) -> Self {
        self.sample_axis = Some(axis);
        self
    }

    pub fn with_extent(mut self, extent: FileExtent) -> Self {
        self.extent = Some(extent);
        self
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.headers.len() {
            return Err(SegyError::IndexOutOfRange {
                index,
                len: self.headers.len(),
            });
        }
        Ok(())
    }
}

impl SegyReader for MemorySegyReader {
    fn trace_count(&self) -> usize {
        self.headers.len()
    }

    fn samples_per_trace(&self) -> usize {
        self.samples_per_trace
    }

    fn read_header(&self, index: usize) -> Result<RawTraceHeader> {
        self.check_index(index)?;
        Ok(self.headers[index].clone())
    }

    fn read_samples(&self, index: usize) -> Result<Vec<f32>> {
        self.check_index(index)?;
        Ok(self.samples[index].clone())
    }

    fn extent(&self) -> Option<FileExtent> {
        self.extent
    }

    fn text_headers(&self) -> Vec<String> {
        self.text.clone()
    }

    fn binary_header(&self) -> BTreeMap<String, i64> {
        self.binary.clone()
    }

    fn sample_axis(&self) -> Vec<f64> {
        match &self.sample_axis {
            Some(axis) => axis.clone(),
            None => (0..self.samples_per_trace).map(|i| i as f64).collect(),
        }
    }
}
