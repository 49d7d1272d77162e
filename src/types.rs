//! Core data types for tilesegy

use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Element types stored in chunked arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Signed 32-bit integer
    I32 = 0,
    /// Signed 64-bit integer
    I64 = 1,
    /// 32-bit floating point
    F32 = 2,
    /// 64-bit floating point
    F64 = 3,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::I32 | DataType::F32 => 4,
            DataType::I64 | DataType::F64 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A scalar that can be stored in a chunked array.
///
/// Elements are always stored little-endian regardless of host order.
pub trait ArrayElement: Copy + Zero + Send + Sync + fmt::Debug + 'static {
    /// Storage type tag written into the array manifest
    const DATA_TYPE: DataType;

    /// Append the little-endian encoding of `self` to `out`
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one element from the first `DATA_TYPE.size_in_bytes()` bytes
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_array_element {
    ($ty:ty, $tag:expr) => {
        impl ArrayElement for $ty {
            const DATA_TYPE: DataType = $tag;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_array_element!(i32, DataType::I32);
impl_array_element!(i64, DataType::I64);
impl_array_element!(f32, DataType::F32);
impl_array_element!(f64, DataType::F64);

/// Every field of one trace header, keyed by field name, as produced by a reader
pub type RawTraceHeader = BTreeMap<String, i64>;

/// Trace header fields that drive survey geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRole {
    Inline,
    Crossline,
    Offset,
    CdpX,
    CdpY,
}

impl HeaderRole {
    pub const ALL: [HeaderRole; 5] = [
        HeaderRole::Inline,
        HeaderRole::Crossline,
        HeaderRole::Offset,
        HeaderRole::CdpX,
        HeaderRole::CdpY,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HeaderRole::Inline => "inline",
            HeaderRole::Crossline => "crossline",
            HeaderRole::Offset => "offset",
            HeaderRole::CdpX => "cdp_x",
            HeaderRole::CdpY => "cdp_y",
        }
    }

    /// Mandatory roles must be present in every trace header.
    /// Optional ones default to zero when the reader does not supply them.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, HeaderRole::Inline | HeaderRole::Crossline)
    }
}

impl fmt::Display for HeaderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geometry fields of one trace, resolved from its raw header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TraceHeader {
    pub inline: i32,
    pub crossline: i32,
    pub offset: i32,
    pub cdp_x: i32,
    pub cdp_y: i32,
}

impl TraceHeader {
    pub fn get(&self, role: HeaderRole) -> i32 {
        match role {
            HeaderRole::Inline => self.inline,
            HeaderRole::Crossline => self.crossline,
            HeaderRole::Offset => self.offset,
            HeaderRole::CdpX => self.cdp_x,
            HeaderRole::CdpY => self.cdp_y,
        }
    }

    pub(crate) fn set(&mut self, role: HeaderRole, value: i32) {
        match role {
            HeaderRole::Inline => self.inline = value,
            HeaderRole::Crossline => self.crossline = value,
            HeaderRole::Offset => self.offset = value,
            HeaderRole::CdpX => self.cdp_x = value,
            HeaderRole::CdpY => self.cdp_y = value,
        }
    }

    /// The (inline, crossline, offset) grid coordinate of this trace
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.inline, self.crossline, self.offset)
    }
}

/// A point of the inline × crossline × offset grid
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Coordinate {
    pub inline: i32,
    pub crossline: i32,
    pub offset: i32,
}

impl Coordinate {
    pub fn new(inline: i32, crossline: i32, offset: i32) -> Self {
        Self {
            inline,
            crossline,
            offset,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.inline, self.crossline, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::I32.size_in_bytes(), 4);
        assert_eq!(DataType::I64.size_in_bytes(), 8);
        assert_eq!(DataType::F32.size_in_bytes(), 4);
        assert_eq!(DataType::F64.size_in_bytes(), 8);
        assert!(DataType::F32.is_float());
        assert!(!DataType::I64.is_float());
    }

    #[test]
    fn test_element_little_endian() {
        let mut out = Vec::new();
        1i32.write_le(&mut out);
        assert_eq!(out, vec![1, 0, 0, 0]);
        assert_eq!(i32::read_le(&out), 1);

        let mut out = Vec::new();
        (-2.5f32).write_le(&mut out);
        assert_eq!(f32::read_le(&out), -2.5);
        assert_eq!(<f32 as ArrayElement>::DATA_TYPE, DataType::F32);
    }

    #[test]
    fn test_trace_header_roles() {
        let mut header = TraceHeader::default();
        for (i, role) in HeaderRole::ALL.iter().enumerate() {
            header.set(*role, i as i32 * 10);
        }
        assert_eq!(header.get(HeaderRole::Crossline), 10);
        assert_eq!(header.get(HeaderRole::CdpY), 40);
        assert_eq!(header.coordinate(), Coordinate::new(0, 10, 20));
    }

    #[test]
    fn test_coordinate_ordering() {
        let a = Coordinate::new(1, 5, 0);
        let b = Coordinate::new(2, 1, 0);
        let c = Coordinate::new(2, 1, 3);
        assert!(a < b && b < c);
    }
}
