//! Header catalog - geometry fields of every trace, in file order

use crate::error::{Result, SegyError};
use crate::segy::SegyReader;
use crate::types::{HeaderRole, RawTraceHeader, TraceHeader};
use serde::{Deserialize, Serialize};

/// Which raw header field carries each geometry role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFieldMap {
    pub inline: String,
    pub crossline: String,
    pub offset: String,
    pub cdp_x: String,
    pub cdp_y: String,
}

impl Default for HeaderFieldMap {
    // SEG-Y rev1 trace header bytes 189, 193, 37, 181 and 185
    fn default() -> Self {
        Self {
            inline: "INLINE_3D".to_string(),
            crossline: "CROSSLINE_3D".to_string(),
            offset: "offset".to_string(),
            cdp_x: "CDP_X".to_string(),
            cdp_y: "CDP_Y".to_string(),
        }
    }
}

impl HeaderFieldMap {
    /// Raw field name for a role
    pub fn field(&self, role: HeaderRole) -> &str {
        match role {
            HeaderRole::Inline => &self.inline,
            HeaderRole::Crossline => &self.crossline,
            HeaderRole::Offset => &self.offset,
            HeaderRole::CdpX => &self.cdp_x,
            HeaderRole::CdpY => &self.cdp_y,
        }
    }

    pub fn with_inline(mut self, field: impl Into<String>) -> Self {
        self.inline = field.into();
        self
    }

    pub fn with_crossline(mut self, field: impl Into<String>) -> Self {
        self.crossline = field.into();
        self
    }

    pub fn with_offset(mut self, field: impl Into<String>) -> Self {
        self.offset = field.into();
        self
    }

    /// Resolve the geometry roles of one raw header
    pub fn resolve(&self, trace: usize, raw: &RawTraceHeader) -> Result<TraceHeader> {
        let mut header = TraceHeader::default();
        for role in HeaderRole::ALL {
            let field = self.field(role);
            let value = match raw.get(field) {
                Some(&value) => i32::try_from(value).map_err(|_| SegyError::CorruptHeader {
                    trace,
                    field: field.to_string(),
                    value: Some(value),
                })?,
                None if role.is_mandatory() => {
                    return Err(SegyError::CorruptHeader {
                        trace,
                        field: field.to_string(),
                        value: None,
                    })
                }
                None => 0,
            };
            header.set(role, value);
        }
        Ok(header)
    }
}

/// Geometry header fields of every trace; position is the physical trace number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCatalog {
    headers: Vec<TraceHeader>,
}

impl HeaderCatalog {
    /// Read the header of every trace sequentially. Samples are not touched.
    pub fn build<R: SegyReader + ?Sized>(reader: &R, fields: &HeaderFieldMap) -> Result<Self> {
        let trace_count = reader.trace_count();
        if let Some(extent) = reader.extent() {
            extent.check(trace_count)?;
        }

        let mut headers = Vec::with_capacity(trace_count);
        for trace in 0..trace_count {
            let raw = reader.read_header(trace)?;
            headers.push(fields.resolve(trace, &raw)?);
        }

        tracing::info!(traces = trace_count, "Built header catalog");
        Ok(Self { headers })
    }

    /// Catalog over already-resolved headers
    pub fn from_headers(headers: Vec<TraceHeader>) -> Self {
        Self { headers }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get(&self, trace: usize) -> Option<&TraceHeader> {
        self.headers.get(trace)
    }

    pub fn headers(&self) -> &[TraceHeader] {
        &self.headers
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceHeader> {
        self.headers.iter()
    }
}
