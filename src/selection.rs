//! Value-range selection over axis members
//!
//! Line numbers are labels, not positions: inline 1000 may be followed by
//! inline 1002. An [`AxisRange`] is a stepped range over label values and
//! [`FilteredRange`] keeps only the values that are actual members of an axis.

use crate::error::{Result, SegyError};
use crate::geometry::AxisSpec;
use serde::{Deserialize, Serialize};

/// Stepped range of axis values, `stop` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRange {
    pub start: Option<i32>,
    pub stop: Option<i32>,
    pub step: i32,
}

impl Default for AxisRange {
    fn default() -> Self {
        Self::all()
    }
}

impl AxisRange {
    /// Every member of the axis
    pub fn all() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }

    pub fn new(start: i32, stop: i32) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// Just `value`
    pub fn single(value: i32) -> Self {
        Self::new(value, value.saturating_add(1))
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = step;
        self
    }
}

/// Filters stepped ranges down to the members of an axis.
///
/// Open bounds default to the axis minimum and one past its maximum for
/// positive steps, and to the maximum and one below the minimum for negative
/// steps, so `AxisRange::all().with_step(-1)` walks the axis backwards.
#[derive(Debug, Clone, Copy)]
pub struct FilteredRange<'a> {
    axis: &'a AxisSpec,
}

impl<'a> FilteredRange<'a> {
    pub fn new(axis: &'a AxisSpec) -> Self {
        Self { axis }
    }

    /// Members of the axis hit by `range`, in the order the step walks them
    pub fn select(&self, range: &AxisRange) -> Result<Vec<i32>> {
        if range.step == 0 {
            return Err(SegyError::InvalidDimensions(
                "range step cannot be zero".to_string(),
            ));
        }
        let (Some(min), Some(max)) = (self.axis.min(), self.axis.max()) else {
            return Ok(Vec::new());
        };
        let (min, max) = (i64::from(min), i64::from(max));
        let step = i64::from(range.step);

        if step > 0 {
            let start = range.start.map_or(min, i64::from).max(min);
            let stop = range.stop.map_or(max + 1, i64::from).min(max + 1);
            Ok(self
                .axis
                .values()
                .iter()
                .copied()
                .filter(|&v| {
                    let v = i64::from(v);
                    v >= start && v < stop && (v - start) % step == 0
                })
                .collect())
        } else {
            let start = range.start.map_or(max, i64::from).min(max);
            let stop = range.stop.map_or(min - 1, i64::from).max(min - 1);
            Ok(self
                .axis
                .values()
                .iter()
                .rev()
                .copied()
                .filter(|&v| {
                    let v = i64::from(v);
                    v <= start && v > stop && (start - v) % -step == 0
                })
                .collect())
        }
    }
}
