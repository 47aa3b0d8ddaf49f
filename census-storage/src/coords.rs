//! Coordinate selections over the stable identifiers of one axis.

use std::sync::Arc;

use arrow::array::{Array, BooleanArray, Int64Array};
use rustc_hash::FxHashSet;

/// Which identifiers of one axis a read is restricted to.
///
/// Range bounds are inclusive on both ends; `None` leaves that side unbounded.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AxisCoords {
    #[default]
    All,
    Points(Arc<Int64Array>),
    Range {
        start: Option<i64>,
        end: Option<i64>,
    },
}

impl AxisCoords {
    pub fn points<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        AxisCoords::Points(Arc::new(ids.into_iter().collect::<Vec<_>>().into()))
    }

    pub fn range(start: Option<i64>, end: Option<i64>) -> Self {
        AxisCoords::Range { start, end }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, AxisCoords::All)
    }

    /// Whether this selection can match nothing, without consulting storage.
    pub fn is_empty_selection(&self) -> bool {
        match self {
            AxisCoords::All => false,
            AxisCoords::Points(ids) => ids.is_empty(),
            AxisCoords::Range {
                start: Some(start),
                end: Some(end),
            } => start > end,
            AxisCoords::Range { .. } => false,
        }
    }

    /// Build a membership tester for repeated lookups.
    pub fn matcher(&self) -> CoordsMatcher {
        match self {
            AxisCoords::All => CoordsMatcher::All,
            AxisCoords::Points(ids) => CoordsMatcher::Set(ids.values().iter().copied().collect()),
            AxisCoords::Range { start, end } => CoordsMatcher::Range {
                lo: start.unwrap_or(i64::MIN),
                hi: end.unwrap_or(i64::MAX),
            },
        }
    }
}

impl From<Vec<i64>> for AxisCoords {
    fn from(ids: Vec<i64>) -> Self {
        AxisCoords::Points(Arc::new(ids.into()))
    }
}

impl From<Arc<Int64Array>> for AxisCoords {
    fn from(ids: Arc<Int64Array>) -> Self {
        AxisCoords::Points(ids)
    }
}

/// Membership test derived from an [`AxisCoords`].
#[derive(Clone, Debug)]
pub enum CoordsMatcher {
    All,
    Set(FxHashSet<i64>),
    Range { lo: i64, hi: i64 },
}

impl CoordsMatcher {
    #[inline]
    pub fn contains(&self, id: i64) -> bool {
        match self {
            CoordsMatcher::All => true,
            CoordsMatcher::Set(set) => set.contains(&id),
            CoordsMatcher::Range { lo, hi } => *lo <= id && id <= *hi,
        }
    }

    /// Selection mask for `ids`, one entry per element.
    pub fn mask(&self, ids: &Int64Array) -> BooleanArray {
        ids.values()
            .iter()
            .map(|&id| Some(self.contains(id)))
            .collect()
    }
}

/// A cross-product selection over both matrix dimensions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatrixCoords {
    pub obs: AxisCoords,
    pub var: AxisCoords,
}

impl MatrixCoords {
    pub fn new(obs: AxisCoords, var: AxisCoords) -> Self {
        Self { obs, var }
    }
}
