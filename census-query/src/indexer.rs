//! Stable identifier to dense position lookup.

use std::sync::Arc;

use arrow::array::{Array, Int64Array};
use rustc_hash::FxHashMap;

use crate::axis::Axis;

/// Position reported for identifiers that are not part of the axis.
pub const NOT_FOUND: i64 = -1;

/// Maps each `soma_joinid` of one axis to its 0-based position in the cached
/// identifier sequence.
#[derive(Debug, Clone)]
pub struct JoinIdIndex {
    positions: FxHashMap<i64, i64>,
}

impl JoinIdIndex {
    /// Build from the cached identifier sequence. A repeated identifier keeps
    /// its first position.
    pub fn new(joinids: &Int64Array) -> Self {
        let mut positions =
            FxHashMap::with_capacity_and_hasher(joinids.len(), Default::default());
        for (pos, id) in joinids.values().iter().enumerate() {
            positions.entry(*id).or_insert(pos as i64);
        }
        Self { positions }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn position(&self, joinid: i64) -> Option<i64> {
        self.positions.get(&joinid).copied()
    }

    /// Positions for `coords`, element for element. Unknown and null inputs
    /// map to [`NOT_FOUND`].
    pub fn get_indexer(&self, coords: &Int64Array) -> Int64Array {
        if coords.null_count() == 0 {
            return Int64Array::from_iter_values(
                coords
                    .values()
                    .iter()
                    .map(|id| self.position(*id).unwrap_or(NOT_FOUND)),
            );
        }
        Int64Array::from_iter_values(coords.iter().map(|id| {
            id.and_then(|id| self.position(id)).unwrap_or(NOT_FOUND)
        }))
    }
}

/// Index builder for both axes of a query.
///
/// Obtained from [`ExperimentQuery::indexer`](crate::ExperimentQuery::indexer),
/// which resolves and caches both identifier sets first. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AxisIndexer {
    obs: Arc<JoinIdIndex>,
    var: Arc<JoinIdIndex>,
}

impl AxisIndexer {
    pub(crate) fn new(obs: Arc<JoinIdIndex>, var: Arc<JoinIdIndex>) -> Self {
        Self { obs, var }
    }

    pub fn obs_index(&self, coords: &Int64Array) -> Int64Array {
        self.obs.get_indexer(coords)
    }

    pub fn var_index(&self, coords: &Int64Array) -> Int64Array {
        self.var.get_indexer(coords)
    }

    pub fn index(&self, axis: Axis, coords: &Int64Array) -> Int64Array {
        self.axis(axis).get_indexer(coords)
    }

    pub fn axis(&self, axis: Axis) -> &JoinIdIndex {
        match axis {
            Axis::Obs => &self.obs,
            Axis::Var => &self.var,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_sequence_order() {
        let idx = JoinIdIndex::new(&Int64Array::from(vec![30, 10, 20]));
        let got = idx.get_indexer(&Int64Array::from(vec![10, 20, 30]));
        assert_eq!(got.values().to_vec(), vec![1, 2, 0]);
    }

    #[test]
    fn duplicates_and_misses() {
        let idx = JoinIdIndex::new(&Int64Array::from(vec![5, 6]));
        let got = idx.get_indexer(&Int64Array::from(vec![6, 6, 7, 5]));
        assert_eq!(got.values().to_vec(), vec![1, 1, NOT_FOUND, 0]);
    }

    #[test]
    fn null_inputs_are_not_found() {
        let idx = JoinIdIndex::new(&Int64Array::from(vec![5]));
        let got = idx.get_indexer(&Int64Array::from(vec![Some(5), None]));
        assert_eq!(got.values().to_vec(), vec![0, NOT_FOUND]);
        assert_eq!(got.null_count(), 0);
    }

    #[test]
    fn empty_index() {
        let idx = JoinIdIndex::new(&Int64Array::from(Vec::<i64>::new()));
        assert!(idx.is_empty());
        assert_eq!(idx.get_indexer(&Int64Array::from(vec![1])).value(0), NOT_FOUND);
    }
}
