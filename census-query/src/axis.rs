//! Axis selection: which rows of `obs` or `var` a query covers.

use std::fmt;

use census_expr::ValueFilter;
use census_result::Result;
use census_storage::AxisCoords;

/// One of the two independent dimensions of an experiment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Obs,
    Var,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::Obs => "obs",
            Axis::Var => "var",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable row selection for one axis: coordinates on `soma_joinid`
/// combined with an optional value filter over the axis columns.
///
/// The default selects every row.
///
/// ```
/// use census_query::AxisQuery;
///
/// let q = AxisQuery::all()
///     .with_range(Some(0), Some(999))
///     .with_value_filter("tissue = 'lung' AND is_primary = true")
///     .unwrap();
/// assert_eq!(q.value_filter().unwrap().columns(), vec!["is_primary", "tissue"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AxisQuery {
    coords: AxisCoords,
    value_filter: Option<ValueFilter>,
}

impl AxisQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_coords(mut self, coords: AxisCoords) -> Self {
        self.coords = coords;
        self
    }

    pub fn with_points<I: IntoIterator<Item = i64>>(self, ids: I) -> Self {
        self.with_coords(AxisCoords::points(ids))
    }

    /// Inclusive on both ends; `None` leaves a side open.
    pub fn with_range(self, start: Option<i64>, end: Option<i64>) -> Self {
        self.with_coords(AxisCoords::range(start, end))
    }

    /// Parse and attach a value filter. Malformed text fails here, before any
    /// storage is touched.
    pub fn with_value_filter(self, text: &str) -> Result<Self> {
        Ok(self.with_filter(ValueFilter::parse(text)?))
    }

    pub fn with_filter(mut self, filter: ValueFilter) -> Self {
        self.value_filter = Some(filter);
        self
    }

    pub fn coords(&self) -> &AxisCoords {
        &self.coords
    }

    pub fn value_filter(&self) -> Option<&ValueFilter> {
        self.value_filter.as_ref()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.coords.is_all() && self.value_filter.is_none()
    }
}
