//! Value-filter expressions for census axis dataframes.
//!
//! A value filter is a boolean expression over the columns of an `obs` or `var`
//! dataframe, written as a SQL-style predicate string such as
//! `tissue = 'lung' AND n_genes > 500`. [`ValueFilter::parse`] turns the string
//! into an [`Expr`] tree once, up front; storage backends evaluate that tree
//! against Arrow batches with [`evaluate`].

pub mod eval;
pub mod expr;
pub mod literal;
pub mod parse;

pub use eval::{evaluate, filter_batch};
pub use expr::*;
pub use literal::Literal;
pub use parse::ValueFilter;
