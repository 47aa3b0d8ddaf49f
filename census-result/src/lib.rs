//! Error types and result definitions for the census query crates.
//!
//! Every crate in the workspace returns [`Result<T>`], whose error variant is the
//! single [`Error`] enum. Errors cross crate boundaries unchanged with `?`, so a
//! storage failure surfaced deep inside a matrix read reaches the caller with its
//! original variant and message.
//!
//! # Error Categories
//!
//! - **I/O errors** ([`Error::Io`]): failures reported by the storage backend
//! - **Data format errors** ([`Error::Arrow`]): Arrow batch construction or kernels
//! - **Construction errors** ([`Error::ValidationError`]): a query that cannot be built
//! - **Lookup failures** ([`Error::NotFound`]): missing measurements, matrices, columns
//! - **Representation errors** ([`Error::UnsupportedFormat`]): dense matrices
//! - **User input errors** ([`Error::InvalidArgumentError`]): bad matrix names, etc.
//! - **Filter errors** ([`Error::PredicateBuild`]): malformed value filters
//! - **Internal errors** ([`Error::Internal`]): lost worker tasks

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
