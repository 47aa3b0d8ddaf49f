use std::{fmt, io};
use thiserror::Error;

/// Unified error type for all census query operations.
///
/// The query layer performs no automatic retry: errors raised by the storage
/// backend propagate to the caller unchanged, at the operation that triggered
/// them. Each variant carries a message describing what failed.
///
/// `Error` is `Send + Sync`, so it can be returned from worker-pool tasks and
/// carried across the async facade.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reported by the storage backend.
    ///
    /// Transient storage failures arrive here and are surfaced unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arrow library error during columnar data operations.
    ///
    /// This occurs when concatenating chunks whose schemas disagree, when a
    /// compute kernel rejects its inputs, or when a batch cannot be assembled.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A query could not be constructed.
    ///
    /// Raised synchronously by constructors before any I/O is issued, e.g. when
    /// the experiment does not exist or the named measurement is absent. These
    /// are never retried.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A referenced measurement, matrix, or column is absent from storage.
    #[error("not found: {0}")]
    NotFound(String),

    /// The matrix exists but is not stored in the supported sparse form.
    ///
    /// No conversion is attempted.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid user input or API parameter.
    ///
    /// Empty or unknown matrix names passed to a read, or malformed options.
    /// Fix the input and retry.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// A value filter could not be parsed or evaluated.
    ///
    /// Parsing happens when the axis filter is built; evaluation errors (for
    /// example comparing a string column against a number that cannot be cast)
    /// surface at the read that evaluates the filter.
    #[error("predicate build error: {0}")]
    PredicateBuild(String),

    /// Internal error indicating a bug or unexpected state.
    ///
    /// The usual cause is a worker-pool task that panicked or was dropped before
    /// sending its reply.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Create a [`Error::NotFound`] from any displayable description.
    ///
    /// # Examples
    ///
    /// ```
    /// use census_result::Error;
    ///
    /// let err = Error::not_found(format!("measurement '{}'", "RNA"));
    /// assert!(matches!(err, Error::NotFound(msg) if msg.contains("RNA")));
    /// ```
    #[inline]
    pub fn not_found<E: fmt::Display>(what: E) -> Self {
        Error::NotFound(what.to_string())
    }

    /// Create a predicate build error from any displayable error.
    ///
    /// This is a convenience method for converting parser errors into
    /// [`Error::PredicateBuild`] while preserving the original error message.
    ///
    /// # Examples
    ///
    /// ```
    /// use census_result::Error;
    ///
    /// fn unsupported_predicate() -> Result<(), Error> {
    ///     let io_err = std::io::Error::new(std::io::ErrorKind::Other, "not supported");
    ///     Err(Error::predicate_build(io_err))
    /// }
    ///
    /// let err = unsupported_predicate().unwrap_err();
    /// assert!(matches!(err, Error::PredicateBuild(msg) if msg.contains("not supported")));
    /// ```
    #[inline]
    pub fn predicate_build<E: fmt::Display>(err: E) -> Self {
        Error::PredicateBuild(err.to_string())
    }

    #[inline]
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        Error::Internal(err.to_string())
    }

    /// Whether this error belongs to the "bad argument" family: construction
    /// failures, bad matrix names, or unsupported representations.
    pub fn is_value_error(&self) -> bool {
        matches!(
            self,
            Error::ValidationError(_)
                | Error::InvalidArgumentError(_)
                | Error::UnsupportedFormat(_)
        )
    }
}
