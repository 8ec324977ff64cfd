//! Crate error type.

use thiserror::Error;

use crate::exec::ExecutionFault;
use crate::input::FetchError;
use crate::marshal::MarshalError;
use crate::program::Diagnostic;

/// Everything that can go wrong between a script, its inputs and the
/// collected results.
///
/// No error is accompanied by partial results: a call either returns all
/// of what its cardinality promises or one of these.
#[derive(Debug, Error)]
pub enum Error {
    /// The script did not compile.
    #[error(transparent)]
    Compile(#[from] Diagnostic),

    /// An input, variable or result could not be converted.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// The call's arguments contradict each other, e.g. both an input value
    /// and a URL were given.
    #[error("usage: {0}")]
    Usage(String),

    /// The script raised an error while running.
    #[error(transparent)]
    Execution(#[from] ExecutionFault),

    /// `first` or `one` found no result.
    #[error("the query produced no results")]
    NoResult,

    /// `one` found more than one result. `count` is how many were pulled
    /// before giving up.
    #[error("expected exactly one result, got at least {count}")]
    Multiplicity { count: usize },

    /// The remote input could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The remote input was fetched but is not JSON.
    #[error("invalid JSON from {url}: {source}")]
    InvalidJson {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Error::Usage(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
