//! Error types for reference set reconciliation.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors that can occur during a reconciliation run.
///
/// Configuration and data errors (`InvalidFormula`, `CircularDependency`,
/// `MissingDefinition`, `Config`) abort the whole run. Remote failures are
/// caught at the refset boundary and turned into result notifications so the
/// remaining refsets still process.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A refset's ECL formula failed to parse.
    #[error("invalid ECL for refset {refset_id}: {source}")]
    InvalidFormula {
        /// The refset whose formula was rejected.
        refset_id: String,
        /// The underlying parse error.
        #[source]
        source: refset_ecl::EclError,
    },

    /// Transitive formula expansion did not reach a fixed point.
    ///
    /// This is usually a circular dependency between refset formulas. The
    /// unresolved ids are the starting point for investigation.
    #[error(
        "unexpected volume of processing while expanding transitive ECL \
         ({iterations} passes); this is usually due to a circular dependency. \
         Unresolved ids: {unresolved:?}. Resolved so far: {resolved:?}"
    )]
    CircularDependency {
        /// Number of fixed-point passes attempted.
        iterations: usize,
        /// Ids still waiting on a resolved formula.
        unresolved: Vec<String>,
        /// Partial resolution state, to aid diagnosis.
        resolved: BTreeMap<String, String>,
    },

    /// A referenced refset has no formula to substitute.
    #[error("unable to find replacement ECL for {0}")]
    MissingDefinition(String),

    /// A bulk member change reached terminal FAILED status.
    #[error("bulk update {job_id} failed: {message}")]
    BulkUpdateFailed {
        /// The bulk job id reported by the terminology service.
        job_id: String,
        /// The failure message from the job status endpoint.
        message: String,
    },

    /// A remote response was missing something the engine relies on.
    #[error("unexpected response from remote service: {0}")]
    UnexpectedResponse(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for reconciliation operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
