//! Runtime configuration for the reconciliation engine.

use serde::Deserialize;

use crate::error::SyncResult;

/// Configuration surface of the engine, read from `REFSET_SYNC_*`
/// environment variables.
///
/// # Example
///
/// ```bash
/// export REFSET_SYNC_PERFORMANCE_TERMINOLOGY_URL=https://perf.example/snowstorm/snomed-ct
/// export REFSET_SYNC_MAIN_TERMINOLOGY_URL=https://main.example/snowstorm/snomed-ct
/// export REFSET_SYNC_PERCENT_CHANGE_THRESHOLD=0.1
/// export REFSET_SYNC_COUNT_CHANGE_THRESHOLD=5000
/// export REFSET_SYNC_PROCESS_NAME=ecl-refset-sync
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the performance terminology endpoint (diffs, member
    /// lookups, bulk changes).
    pub performance_terminology_url: String,

    /// Base URL of the main terminology read endpoint (inactive-member
    /// sweep).
    pub main_terminology_url: String,

    /// Branch path, pipe notation (encoded when placed in URLs).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Concept id of the governing "ECL refset of refsets".
    #[serde(default = "default_query_refset_id")]
    pub query_refset_id: String,

    /// Fraction of the current membership above which a change is reported
    /// as a percentage-threshold warning.
    pub percent_change_threshold: f64,

    /// Absolute candidate-change count at which a change is vetoed.
    pub count_change_threshold: u64,

    /// When true, count-threshold breaches warn instead of vetoing.
    #[serde(default)]
    pub ignore_count_change_threshold: bool,

    /// Name this process is registered under in the process registry; the
    /// run is a no-op unless the registry lists it as enabled.
    pub process_name: String,

    /// Identity service base URL.
    pub ims_url: String,

    /// Identity service login.
    pub ims_username: String,

    /// Identity service password.
    pub ims_password: String,

    /// Base URL of the process registry / job-result sink.
    pub lingo_url: String,

    /// Append-only audit file for threshold and failure lines.
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,
}

fn default_branch() -> String {
    "MAIN|SNOMEDCT-AU".to_string()
}

fn default_query_refset_id() -> String {
    "900000000000513000".to_string()
}

fn default_audit_log_path() -> String {
    "threshold.txt".to_string()
}

impl SyncConfig {
    /// Loads the configuration from `REFSET_SYNC_*` environment variables.
    pub fn from_env() -> SyncResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("REFSET_SYNC").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// The branch path with the pipe encoded for use inside a URL.
    pub fn encoded_branch(&self) -> String {
        self.branch.replace('|', "%7C")
    }
}
