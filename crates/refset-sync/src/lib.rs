//! # refset-sync
//!
//! Reconciles the membership of formula driven SNOMED CT reference sets
//! against a terminology server.
//!
//! Each refset in a governing "ECL refset of refsets" declares its intended
//! membership as an ECL formula. A run resolves references between those
//! formulas to a fixed point, computes the add/remove delta between what each
//! formula matches and what is currently recorded, gates the delta against
//! configured thresholds, applies it through bulk member changes, and posts a
//! structured job result.
//!
//! The engine talks to its collaborators through gateway traits
//! ([`terminology::TerminologyGateway`], [`lingo::ProcessGateway`]), so the
//! whole reconciliation is testable against in-memory implementations; the
//! [`snowstorm`] and [`lingo`] modules provide the HTTP implementations used
//! by the `refset-sync` binary.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod audit;
pub mod auth;
pub mod bulk;
pub mod config;
pub mod diff;
pub mod error;
pub mod lingo;
pub mod model;
pub mod records;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod snowstorm;
pub mod terminology;
pub mod threshold;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use runner::RunOrchestrator;

/// Fixed size of the bounded worker pools used for pagination fan-out and
/// per-item record building.
pub const CONCURRENT_WORKERS: usize = 50;
