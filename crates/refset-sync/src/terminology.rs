//! Gateway trait for the terminology query service.
//!
//! The engine only ever talks to the terminology service through
//! [`TerminologyGateway`], so tests drive the whole reconciliation against an
//! in-memory implementation instead of a live server.

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::model::{BulkJobState, ChangeRecord, ConceptSearchPage, RefsetMemberPage};

/// Which terminology endpoint a concept search goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEndpoint {
    /// The performance query endpoint (diff queries, members, bulk changes).
    Performance,
    /// The main read endpoint (inactive-member sweep).
    Main,
}

/// Parameters of a refset member search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberQuery {
    /// The reference set to search in.
    pub reference_set: String,
    /// Restrict to one referenced component.
    pub referenced_component_id: Option<String>,
    /// Restrict by membership active flag.
    pub active: Option<bool>,
    /// Page offset.
    pub offset: u64,
    /// Page size; `None` leaves the service default in place.
    pub limit: Option<u64>,
}

impl MemberQuery {
    /// A whole-refset query with no filters.
    pub fn all_of(reference_set: impl Into<String>) -> Self {
        MemberQuery {
            reference_set: reference_set.into(),
            referenced_component_id: None,
            active: None,
            offset: 0,
            limit: None,
        }
    }

    /// A single-row lookup for one component with the given active state.
    pub fn component_row(
        reference_set: impl Into<String>,
        referenced_component_id: impl Into<String>,
        active: bool,
    ) -> Self {
        MemberQuery {
            reference_set: reference_set.into(),
            referenced_component_id: Some(referenced_component_id.into()),
            active: Some(active),
            offset: 0,
            limit: Some(1),
        }
    }
}

/// The terminology service surface the engine depends on.
#[async_trait]
pub trait TerminologyGateway: Send + Sync {
    /// Runs an ECL concept search, paged by `offset`/`limit`.
    ///
    /// The service caps `offset + limit` for unsorted results; callers fan
    /// out within that window and re-query for anything beyond it.
    async fn search_concepts(
        &self,
        endpoint: QueryEndpoint,
        ecl: &str,
        active_only: bool,
        offset: u64,
        limit: Option<u64>,
    ) -> SyncResult<ConceptSearchPage>;

    /// Searches reference set member rows.
    async fn search_members(&self, query: MemberQuery) -> SyncResult<RefsetMemberPage>;

    /// Submits a bulk member change and returns the asynchronous job id.
    async fn submit_bulk(&self, records: &[ChangeRecord]) -> SyncResult<String>;

    /// Fetches the state of a bulk job.
    async fn bulk_status(&self, job_id: &str) -> SyncResult<BulkJobState>;
}
