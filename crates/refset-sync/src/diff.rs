//! Diff engine: computes add and remove candidates for one refset.
//!
//! Each direction is a set-difference ECL query against the terminology
//! service. Results are paged; the service caps `offset + limit` for
//! unsorted searches, so the engine fans out page fetches inside that
//! window concurrently and reports whether more results remain beyond it.
//! The caller applies the window and queries again; by then the applied
//! concepts no longer appear in the diff.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::audit::AuditLog;
use crate::model::ConceptSearchItem;
use crate::report::{NotificationSeverity, ResultNode};
use crate::terminology::{QueryEndpoint, TerminologyGateway};
use crate::threshold::{Direction, ThresholdGuard, ACTION_NOT_CARRIED_OUT};
use crate::CONCURRENT_WORKERS;

/// Hard service limit on `offset + limit` for unsorted search results.
pub const MAX_UNSORTED_OFFSET_PLUS_PAGE_SIZE: u64 = 10_000;

/// Builds the add-candidates query: matches the formula but is not a member.
pub fn add_ecl(formula: &str, refset_id: &str) -> String {
    format!("({}) MINUS (^ {})", formula, refset_id)
}

/// Builds the remove-candidates query: is a member but no longer matches.
pub fn remove_ecl(formula: &str, refset_id: &str) -> String {
    format!("(^ {}) MINUS ({})", refset_id, formula)
}

/// Builds the inactive-member sweep: members whose concept went inactive.
pub fn inactive_ecl(refset_id: &str) -> String {
    format!("^ {} {{{{C active = 0}}}}", refset_id)
}

/// One direction's merged result window.
#[derive(Debug, Clone)]
pub struct DiffWindow {
    /// Candidates inside the unsorted window, merged in offset order.
    pub items: Vec<ConceptSearchItem>,
    /// Total matches reported by the service.
    pub total: u64,
    /// True when matches remain beyond the window; apply this window, then
    /// query again.
    pub more: bool,
}

/// Issues diff queries and merges their pages, gated by the threshold guard.
pub struct DiffEngine<'a> {
    gateway: &'a dyn TerminologyGateway,
    guard: &'a ThresholdGuard,
    audit: &'a AuditLog,
}

impl<'a> DiffEngine<'a> {
    /// Creates a diff engine over the given gateway.
    pub fn new(
        gateway: &'a dyn TerminologyGateway,
        guard: &'a ThresholdGuard,
        audit: &'a AuditLog,
    ) -> Self {
        DiffEngine {
            gateway,
            guard,
            audit,
        }
    }

    /// Runs one diff direction.
    ///
    /// Returns `None`, distinct from an empty window, when the threshold
    /// guard vetoed the change or the remote call failed; the caller must
    /// not apply anything for this direction. Failures and vetoes are
    /// recorded on `node` and in the audit log here.
    pub async fn fetch(
        &self,
        endpoint: QueryEndpoint,
        ecl: &str,
        active_only: bool,
        refset_id: &str,
        direction: Direction,
        node: &mut ResultNode,
    ) -> Option<DiffWindow> {
        let started = Instant::now();
        let first = match self
            .gateway
            .search_concepts(endpoint, ecl, active_only, 0, None)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                return self.report_failure(node, err.to_string());
            }
        };
        info!("Query took {:.3} seconds.", started.elapsed().as_secs_f64());

        if !self
            .guard
            .check_count(refset_id, direction, first.total, &first.items, node, self.audit)
        {
            return None;
        }

        // Remaining page offsets inside the unsorted window.
        let limit = first.limit.max(1);
        let mut offsets = Vec::new();
        let mut offset = first.offset;
        while first.total > offset + limit && offset + limit < MAX_UNSORTED_OFFSET_PLUS_PAGE_SIZE {
            offsets.push(offset + limit);
            offset += limit;
        }

        let pages = stream::iter(offsets.into_iter().map(|page_offset| async move {
            self.gateway
                .search_concepts(endpoint, ecl, active_only, page_offset, Some(limit))
                .await
        }))
        .buffered(CONCURRENT_WORKERS)
        .collect::<Vec<_>>()
        .await;

        let mut items = first.items;
        for page in pages {
            match page {
                Ok(mut page) => items.append(&mut page.items),
                Err(err) => {
                    return self.report_failure(node, err.to_string());
                }
            }
        }

        let more = first.total > items.len() as u64;
        Some(DiffWindow {
            items,
            total: first.total,
            more,
        })
    }

    fn report_failure(&self, node: &mut ResultNode, message: String) -> Option<DiffWindow> {
        error!("Error during REST call: {}", message);
        node.set_notification(
            NotificationSeverity::Error,
            format!("REST call failed: {}. {}", message, ACTION_NOT_CARRIED_OUT),
        );
        self.audit
            .append(&format!("### ERROR: REST call failed: {}", message));
        None
    }
}
