//! Concurrent change-record construction.
//!
//! Every diff candidate needs one member lookup before its change record can
//! be built: add candidates may be reactivations of a previously retired row,
//! and remove candidates need their member row id. The lookups are
//! independent, so each page is dispatched across a bounded worker pool; the
//! page's records are only handed to the batch submitter once every worker
//! has finished, and the first lookup error is propagated after that.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::SyncResult;
use crate::model::{ChangeRecord, ConceptSearchItem, RefsetDefinition};
use crate::terminology::{MemberQuery, TerminologyGateway};
use crate::CONCURRENT_WORKERS;

/// Builds change records for diff candidates.
pub struct RecordBuilder<'a> {
    gateway: &'a dyn TerminologyGateway,
}

impl<'a> RecordBuilder<'a> {
    /// Creates a record builder over the given gateway.
    pub fn new(gateway: &'a dyn TerminologyGateway) -> Self {
        RecordBuilder { gateway }
    }

    /// Builds creation or reactivation records for one page of add
    /// candidates.
    pub async fn build_additions(
        &self,
        definition: &RefsetDefinition,
        items: &[ConceptSearchItem],
    ) -> SyncResult<Vec<ChangeRecord>> {
        let results = stream::iter(
            items
                .iter()
                .map(|item| self.addition_record(definition, item)),
        )
        .buffer_unordered(CONCURRENT_WORKERS)
        .collect::<Vec<_>>()
        .await;

        collect_all(results)
    }

    /// Builds retiral records for one page of remove candidates.
    pub async fn build_removals(
        &self,
        definition: &RefsetDefinition,
        items: &[ConceptSearchItem],
    ) -> SyncResult<Vec<ChangeRecord>> {
        let results = stream::iter(
            items
                .iter()
                .map(|item| self.retiral_record(definition, item)),
        )
        .buffer_unordered(CONCURRENT_WORKERS)
        .collect::<Vec<_>>()
        .await;

        Ok(collect_all(results)?.into_iter().flatten().collect())
    }

    /// One add candidate: reactivate the retired row if one exists, create a
    /// fresh membership otherwise. Reactivation needs no member id; the bulk
    /// endpoint matches on (refsetId, referencedComponentId).
    async fn addition_record(
        &self,
        definition: &RefsetDefinition,
        item: &ConceptSearchItem,
    ) -> SyncResult<ChangeRecord> {
        let existing = self
            .gateway
            .search_members(MemberQuery::component_row(
                &definition.refset_id,
                &item.concept_id,
                false,
            ))
            .await?;

        if existing.total > 0 {
            info!(
                "### Will reactivate referencedComponentId {} (active={})",
                item.id_and_fsn(),
                item.active
            );
        } else {
            info!(
                "### Will add referencedComponentId {} (active={})",
                item.id_and_fsn(),
                item.active
            );
        }

        Ok(ChangeRecord {
            active: true,
            referenced_component_id: item.concept_id.clone(),
            refset_id: definition.refset_id.clone(),
            module_id: definition.module_id.clone(),
            member_id: None,
        })
    }

    /// One remove candidate: retire its active member row. A row that has
    /// vanished since the diff ran is skipped with a warning.
    async fn retiral_record(
        &self,
        definition: &RefsetDefinition,
        item: &ConceptSearchItem,
    ) -> SyncResult<Option<ChangeRecord>> {
        let existing = self
            .gateway
            .search_members(MemberQuery::component_row(
                &definition.refset_id,
                &item.concept_id,
                true,
            ))
            .await?;

        let member_id = existing
            .items
            .into_iter()
            .next()
            .and_then(|member| member.member_id);

        match member_id {
            Some(member_id) => {
                info!(
                    "### Will remove referencedComponentId {} (active={})",
                    item.id_and_fsn(),
                    item.active
                );
                Ok(Some(ChangeRecord {
                    active: false,
                    referenced_component_id: item.concept_id.clone(),
                    refset_id: definition.refset_id.clone(),
                    module_id: definition.module_id.clone(),
                    member_id: Some(member_id),
                }))
            }
            None => {
                warn!(
                    "no active member row found for {} in refset {}; skipping retiral",
                    item.concept_id, definition.refset_id
                );
                Ok(None)
            }
        }
    }
}

/// Waits for every result, then propagates the first error.
fn collect_all<T>(results: Vec<SyncResult<T>>) -> SyncResult<Vec<T>> {
    let mut collected = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(value) => collected.push(value),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(collected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_collect_all_returns_everything_on_success() {
        let results: Vec<SyncResult<u32>> = vec![Ok(1), Ok(2), Ok(3)];
        assert_eq!(collect_all(results).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_collect_all_propagates_first_error_after_draining() {
        let results: Vec<SyncResult<u32>> = vec![
            Ok(1),
            Err(SyncError::MissingDefinition("a".to_string())),
            Err(SyncError::MissingDefinition("b".to_string())),
        ];
        let err = collect_all(results).unwrap_err();
        assert!(matches!(err, SyncError::MissingDefinition(id) if id == "a"));
    }
}
