//! Run orchestrator: sequences resolution, diffing, record building and
//! batch submission across every refset in the governing list.
//!
//! Refsets are processed one at a time (bounded load on the terminology
//! service, deterministic result ordering) with bounded worker pools
//! inside each refset's pagination and record-building steps. Within one
//! refset, additions are fully submitted before removals begin.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::audit::AuditLog;
use crate::bulk::{BulkSubmitter, POLL_INTERVAL};
use crate::config::SyncConfig;
use crate::diff::{self, DiffEngine, DiffWindow};
use crate::error::SyncResult;
use crate::lingo::ProcessGateway;
use crate::model::{ConceptSearchItem, RefsetDefinition};
use crate::records::RecordBuilder;
use crate::report::{JobResult, NotificationSeverity, ResultItem, ResultNode};
use crate::resolver::DependencyResolver;
use crate::terminology::{MemberQuery, QueryEndpoint, TerminologyGateway};
use crate::threshold::{Direction, ThresholdGuard, ACTION_NOT_CARRIED_OUT};

/// Display name of the posted job result.
pub const JOB_NAME: &str = "ECL Refset Job";

/// Section separator used in run logs.
pub const LOG_SEPARATOR_LINE: &str =
    "### ---------------------------------------------------------";

/// How applying one direction of one refset ended.
enum DirectionOutcome {
    /// Every window was built and submitted.
    Applied,
    /// Record building or submission failed; the message belongs on a
    /// result notification.
    Failed(String),
    /// A re-fetch inside the paging loop was vetoed or failed; the fetch
    /// already recorded why.
    Stopped,
}

/// Drives one whole reconciliation run.
pub struct RunOrchestrator<'a> {
    config: &'a SyncConfig,
    gateway: &'a dyn TerminologyGateway,
    lingo: &'a dyn ProcessGateway,
    guard: ThresholdGuard,
    audit: AuditLog,
    poll_interval: Duration,
}

impl<'a> RunOrchestrator<'a> {
    /// Creates an orchestrator over the given collaborators.
    pub fn new(
        config: &'a SyncConfig,
        gateway: &'a dyn TerminologyGateway,
        lingo: &'a dyn ProcessGateway,
    ) -> Self {
        RunOrchestrator {
            config,
            gateway,
            lingo,
            guard: ThresholdGuard::from_config(config),
            audit: AuditLog::new(&config.audit_log_path),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the bulk status poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs the reconciliation: enablement gate, dependency resolution, one
    /// add-then-remove pass per refset, then the sorted job result post.
    ///
    /// Configuration and data errors (invalid or circular ECL) abort the
    /// run; per-refset remote failures are recorded on the refset's result
    /// node and the remaining refsets still process.
    pub async fn run(&self) -> SyncResult<()> {
        match self.lingo.find_process(&self.config.process_name).await? {
            None => {
                error!(
                    "no corresponding process registration found for {}",
                    self.config.process_name
                );
                return Ok(());
            }
            Some(process) if !process.enabled => {
                error!(
                    "process {} is registered but has intentionally been disabled",
                    process.process_name
                );
                return Ok(());
            }
            Some(process) => {
                info!("process {} is registered and enabled", process.process_name);
            }
        }

        let listed = self.load_definitions().await?;
        let definitions: BTreeMap<String, RefsetDefinition> = listed
            .iter()
            .map(|definition| (definition.refset_id.clone(), definition.clone()))
            .collect();
        let effective = DependencyResolver::new(&definitions).resolve()?;

        let mut job_result = JobResult::new(JOB_NAME);
        for definition in &listed {
            let Some(formula) = effective.get(&definition.refset_id) else {
                continue;
            };
            let node = self.process_refset(definition, formula).await;
            job_result.results.push(node);
        }

        info!("{}", LOG_SEPARATOR_LINE);
        job_result.finish();
        self.lingo.post_job_result(&job_result).await?;
        Ok(())
    }

    /// Reads the governing refset's membership, one definition per member.
    async fn load_definitions(&self) -> SyncResult<Vec<RefsetDefinition>> {
        let mut query = MemberQuery::all_of(&self.config.query_refset_id);
        let mut page = self.gateway.search_members(query.clone()).await?;
        let mut members = std::mem::take(&mut page.items);
        while page.limit > 0 && page.total > page.offset + page.limit {
            query.offset = page.offset + page.limit;
            let mut next = self.gateway.search_members(query.clone()).await?;
            members.append(&mut next.items);
            page.offset = next.offset;
            page.limit = next.limit;
            page.total = next.total;
        }

        let mut listed = Vec::new();
        for member in members {
            let formula = member
                .additional_fields
                .as_ref()
                .and_then(|fields| fields.query.clone());
            let Some(formula) = formula else {
                warn!(
                    "governing refset member {} carries no query; skipped",
                    member.referenced_component.concept_id
                );
                continue;
            };
            listed.push(RefsetDefinition {
                refset_id: member.referenced_component.concept_id.clone(),
                term: member
                    .referenced_component
                    .pt
                    .as_ref()
                    .map(|pt| pt.term.clone())
                    .unwrap_or_default(),
                module_id: member.module_id.clone(),
                formula: format!("({})", formula),
            });
        }

        info!(
            "Found {} members of the ECL refset ({}) to process which are {}",
            listed.len(),
            self.config.query_refset_id,
            listed
                .iter()
                .map(|definition| definition.refset_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(listed)
    }

    /// Current active member count of a refset, fetched once per refset.
    async fn member_total(&self, refset_id: &str) -> SyncResult<u64> {
        let page = self
            .gateway
            .search_members(MemberQuery {
                reference_set: refset_id.to_string(),
                referenced_component_id: None,
                active: Some(true),
                offset: 0,
                limit: Some(1),
            })
            .await?;
        Ok(page.total)
    }

    /// Processes one refset: additions first, then removals unless the add
    /// direction was vetoed. Never fails the run; failures become
    /// notifications on the returned node.
    async fn process_refset(
        &self,
        definition: &RefsetDefinition,
        effective_formula: &str,
    ) -> ResultNode {
        let mut node =
            ResultNode::named(format!("{} |{}|", definition.refset_id, definition.term));
        let mut add_node = ResultNode::named("Added Concepts");
        let mut remove_node = ResultNode::named("Removed Concepts");

        let formula = format!("({})", effective_formula);
        let add_query = diff::add_ecl(&formula, &definition.refset_id);
        let remove_query = diff::remove_ecl(&formula, &definition.refset_id);
        let inactive_query = diff::inactive_ecl(&definition.refset_id);

        info!("### Processing refsetId: {}", definition.refset_id);
        info!("### ECL:{}", formula);
        info!("### Processing for additions");
        info!("{}", LOG_SEPARATOR_LINE);

        let engine = DiffEngine::new(self.gateway, &self.guard, &self.audit);

        let member_total = match self.member_total(&definition.refset_id).await {
            Ok(total) => total,
            Err(err) => {
                error!(
                    "failed to read member count for refset {}: {}",
                    definition.refset_id, err
                );
                node.set_notification(
                    NotificationSeverity::Error,
                    format!("REST call failed: {}. {}", err, ACTION_NOT_CARRIED_OUT),
                );
                node.results.push(add_node);
                node.results.push(remove_node);
                return node;
            }
        };

        let mut add_vetoed = false;
        match engine
            .fetch(
                QueryEndpoint::Performance,
                &add_query,
                true,
                &definition.refset_id,
                Direction::Add,
                &mut add_node,
            )
            .await
        {
            None => add_vetoed = true,
            Some(window) => {
                self.guard.log_percent(
                    &definition.refset_id,
                    Direction::Add,
                    window.total,
                    member_total,
                    &mut add_node,
                    &self.audit,
                );
                add_node.count = window.total;
                add_node.items = result_items(&window.items);

                if let DirectionOutcome::Failed(message) = self
                    .apply_paged(
                        &engine,
                        definition,
                        QueryEndpoint::Performance,
                        &add_query,
                        true,
                        Direction::Add,
                        window,
                        &mut add_node,
                    )
                    .await
                {
                    node.set_notification(NotificationSeverity::Error, message);
                }
            }
        }

        info!("{}", LOG_SEPARATOR_LINE);

        if !add_vetoed {
            info!("### Processing for removals");
            info!("{}", LOG_SEPARATOR_LINE);

            let remove_window = engine
                .fetch(
                    QueryEndpoint::Performance,
                    &remove_query,
                    true,
                    &definition.refset_id,
                    Direction::Remove,
                    &mut remove_node,
                )
                .await;
            let inactive_window = engine
                .fetch(
                    QueryEndpoint::Main,
                    &inactive_query,
                    false,
                    &definition.refset_id,
                    Direction::Remove,
                    &mut remove_node,
                )
                .await;

            let total_to_remove = remove_window.as_ref().map(|w| w.total).unwrap_or(0)
                + inactive_window.as_ref().map(|w| w.total).unwrap_or(0);
            remove_node.count = total_to_remove;

            self.guard.log_percent(
                &definition.refset_id,
                Direction::Remove,
                total_to_remove,
                member_total,
                &mut node,
                &self.audit,
            );

            if let Some(window) = remove_window {
                remove_node.items.extend(result_items(&window.items));
                if let DirectionOutcome::Failed(message) = self
                    .apply_paged(
                        &engine,
                        definition,
                        QueryEndpoint::Performance,
                        &remove_query,
                        true,
                        Direction::Remove,
                        window,
                        &mut remove_node,
                    )
                    .await
                {
                    remove_node.set_notification(NotificationSeverity::Error, message);
                }
            }

            if let Some(window) = inactive_window {
                remove_node.items.extend(result_items(&window.items));
                if let DirectionOutcome::Failed(message) = self
                    .apply_paged(
                        &engine,
                        definition,
                        QueryEndpoint::Main,
                        &inactive_query,
                        false,
                        Direction::Remove,
                        window,
                        &mut remove_node,
                    )
                    .await
                {
                    remove_node.set_notification(NotificationSeverity::Error, message);
                }
            }

            info!("{}", LOG_SEPARATOR_LINE);
            info!("###");

            node.count = add_node.count + remove_node.count;
        }

        node.results.push(add_node);
        node.results.push(remove_node);
        node
    }

    /// Builds and submits one direction's windows until the diff no longer
    /// overflows the unsorted window. Later windows' items are appended to
    /// `diff_node` as they arrive.
    #[allow(clippy::too_many_arguments)]
    async fn apply_paged(
        &self,
        engine: &DiffEngine<'_>,
        definition: &RefsetDefinition,
        endpoint: QueryEndpoint,
        ecl: &str,
        active_only: bool,
        direction: Direction,
        mut window: DiffWindow,
        diff_node: &mut ResultNode,
    ) -> DirectionOutcome {
        let builder = RecordBuilder::new(self.gateway);
        let submitter = BulkSubmitter::new(self.gateway).with_poll_interval(self.poll_interval);

        loop {
            let built = match direction {
                Direction::Add => builder.build_additions(definition, &window.items).await,
                Direction::Remove => builder.build_removals(definition, &window.items).await,
            };
            let records = match built {
                Ok(records) => records,
                Err(err) => {
                    error!(
                        "failed to build change records for refset {}: {}",
                        definition.refset_id, err
                    );
                    return DirectionOutcome::Failed(format!(
                        "Error posting update to refset: {}. {}",
                        definition.refset_id, ACTION_NOT_CARRIED_OUT
                    ));
                }
            };

            if let Err(err) = submitter.submit_and_wait(&records).await {
                error!(
                    "bulk update failed for refset {}: {}",
                    definition.refset_id, err
                );
                return DirectionOutcome::Failed(format!(
                    "Error posting update to refset: {}. {}",
                    definition.refset_id, ACTION_NOT_CARRIED_OUT
                ));
            }

            if !window.more {
                return DirectionOutcome::Applied;
            }

            match engine
                .fetch(
                    endpoint,
                    ecl,
                    active_only,
                    &definition.refset_id,
                    direction,
                    diff_node,
                )
                .await
            {
                Some(next) => {
                    diff_node.items.extend(result_items(&next.items));
                    window = next;
                }
                None => return DirectionOutcome::Stopped,
            }
        }
    }
}

fn result_items(items: &[ConceptSearchItem]) -> Vec<ResultItem> {
    items
        .iter()
        .map(|item| ResultItem {
            id: item.id.clone(),
            title: item.fsn_term().to_string(),
        })
        .collect()
}
