//! Batch submission with asynchronous completion polling.

use std::time::Duration;

use tracing::{error, info};

use crate::error::{SyncError, SyncResult};
use crate::model::{BulkJobStatus, ChangeRecord};
use crate::terminology::TerminologyGateway;

/// Interval between bulk job status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Submits change-record batches and waits for the bulk job to finish.
pub struct BulkSubmitter<'a> {
    gateway: &'a dyn TerminologyGateway,
    poll_interval: Duration,
}

impl<'a> BulkSubmitter<'a> {
    /// Creates a submitter polling at the standard interval.
    pub fn new(gateway: &'a dyn TerminologyGateway) -> Self {
        BulkSubmitter {
            gateway,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Submits one batch and polls until the bulk job reaches a terminal
    /// state. An empty batch is a no-op.
    ///
    /// COMPLETED returns normally; FAILED is a hard error carrying the
    /// remote message; anything else keeps polling. There is no poll
    /// timeout; an in-flight job is waited on until the service reports a
    /// terminal status.
    pub async fn submit_and_wait(&self, records: &[ChangeRecord]) -> SyncResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let job_id = self.gateway.submit_bulk(records).await?;

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let state = self.gateway.bulk_status(&job_id).await?;
            match state.status {
                BulkJobStatus::Completed => {
                    info!(
                        "bulk update with id:{} COMPLETED in {}",
                        job_id,
                        format_seconds(state.seconds_duration)
                    );
                    return Ok(());
                }
                BulkJobStatus::Failed => {
                    let message = state
                        .message
                        .unwrap_or_else(|| "no failure message supplied".to_string());
                    info!(
                        "bulk update with id:{} FAILED in {}",
                        job_id,
                        format_seconds(state.seconds_duration)
                    );
                    error!("error message:{}", message);
                    return Err(SyncError::BulkUpdateFailed { job_id, message });
                }
                BulkJobStatus::Running | BulkJobStatus::Other => {}
            }
        }
    }
}

fn format_seconds(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) => format!("{}s", s),
        None => "unknown time".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::model::{BulkJobState, ConceptSearchPage, RefsetMemberPage};
    use crate::terminology::{MemberQuery, QueryEndpoint};

    /// Gateway stub that serves a scripted sequence of bulk job states.
    struct ScriptedGateway {
        submissions: Mutex<Vec<Vec<ChangeRecord>>>,
        states: Mutex<Vec<BulkJobState>>,
    }

    impl ScriptedGateway {
        fn new(states: Vec<BulkJobState>) -> Self {
            ScriptedGateway {
                submissions: Mutex::new(Vec::new()),
                states: Mutex::new(states),
            }
        }

        fn submission_count(&self) -> usize {
            self.submissions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TerminologyGateway for ScriptedGateway {
        async fn search_concepts(
            &self,
            _endpoint: QueryEndpoint,
            _ecl: &str,
            _active_only: bool,
            _offset: u64,
            _limit: Option<u64>,
        ) -> SyncResult<ConceptSearchPage> {
            unreachable!("not used by the bulk submitter")
        }

        async fn search_members(&self, _query: MemberQuery) -> SyncResult<RefsetMemberPage> {
            unreachable!("not used by the bulk submitter")
        }

        async fn submit_bulk(&self, records: &[ChangeRecord]) -> SyncResult<String> {
            self.submissions.lock().unwrap().push(records.to_vec());
            Ok("job-1".to_string())
        }

        async fn bulk_status(&self, _job_id: &str) -> SyncResult<BulkJobState> {
            Ok(self.states.lock().unwrap().remove(0))
        }
    }

    fn record() -> ChangeRecord {
        ChangeRecord {
            active: true,
            referenced_component_id: "73211009".to_string(),
            refset_id: "700043003".to_string(),
            module_id: "32506021000036107".to_string(),
            member_id: None,
        }
    }

    fn state(status: BulkJobStatus) -> BulkJobState {
        BulkJobState {
            status,
            seconds_duration: Some(1.0),
            message: match status {
                BulkJobStatus::Failed => Some("member row is locked".to_string()),
                _ => None,
            },
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let gateway = ScriptedGateway::new(vec![]);
        let submitter = BulkSubmitter::new(&gateway).with_poll_interval(Duration::ZERO);
        submitter.submit_and_wait(&[]).await.unwrap();
        assert_eq!(gateway.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_polls_through_running_to_completed() {
        let gateway = ScriptedGateway::new(vec![
            state(BulkJobStatus::Running),
            state(BulkJobStatus::Running),
            state(BulkJobStatus::Completed),
        ]);
        let submitter = BulkSubmitter::new(&gateway).with_poll_interval(Duration::ZERO);
        submitter.submit_and_wait(&[record()]).await.unwrap();
        assert_eq!(gateway.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_status_keeps_polling() {
        let gateway = ScriptedGateway::new(vec![
            state(BulkJobStatus::Other),
            state(BulkJobStatus::Completed),
        ]);
        let submitter = BulkSubmitter::new(&gateway).with_poll_interval(Duration::ZERO);
        submitter.submit_and_wait(&[record()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_job_is_a_hard_error() {
        let gateway = ScriptedGateway::new(vec![state(BulkJobStatus::Failed)]);
        let submitter = BulkSubmitter::new(&gateway).with_poll_interval(Duration::ZERO);
        let err = submitter.submit_and_wait(&[record()]).await.unwrap_err();
        match err {
            SyncError::BulkUpdateFailed { job_id, message } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(message, "member row is locked");
            }
            other => panic!("expected BulkUpdateFailed, got {:?}", other),
        }
    }
}
