//! Process registry and job-result sink.
//!
//! Two small calls against the ticket-tracking application: a lookup that
//! tells the run whether it is enabled at all, and the final POST of the
//! structured job result.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::StatusCode;

use crate::auth::SessionCookie;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::ExternalProcess;
use crate::report::JobResult;

/// Gateway to the process registry and job-result sink.
#[async_trait]
pub trait ProcessGateway: Send + Sync {
    /// Looks up an external process registration by name.
    async fn find_process(&self, name: &str) -> SyncResult<Option<ExternalProcess>>;

    /// Posts the finished job result; the sink responds 201 on success.
    async fn post_job_result(&self, job_result: &JobResult) -> SyncResult<()>;
}

/// HTTP implementation of [`ProcessGateway`].
pub struct LingoClient {
    http: reqwest::Client,
    base: String,
}

impl LingoClient {
    /// Builds a client authenticated with the given session cookie.
    pub fn new(config: &SyncConfig, cookie: &SessionCookie) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        let header = HeaderValue::from_str(&format!("{}={}", cookie.name, cookie.value))
            .map_err(|_| {
                SyncError::UnexpectedResponse("session cookie is not a valid header value".into())
            })?;
        headers.insert(COOKIE, header);

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(LingoClient {
            http,
            base: config.lingo_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProcessGateway for LingoClient {
    async fn find_process(&self, name: &str) -> SyncResult<Option<ExternalProcess>> {
        let url = format!("{}/api/tickets/externalProcesses", self.base);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let processes: Vec<ExternalProcess> = response.json().await?;
        Ok(processes.into_iter().find(|p| p.process_name == name))
    }

    async fn post_job_result(&self, job_result: &JobResult) -> SyncResult<()> {
        let url = format!("{}/api/tickets/jobResults", self.base);
        let response = self.http.post(&url).json(job_result).send().await?;
        if response.status() != StatusCode::CREATED {
            return Err(SyncError::UnexpectedResponse(format!(
                "job result sink returned {} instead of 201",
                response.status()
            )));
        }
        Ok(())
    }
}
