//! Snowstorm terminology client.
//!
//! Implements [`TerminologyGateway`] over HTTP. Query URLs are assembled by
//! hand with pre-encoded ECL: the set-operator and description-filter
//! characters (`^`, `{{ }}`) need literal percent encoding, and spaces must
//! become `%20` rather than the `+` of form encoding, so generic query-string
//! encoding is deliberately bypassed.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, LOCATION};

use crate::auth::SessionCookie;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::{BulkJobState, ChangeRecord, ConceptSearchPage, RefsetMemberPage};
use crate::terminology::{MemberQuery, QueryEndpoint, TerminologyGateway};

/// Characters left unescaped when encoding ECL into a query string; matches
/// what `URLEncoder` leaves alone, with spaces as `%20` instead of `+`.
const ECL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

/// Percent-encodes an ECL expression for use as an `ecl=` query value.
pub fn encode_ecl(ecl: &str) -> String {
    utf8_percent_encode(ecl, ECL_ENCODE_SET).to_string()
}

/// HTTP client for the Snowstorm terminology service.
///
/// The session cookie from the identity service is attached to every request
/// through the client's default headers.
pub struct SnowstormClient {
    http: reqwest::Client,
    performance_base: String,
    main_base: String,
    branch: String,
}

impl SnowstormClient {
    /// Builds a client for the configured endpoints, authenticated with the
    /// given session cookie.
    pub fn new(config: &SyncConfig, cookie: &SessionCookie) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        let header = HeaderValue::from_str(&format!("{}={}", cookie.name, cookie.value))
            .map_err(|_| {
                SyncError::UnexpectedResponse("session cookie is not a valid header value".into())
            })?;
        headers.insert(COOKIE, header);

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(SnowstormClient {
            http,
            performance_base: config.performance_terminology_url.trim_end_matches('/').to_string(),
            main_base: config.main_terminology_url.trim_end_matches('/').to_string(),
            branch: config.encoded_branch(),
        })
    }

    fn base(&self, endpoint: QueryEndpoint) -> &str {
        match endpoint {
            QueryEndpoint::Performance => &self.performance_base,
            QueryEndpoint::Main => &self.main_base,
        }
    }

    fn concepts_url(
        &self,
        endpoint: QueryEndpoint,
        ecl: &str,
        active_only: bool,
        offset: u64,
        limit: Option<u64>,
    ) -> String {
        let mut url = format!(
            "{}/{}/concepts?ecl={}",
            self.base(endpoint),
            self.branch,
            encode_ecl(ecl)
        );
        if active_only {
            url.push_str("&activeFilter=true");
        }
        url.push_str("&includeLeafFlag=false&form=inferred");
        url.push_str(&format!("&offset={}", offset));
        if let Some(limit) = limit {
            url.push_str(&format!("&limit={}", limit));
        }
        url
    }

    fn members_url(&self, query: &MemberQuery) -> String {
        let mut url = format!(
            "{}/{}/members?referenceSet={}",
            self.performance_base, self.branch, query.reference_set
        );
        if let Some(component_id) = &query.referenced_component_id {
            url.push_str(&format!("&referencedComponentId={}", component_id));
        }
        if let Some(active) = query.active {
            url.push_str(&format!("&active={}", active));
        }
        url.push_str(&format!("&offset={}", query.offset));
        if let Some(limit) = query.limit {
            url.push_str(&format!("&limit={}", limit));
        }
        url
    }
}

#[async_trait]
impl TerminologyGateway for SnowstormClient {
    async fn search_concepts(
        &self,
        endpoint: QueryEndpoint,
        ecl: &str,
        active_only: bool,
        offset: u64,
        limit: Option<u64>,
    ) -> SyncResult<ConceptSearchPage> {
        let url = self.concepts_url(endpoint, ecl, active_only, offset, limit);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn search_members(&self, query: MemberQuery) -> SyncResult<RefsetMemberPage> {
        let url = self.members_url(&query);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn submit_bulk(&self, records: &[ChangeRecord]) -> SyncResult<String> {
        let url = format!("{}/{}/members/bulk", self.performance_base, self.branch);
        let response = self
            .http
            .post(&url)
            .json(&records)
            .send()
            .await?
            .error_for_status()?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                SyncError::UnexpectedResponse(
                    "bulk update response did not carry a Location header".into(),
                )
            })?;
        let job_id = location.rsplit('/').next().unwrap_or(location);
        Ok(job_id.to_string())
    }

    async fn bulk_status(&self, job_id: &str) -> SyncResult<BulkJobState> {
        let url = format!(
            "{}/{}/members/bulk/{}",
            self.performance_base, self.branch, job_id
        );
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ecl_spaces_become_percent_20() {
        assert_eq!(encode_ecl("^ 700043003"), "%5E%20700043003");
    }

    #[test]
    fn test_encode_ecl_description_filter() {
        assert_eq!(
            encode_ecl("^ 1 {{C active = 0}}"),
            "%5E%201%20%7B%7BC%20active%20%3D%200%7D%7D"
        );
    }

    #[test]
    fn test_encode_ecl_keeps_unreserved_characters() {
        assert_eq!(encode_ecl("a-b_c.d*e"), "a-b_c.d*e");
    }

    #[test]
    fn test_encode_ecl_parentheses_and_operators() {
        assert_eq!(
            encode_ecl("(<< 404684003) MINUS (^ 700043003)"),
            "%28%3C%3C%20404684003%29%20MINUS%20%28%5E%20700043003%29"
        );
    }
}
