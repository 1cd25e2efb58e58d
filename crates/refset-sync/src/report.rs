//! Structured run report posted to the job-result sink.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Severity of a result notification.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum NotificationSeverity {
    /// The associated action was not (or could not be) carried out.
    #[serde(rename = "ERROR")]
    Error,
    /// The action was carried out; the notification is advisory.
    #[serde(rename = "WARNING")]
    Warning,
}

/// Notification attached to a result node when something noteworthy happened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultNotification {
    /// Severity of the notification.
    #[serde(rename = "type")]
    pub severity: NotificationSeverity,
    /// Human readable description.
    pub description: String,
}

/// One reported concept.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultItem {
    /// Concept id.
    pub id: String,
    /// Concept display title.
    pub title: String,
}

/// Hierarchical report entry: one per refset, with "Added Concepts" and
/// "Removed Concepts" children.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResultNode {
    /// Display name (`id |term|` pipe notation for refset nodes).
    pub name: String,
    /// Number of concepts this node covers.
    pub count: u64,
    /// The affected concepts, in diff order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ResultItem>,
    /// Notification, when a threshold was hit or a call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<ResultNotification>,
    /// Child nodes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ResultNode>,
}

impl ResultNode {
    /// Creates an empty node with the given display name.
    pub fn named(name: impl Into<String>) -> Self {
        ResultNode {
            name: name.into(),
            ..ResultNode::default()
        }
    }

    /// Replaces the node's notification.
    pub fn set_notification(&mut self, severity: NotificationSeverity, description: String) {
        self.notification = Some(ResultNotification {
            severity,
            description,
        });
    }

    /// Appends to an existing notification, or creates one with the given
    /// severity when none is present.
    pub fn append_notification(&mut self, severity: NotificationSeverity, description: String) {
        match &mut self.notification {
            Some(existing) => {
                existing.description.push_str(". ");
                existing.description.push_str(&description);
            }
            None => self.set_notification(severity, description),
        }
    }
}

/// Top-level report envelope, posted once per run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Job display name.
    pub job_name: String,
    /// Timestamp-derived job id (`yyyyMMddHHmmss`, local time).
    pub job_id: String,
    /// When the run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_time: Option<DateTime<Utc>>,
    /// Always false on creation; the sink flips it when a user acknowledges.
    pub acknowledged: bool,
    /// One node per processed refset, sorted (see [`sort_result_nodes`]).
    pub results: Vec<ResultNode>,
}

impl JobResult {
    /// Creates an empty report with a job id derived from the current local
    /// time.
    pub fn new(job_name: impl Into<String>) -> Self {
        JobResult {
            job_name: job_name.into(),
            job_id: Local::now().format("%Y%m%d%H%M%S").to_string(),
            finished_time: None,
            acknowledged: false,
            results: Vec::new(),
        }
    }

    /// Sorts the result nodes and stamps the finish time.
    pub fn finish(&mut self) {
        sort_result_nodes(&mut self.results);
        self.finished_time = Some(Utc::now());
        self.acknowledged = false;
    }
}

/// Orders result nodes by display name.
///
/// Blank names sort last. For names in `id |term|` pipe notation the term
/// portion is compared, and the sort key is the lower-cased first character
/// only; nodes sharing a first letter keep their insertion order (the sort
/// is stable).
pub fn sort_result_nodes(nodes: &mut [ResultNode]) {
    nodes.sort_by_key(|node| sort_key(&node.name));
}

fn sort_key(name: &str) -> (bool, char) {
    let portion = name.split('|').nth(1).unwrap_or(name);
    match portion.trim().chars().next() {
        Some(c) => (false, c.to_lowercase().next().unwrap_or(c)),
        None => (true, ' '),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[ResultNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_sort_uses_term_portion_of_pipe_notation() {
        let mut nodes = vec![
            ResultNode::named("111 |Zebra refset|"),
            ResultNode::named("999 |Asthma refset|"),
        ];
        sort_result_nodes(&mut nodes);
        assert_eq!(names(&nodes), vec!["999 |Asthma refset|", "111 |Zebra refset|"]);
    }

    #[test]
    fn test_sort_key_is_first_character_only() {
        // Same first letter: a full alphabetical sort would swap these, the
        // single-character key keeps insertion order.
        let mut nodes = vec![
            ResultNode::named("1 |Sz refset|"),
            ResultNode::named("2 |Sa refset|"),
        ];
        sort_result_nodes(&mut nodes);
        assert_eq!(names(&nodes), vec!["1 |Sz refset|", "2 |Sa refset|"]);
    }

    #[test]
    fn test_sort_is_case_insensitive() {
        let mut nodes = vec![
            ResultNode::named("1 |zebra|"),
            ResultNode::named("2 |Apple|"),
        ];
        sort_result_nodes(&mut nodes);
        assert_eq!(names(&nodes), vec!["2 |Apple|", "1 |zebra|"]);
    }

    #[test]
    fn test_blank_names_sort_last() {
        let mut nodes = vec![
            ResultNode::named(""),
            ResultNode::named("1 |Beta|"),
        ];
        sort_result_nodes(&mut nodes);
        assert_eq!(names(&nodes), vec!["1 |Beta|", ""]);
    }

    #[test]
    fn test_name_without_pipes_compares_whole_name() {
        let mut nodes = vec![
            ResultNode::named("zulu"),
            ResultNode::named("alpha"),
        ];
        sort_result_nodes(&mut nodes);
        assert_eq!(names(&nodes), vec!["alpha", "zulu"]);
    }

    #[test]
    fn test_append_notification_keeps_existing_severity() {
        let mut node = ResultNode::named("x");
        node.set_notification(NotificationSeverity::Error, "first".to_string());
        node.append_notification(NotificationSeverity::Warning, "second".to_string());
        let notification = node.notification.unwrap();
        assert_eq!(notification.severity, NotificationSeverity::Error);
        assert_eq!(notification.description, "first. second");
    }

    #[test]
    fn test_job_result_serializes_camel_case() {
        let mut job = JobResult::new("ECL Refset Job");
        job.results.push(ResultNode::named("1 |A|"));
        job.finish();
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["jobName"], "ECL Refset Job");
        assert_eq!(json["acknowledged"], false);
        assert!(json["finishedTime"].is_string());
        assert_eq!(json["jobId"].as_str().unwrap().len(), 14);
    }
}
