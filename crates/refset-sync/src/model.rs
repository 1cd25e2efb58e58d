//! Wire types for the terminology service and the change records built from
//! its responses.

use serde::{Deserialize, Serialize};

/// A concept description (FSN or preferred term).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    /// The description term.
    pub term: String,
}

/// One concept returned by an ECL concept search, i.e. a diff candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSearchItem {
    /// Component id of the concept.
    pub id: String,
    /// The concept id (same value as `id` for concepts).
    pub concept_id: String,
    /// Whether the concept is active in the terminology.
    #[serde(default)]
    pub active: bool,
    /// Fully specified name.
    #[serde(default)]
    pub fsn: Option<Description>,
    /// Preferred term.
    #[serde(default)]
    pub pt: Option<Description>,
}

impl ConceptSearchItem {
    /// The FSN term, or an empty string when the service omitted it.
    pub fn fsn_term(&self) -> &str {
        self.fsn.as_ref().map(|d| d.term.as_str()).unwrap_or("")
    }

    /// `conceptId |fsn|` for log lines.
    pub fn id_and_fsn(&self) -> String {
        format!("{} |{}|", self.concept_id, self.fsn_term())
    }
}

/// One page of an ECL concept search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSearchPage {
    /// Concepts on this page.
    #[serde(default)]
    pub items: Vec<ConceptSearchItem>,
    /// Total matches for the whole query.
    pub total: u64,
    /// Offset of this page.
    pub offset: u64,
    /// Page size the service applied.
    pub limit: u64,
}

/// The component a refset member points at.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencedComponent {
    /// The referenced concept id.
    pub concept_id: String,
    /// Preferred term of the referenced concept.
    #[serde(default)]
    pub pt: Option<Description>,
}

/// Extra per-member fields; query-type refsets carry the ECL formula here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalFields {
    /// The ECL membership formula of a query refset member.
    #[serde(default)]
    pub query: Option<String>,
}

/// One reference set member row.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefsetMember {
    /// The member row id (UUID).
    #[serde(default)]
    pub member_id: Option<String>,
    /// The refset this row belongs to.
    pub refset_id: String,
    /// Module the row is maintained in.
    pub module_id: String,
    /// Whether the membership is active.
    pub active: bool,
    /// The member concept.
    pub referenced_component: ReferencedComponent,
    /// Additional per-member fields (query refsets carry the formula).
    #[serde(default)]
    pub additional_fields: Option<AdditionalFields>,
}

/// One page of a refset member search.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefsetMemberPage {
    /// Member rows on this page.
    #[serde(default)]
    pub items: Vec<RefsetMember>,
    /// Total matches for the whole query.
    pub total: u64,
    /// Offset of this page.
    pub offset: u64,
    /// Page size the service applied.
    pub limit: u64,
}

/// One member mutation inside a bulk change.
///
/// `member_id` is present only on retirals: the bulk endpoint creates or
/// reactivates by (refsetId, referencedComponentId), but retiring needs the
/// existing row id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Target active state of the membership.
    pub active: bool,
    /// The member concept id.
    pub referenced_component_id: String,
    /// The refset being changed.
    pub refset_id: String,
    /// Module to record the change in (from the refset definition).
    pub module_id: String,
    /// Existing member row id, for retirals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
}

/// Status of an asynchronous bulk member change.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum BulkJobStatus {
    /// Still running; keep polling.
    #[serde(rename = "RUNNING")]
    Running,
    /// Terminal success.
    #[serde(rename = "COMPLETED")]
    Completed,
    /// Terminal failure.
    #[serde(rename = "FAILED")]
    Failed,
    /// Any other status value; treated as still in flight.
    #[serde(other)]
    Other,
}

/// State of a bulk job as reported by the status endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJobState {
    /// Current status.
    pub status: BulkJobStatus,
    /// Elapsed seconds, present once the job has run.
    #[serde(default)]
    pub seconds_duration: Option<f64>,
    /// Failure message, present on FAILED jobs.
    #[serde(default)]
    pub message: Option<String>,
}

/// An externally registered process toggle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalProcess {
    /// Registered process name.
    pub process_name: String,
    /// Whether the process is allowed to run.
    pub enabled: bool,
}

/// One formula driven refset, read from the governing refset-of-refsets.
///
/// Immutable for the run once loaded; `formula` is stored parenthesised so it
/// substitutes cleanly into other formulas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefsetDefinition {
    /// The refset concept id.
    pub refset_id: String,
    /// Display term of the refset concept.
    pub term: String,
    /// Module the refset's members are maintained in.
    pub module_id: String,
    /// The parenthesised ECL membership formula.
    pub formula: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_page_deserializes_snowstorm_payload() {
        let payload = r#"{
            "items": [
                {"id": "73211009", "conceptId": "73211009", "active": true,
                 "fsn": {"term": "Diabetes mellitus (disorder)", "lang": "en"},
                 "pt": {"term": "Diabetes mellitus", "lang": "en"}}
            ],
            "total": 1, "offset": 0, "limit": 50
        }"#;
        let page: ConceptSearchPage = serde_json::from_str(payload).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].concept_id, "73211009");
        assert_eq!(page.items[0].fsn_term(), "Diabetes mellitus (disorder)");
    }

    #[test]
    fn test_member_page_carries_query_field() {
        let payload = r#"{
            "items": [
                {"memberId": "c0e0f3c2-0000-0000-0000-000000000000",
                 "refsetId": "900000000000513000",
                 "moduleId": "32506021000036107",
                 "active": true,
                 "referencedComponent": {"conceptId": "32570271000036106",
                                         "pt": {"term": "Emergency department reference set"}},
                 "additionalFields": {"query": "^ 32570071000036102"}}
            ],
            "total": 1, "offset": 0, "limit": 50
        }"#;
        let page: RefsetMemberPage = serde_json::from_str(payload).unwrap();
        let member = &page.items[0];
        assert_eq!(
            member.additional_fields.as_ref().unwrap().query.as_deref(),
            Some("^ 32570071000036102")
        );
        assert_eq!(member.referenced_component.concept_id, "32570271000036106");
    }

    #[test]
    fn test_change_record_omits_absent_member_id() {
        let record = ChangeRecord {
            active: true,
            referenced_component_id: "73211009".to_string(),
            refset_id: "32570271000036106".to_string(),
            module_id: "32506021000036107".to_string(),
            member_id: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("memberId").is_none());
        assert_eq!(json["referencedComponentId"], "73211009");
    }

    #[test]
    fn test_bulk_status_unknown_value_keeps_polling() {
        let state: BulkJobState =
            serde_json::from_str(r#"{"status": "QUEUED"}"#).unwrap();
        assert_eq!(state.status, BulkJobStatus::Other);

        let state: BulkJobState = serde_json::from_str(
            r#"{"status": "FAILED", "secondsDuration": 1.5, "message": "boom"}"#,
        )
        .unwrap();
        assert_eq!(state.status, BulkJobStatus::Failed);
        assert_eq!(state.message.as_deref(), Some("boom"));
    }
}
