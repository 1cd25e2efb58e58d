//! Threshold guard: gates the magnitude of a proposed membership change.
//!
//! The absolute-count check is the gate: a breach vetoes the change unless
//! the override flag is set, in which case it proceeds with a warning. The
//! percentage check is advisory only: it warns but never vetoes by itself.

use std::fmt;

use tracing::info;

use crate::audit::AuditLog;
use crate::config::SyncConfig;
use crate::model::ConceptSearchItem;
use crate::report::{NotificationSeverity, ResultNode};

/// Guidance attached when a vetoed change was left unapplied.
pub const ACTION_NOT_CARRIED_OUT: &str = "This action HAS NOT been carried out. You will need to \
     investigate and fix the ECL, or override the count threshold check by setting the \
     ignore-count-change-threshold variable to true";

/// Guidance attached when an over-threshold change was applied anyway.
pub const ACTION_CARRIED_OUT: &str =
    "As you have chosen to IGNORE this warning, this action HAS been carried out.";

/// Which side of the diff a change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Concepts the formula matches that are not yet members.
    Add,
    /// Members the formula no longer matches, or that went inactive.
    Remove,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Add => write!(f, "add"),
            Direction::Remove => write!(f, "remove"),
        }
    }
}

/// Compares proposed change magnitudes against the configured limits.
#[derive(Debug, Clone)]
pub struct ThresholdGuard {
    /// Absolute candidate count at which a change is vetoed.
    pub count_change_threshold: u64,
    /// Fraction of current membership above which a warning is reported.
    pub percent_change_threshold: f64,
    /// When true, count breaches warn instead of vetoing.
    pub ignore_count_breach: bool,
}

impl ThresholdGuard {
    /// Builds the guard from the run configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        ThresholdGuard {
            count_change_threshold: config.count_change_threshold,
            percent_change_threshold: config.percent_change_threshold,
            ignore_count_breach: config.ignore_count_change_threshold,
        }
    }

    /// Absolute-count gate for one direction of one refset.
    ///
    /// Returns `true` when the change may proceed. On a veto the would-be
    /// changes are logged and audited so they can be reviewed.
    pub fn check_count(
        &self,
        refset_id: &str,
        direction: Direction,
        candidate_total: u64,
        items: &[ConceptSearchItem],
        node: &mut ResultNode,
        audit: &AuditLog,
    ) -> bool {
        if candidate_total < self.count_change_threshold {
            return true;
        }

        let message = format!(
            "ERROR: {} has exceeded the COUNT threshold of {} for refset {} while attempting to {} concepts",
            candidate_total, self.count_change_threshold, refset_id, direction
        );

        if self.ignore_count_breach {
            info!("{}", message);
            info!("### {}", ACTION_CARRIED_OUT);
            node.set_notification(
                NotificationSeverity::Warning,
                format!("{}. {}", message, ACTION_CARRIED_OUT),
            );
            audit.append(&format!(
                "### ERROR: Attempting to {} {} members for refset {} has exceeded the COUNT threshold of {}.",
                direction, candidate_total, refset_id, self.count_change_threshold
            ));
            audit.append(&format!("### {}", ACTION_CARRIED_OUT));
            true
        } else {
            node.count = 0;
            node.set_notification(
                NotificationSeverity::Error,
                format!("{}. {}", message, ACTION_NOT_CARRIED_OUT),
            );
            info!("{}", message);
            info!("### {}", ACTION_NOT_CARRIED_OUT);
            for item in items {
                info!(
                    "### Wanted to {} referencedComponentId {} ({})",
                    direction,
                    item.id_and_fsn(),
                    item.active
                );
            }
            audit.append(&message);
            audit.append(&format!("### {}", ACTION_NOT_CARRIED_OUT));
            false
        }
    }

    /// Percentage advisory for one applied direction. Warns, never vetoes.
    ///
    /// Skipped when the refset has no pre-existing members (nothing sensible
    /// to take a percentage of).
    pub fn log_percent(
        &self,
        refset_id: &str,
        direction: Direction,
        candidate_count: u64,
        member_total: u64,
        node: &mut ResultNode,
        audit: &AuditLog,
    ) {
        info!("### To {} count: {}", direction, candidate_count);
        if candidate_count == 0 {
            return;
        }

        info!("### Total count before {}: {}", direction, member_total);
        if member_total == 0 {
            info!("### INFO: no pre-existing content for reference set, skipping threshold calculation");
            return;
        }

        let threshold = member_total as f64 * self.percent_change_threshold;
        if candidate_count as f64 > threshold {
            let warning = format!(
                "WARNING: {} exceeds the {} PERCENT threshold of {}",
                candidate_count, self.percent_change_threshold, threshold
            );
            let carried_out = "This action has been carried out, this is just a notification";
            info!("### {}", warning);
            info!("### {}", carried_out);
            node.append_notification(
                NotificationSeverity::Warning,
                format!("{}. {}", warning, carried_out),
            );
            audit.append(&format!(
                "### WARNING: Attempting to {} {} members for refset {} has exceeded the PERCENT threshold of {}.",
                direction, candidate_count, refset_id, self.percent_change_threshold
            ));
            audit.append("### This action has been carried out, this is just a notification.");
        } else {
            info!(
                "### INFO: {} does not exceed the {} threshold of {}",
                candidate_count, self.percent_change_threshold, threshold
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(threshold: u64, ignore: bool) -> ThresholdGuard {
        ThresholdGuard {
            count_change_threshold: threshold,
            percent_change_threshold: 0.1,
            ignore_count_breach: ignore,
        }
    }

    fn audit_in(dir: &tempfile::TempDir) -> AuditLog {
        AuditLog::new(dir.path().join("threshold.txt"))
    }

    #[test]
    fn test_under_threshold_proceeds_silently() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ResultNode::named("Added Concepts");
        let allowed = guard(10, false).check_count(
            "r1",
            Direction::Add,
            9,
            &[],
            &mut node,
            &audit_in(&dir),
        );
        assert!(allowed);
        assert!(node.notification.is_none());
    }

    #[test]
    fn test_breach_without_override_vetoes_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ResultNode::named("Added Concepts");
        node.count = 15;
        let allowed = guard(10, false).check_count(
            "r1",
            Direction::Add,
            15,
            &[],
            &mut node,
            &audit_in(&dir),
        );
        assert!(!allowed);
        assert_eq!(node.count, 0);
        let notification = node.notification.unwrap();
        assert_eq!(notification.severity, NotificationSeverity::Error);
        assert!(notification.description.contains("COUNT threshold of 10"));
        assert!(notification.description.contains("HAS NOT been carried out"));

        let audit = std::fs::read_to_string(dir.path().join("threshold.txt")).unwrap();
        assert!(audit.contains("exceeded the COUNT threshold"));
    }

    #[test]
    fn test_breach_with_override_warns_and_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ResultNode::named("Added Concepts");
        let allowed = guard(10, true).check_count(
            "r1",
            Direction::Add,
            15,
            &[],
            &mut node,
            &audit_in(&dir),
        );
        assert!(allowed);
        let notification = node.notification.unwrap();
        assert_eq!(notification.severity, NotificationSeverity::Warning);
        assert!(notification.description.contains("HAS been carried out"));
    }

    #[test]
    fn test_exact_threshold_counts_as_breach() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ResultNode::named("Added Concepts");
        let allowed = guard(10, false).check_count(
            "r1",
            Direction::Add,
            10,
            &[],
            &mut node,
            &audit_in(&dir),
        );
        assert!(!allowed);
    }

    #[test]
    fn test_percent_breach_warns_but_never_vetoes() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ResultNode::named("Added Concepts");
        // 50 changes against 100 members is far over the 10% threshold.
        guard(1000, false).log_percent("r1", Direction::Add, 50, 100, &mut node, &audit_in(&dir));
        let notification = node.notification.unwrap();
        assert_eq!(notification.severity, NotificationSeverity::Warning);
        assert!(notification.description.contains("PERCENT threshold"));
    }

    #[test]
    fn test_percent_appends_to_existing_notification() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ResultNode::named("Added Concepts");
        node.set_notification(NotificationSeverity::Warning, "count warning".to_string());
        guard(1000, false).log_percent("r1", Direction::Add, 50, 100, &mut node, &audit_in(&dir));
        let notification = node.notification.unwrap();
        assert!(notification.description.starts_with("count warning. "));
    }

    #[test]
    fn test_percent_skipped_for_empty_refset() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = ResultNode::named("Added Concepts");
        guard(1000, false).log_percent("r1", Direction::Add, 50, 0, &mut node, &audit_in(&dir));
        assert!(node.notification.is_none());
    }
}
