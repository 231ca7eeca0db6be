//! Complaint records

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Complaint lifecycle. Every status but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ComplaintStatus {
    #[display("pending")]
    Pending,
    #[display("approved")]
    Approved,
    #[display("rejected")]
    Rejected,
    #[display("false report")]
    FalseReport,
    #[display("incorrect report")]
    IncorrectReport,
}

impl ComplaintStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

/// A complaint filed by a user against a moderator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: u64,
    pub user_id: u64,
    pub username: String,
    pub admin_username: String,
    pub description: String,
    pub complaint_text: String,
    pub evidence: String,
    pub created_at: DateTime<Utc>,
    pub status: ComplaintStatus,
    pub handled_by: Option<u64>,
    pub handling_result: Option<String>,
    pub handled_at: Option<DateTime<Utc>>,
}

impl Complaint {
    /// Summary sent to reviewers when the complaint is filed
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Complaint #{} from {} against {}\n{}\n\n{}\n\nEvidence: {}",
            self.id,
            self.username,
            self.admin_username,
            self.description,
            self.complaint_text,
            self.evidence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ComplaintStatus::Pending.is_terminal());
        assert!(ComplaintStatus::Approved.is_terminal());
        assert!(ComplaintStatus::Rejected.is_terminal());
        assert!(ComplaintStatus::FalseReport.is_terminal());
        assert!(ComplaintStatus::IncorrectReport.is_terminal());
        assert_eq!(ComplaintStatus::FalseReport.to_string(), "false report");
    }
}
