//! Complaint table

use chrono::{DateTime, Utc};

use super::{StatusUpdate, Store};
use crate::complaints::{Complaint, ComplaintStatus};

impl Store {
    /// Insert a complaint, assigning its id
    pub fn insert_complaint(&self, mut complaint: Complaint) -> Complaint {
        complaint.id = self.next_id();
        self.0.complaints.insert(complaint.id, complaint.clone());
        complaint
    }

    #[must_use]
    pub fn complaint(&self, id: u64) -> Option<Complaint> {
        self.0.complaints.get(&id).map(|entry| entry.value().clone())
    }

    /// All complaints with the given status, oldest first
    #[must_use]
    pub fn complaints_with(&self, status: ComplaintStatus) -> Vec<Complaint> {
        let mut complaints: Vec<Complaint> = self
            .0
            .complaints
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect();
        complaints.sort_by_key(|complaint| complaint.id);
        complaints
    }

    /// Move a pending complaint to a terminal status. Terminal statuses are final.
    pub fn resolve_complaint(
        &self,
        id: u64,
        status: ComplaintStatus,
        handled_by: u64,
        handling_result: &str,
        handled_at: DateTime<Utc>,
    ) -> Option<StatusUpdate> {
        let mut complaint = self.0.complaints.get_mut(&id)?;
        if complaint.status.is_terminal() {
            return Some(StatusUpdate::AlreadyHandled(complaint.status));
        }

        complaint.status = status;
        complaint.handled_by = Some(handled_by);
        complaint.handling_result = Some(handling_result.to_string());
        complaint.handled_at = Some(handled_at);
        Some(StatusUpdate::Updated(complaint.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn pending() -> Complaint {
        Complaint {
            id: 0,
            user_id: 1,
            username: "@user".to_string(),
            admin_username: "@admin".to_string(),
            description: "Rude reply".to_string(),
            complaint_text: "The moderator insulted me in the chat".to_string(),
            evidence: "screenshot".to_string(),
            created_at: now(),
            status: ComplaintStatus::Pending,
            handled_by: None,
            handling_result: None,
            handled_at: None,
        }
    }

    #[test]
    fn test_terminal_status_is_final() {
        let store = Store::in_memory();
        let complaint = store.insert_complaint(pending());

        let Some(StatusUpdate::Updated(resolved)) =
            store.resolve_complaint(complaint.id, ComplaintStatus::Rejected, 7, "no proof", now())
        else {
            panic!("expected the pending complaint to be resolved");
        };
        assert_eq!(resolved.status, ComplaintStatus::Rejected);
        assert_eq!(resolved.handled_by, Some(7));

        assert_eq!(
            store.resolve_complaint(complaint.id, ComplaintStatus::Approved, 8, "ok", now()),
            Some(StatusUpdate::AlreadyHandled(ComplaintStatus::Rejected))
        );
        assert_eq!(
            store.complaint(complaint.id).unwrap().handling_result.as_deref(),
            Some("no proof")
        );
        assert_eq!(store.resolve_complaint(999, ComplaintStatus::Approved, 8, "ok", now()), None);
    }

    #[test]
    fn test_complaints_with_status() {
        let store = Store::in_memory();
        let first = store.insert_complaint(pending());
        store.insert_complaint(pending());
        store.resolve_complaint(first.id, ComplaintStatus::Approved, 7, "warned", now());

        assert_eq!(store.complaints_with(ComplaintStatus::Pending).len(), 1);
        assert_eq!(store.complaints_with(ComplaintStatus::Approved).len(), 1);
        assert!(store.complaints_with(ComplaintStatus::FalseReport).is_empty());
    }
}
