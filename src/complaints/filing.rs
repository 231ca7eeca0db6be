//! Complaint filing conversation
//!
//! A user files a complaint against a moderator one field at a time. Each
//! answer is validated before the draft advances; a rejected answer keeps the
//! draft on the same step. The draft only becomes a stored complaint once the
//! evidence is accepted.

use std::sync::Arc;
use tracing::info;

use super::record::{Complaint, ComplaintStatus};
use crate::moderation::{Ledger, ModerationError, ModerationResult, ensure_min_len};
use crate::session::SessionStore;

pub const MIN_DESCRIPTION_CHARS: usize = 5;
pub const MIN_COMPLAINT_CHARS: usize = 20;

/// Field the conversation is waiting for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilingStep {
    #[default]
    CollectingUsername,
    CollectingAdminUsername,
    CollectingDescription,
    CollectingComplaintText,
    CollectingEvidence,
}

impl FilingStep {
    /// Prompt shown to the user for this step
    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::CollectingUsername => "Send your username, starting with @",
            Self::CollectingAdminUsername => "Send the moderator's username, starting with @",
            Self::CollectingDescription => "Briefly describe what happened",
            Self::CollectingComplaintText => "Write your complaint in detail",
            Self::CollectingEvidence => "Send evidence: links or a description of screenshots",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplaintDraft {
    pub step: FilingStep,
    pub username: Option<String>,
    pub admin_username: Option<String>,
    pub description: Option<String>,
    pub complaint_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilingProgress {
    Next(FilingStep),
    Filed(Complaint),
}

#[derive(Clone)]
pub struct ComplaintFiling {
    ledger: Ledger,
    sessions: Arc<dyn SessionStore<ComplaintDraft>>,
    /// Users told about every new complaint
    reviewers: Arc<[u64]>,
}

impl ComplaintFiling {
    pub fn new(
        ledger: Ledger,
        sessions: Arc<dyn SessionStore<ComplaintDraft>>,
        reviewers: impl Into<Arc<[u64]>>,
    ) -> Self {
        Self {
            ledger,
            sessions,
            reviewers: reviewers.into(),
        }
    }

    /// Start a new draft, replacing any unfinished one
    ///
    /// # Errors
    /// Returns [`ModerationError::Blocked`] for bot-blocked users
    pub fn start(&self, user_id: u64) -> ModerationResult<FilingStep> {
        self.ledger.check_bot_access(user_id)?;
        self.sessions.put(user_id, ComplaintDraft::default());
        Ok(FilingStep::CollectingUsername)
    }

    /// Answer the current step
    ///
    /// # Errors
    /// Fails without advancing if no complaint is in progress, the answer is
    /// invalid, or the user got bot-blocked meanwhile
    pub async fn submit(&self, user_id: u64, text: &str) -> ModerationResult<FilingProgress> {
        let mut draft = self
            .sessions
            .get(user_id)
            .ok_or_else(|| ModerationError::not_found("complaint in progress"))?;
        let text = text.trim();

        draft.step = match draft.step {
            FilingStep::CollectingUsername => {
                draft.username = Some(handle(text, "Your username")?);
                FilingStep::CollectingAdminUsername
            }
            FilingStep::CollectingAdminUsername => {
                draft.admin_username = Some(handle(text, "The moderator's username")?);
                FilingStep::CollectingDescription
            }
            FilingStep::CollectingDescription => {
                ensure_min_len(text, MIN_DESCRIPTION_CHARS, "Description")?;
                draft.description = Some(text.to_string());
                FilingStep::CollectingComplaintText
            }
            FilingStep::CollectingComplaintText => {
                ensure_min_len(text, MIN_COMPLAINT_CHARS, "Complaint")?;
                draft.complaint_text = Some(text.to_string());
                FilingStep::CollectingEvidence
            }
            FilingStep::CollectingEvidence => {
                if text.is_empty() {
                    return Err(ModerationError::validation("Evidence must not be empty"));
                }
                return self.commit(user_id, draft, text).await.map(FilingProgress::Filed);
            }
        };

        let step = draft.step;
        self.sessions.put(user_id, draft);
        Ok(FilingProgress::Next(step))
    }

    /// Drop the draft. Returns whether there was one.
    pub fn cancel(&self, user_id: u64) -> bool {
        self.sessions.take(user_id).is_some()
    }

    #[must_use]
    pub fn in_progress(&self, user_id: u64) -> Option<ComplaintDraft> {
        self.sessions.get(user_id)
    }

    async fn commit(
        &self,
        user_id: u64,
        draft: ComplaintDraft,
        evidence: &str,
    ) -> ModerationResult<Complaint> {
        if let Err(e) = self.ledger.check_bot_access(user_id) {
            self.sessions.take(user_id);
            return Err(e);
        }
        let (Some(username), Some(admin_username), Some(description), Some(complaint_text)) = (
            draft.username,
            draft.admin_username,
            draft.description,
            draft.complaint_text,
        ) else {
            self.sessions.take(user_id);
            return Err(ModerationError::validation("Complaint is incomplete, start over"));
        };
        self.sessions.take(user_id);

        let complaint = self.ledger.store.insert_complaint(Complaint {
            id: 0,
            user_id,
            username,
            admin_username,
            description,
            complaint_text,
            evidence: evidence.to_string(),
            created_at: self.ledger.now(),
            status: ComplaintStatus::Pending,
            handled_by: None,
            handling_result: None,
            handled_at: None,
        });
        self.ledger.persist().await?;

        info!(
            complaint_id = %complaint.id,
            user_id = %user_id,
            admin_username = %complaint.admin_username,
            "Complaint filed"
        );
        let delivered = self
            .ledger
            .notifier
            .broadcast_users(&self.reviewers, &complaint.summary())
            .await;
        info!(
            "Complaint {} sent to {delivered}/{} reviewer(s)",
            complaint.id,
            self.reviewers.len()
        );
        Ok(complaint)
    }
}

fn handle(text: &str, field: &str) -> ModerationResult<String> {
    let valid = text
        .strip_prefix('@')
        .is_some_and(|name| !name.is_empty() && !name.contains(char::is_whitespace));
    if !valid {
        return Err(ModerationError::Validation(format!(
            "{field} must start with @"
        )));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::MockChatGateway;
    use crate::moderation::ledger::testing::*;
    use crate::session::MemorySessions;
    use mockall::predicate::{always, eq};

    const REVIEWERS: [u64; 2] = [901, 902];

    fn filing(gateway: MockChatGateway) -> ComplaintFiling {
        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        ComplaintFiling::new(
            ledger,
            Arc::new(MemorySessions::<ComplaintDraft>::new()),
            REVIEWERS.to_vec(),
        )
    }

    async fn fill_until_evidence(filing: &ComplaintFiling) {
        filing.start(USER).unwrap();
        for answer in [
            "@complainer",
            "@strict_mod",
            "Unfair mute",
            "I was muted for a message that broke no rule",
        ] {
            assert!(matches!(
                filing.submit(USER, answer).await.unwrap(),
                FilingProgress::Next(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_full_filing_notifies_reviewers() {
        let mut gateway = MockChatGateway::new();
        for reviewer in REVIEWERS {
            gateway
                .expect_send_direct()
                .with(eq(reviewer), always())
                .times(1)
                .returning(|_, _| Ok(()));
        }
        let filing = filing(gateway);

        fill_until_evidence(&filing).await;
        assert_eq!(
            filing.in_progress(USER).map(|draft| draft.step),
            Some(FilingStep::CollectingEvidence)
        );

        let FilingProgress::Filed(complaint) =
            filing.submit(USER, "https://example.org/screenshot").await.unwrap()
        else {
            panic!("evidence completes the complaint");
        };
        assert_eq!(complaint.status, ComplaintStatus::Pending);
        assert_eq!(complaint.admin_username, "@strict_mod");
        assert!(filing.in_progress(USER).is_none());
    }

    #[tokio::test]
    async fn test_invalid_answers_keep_the_step() {
        let filing = filing(MockChatGateway::new());
        filing.start(USER).unwrap();

        for bad in ["complainer", "@", "@two words"] {
            assert!(matches!(
                filing.submit(USER, bad).await,
                Err(ModerationError::Validation(_))
            ));
        }
        assert_eq!(
            filing.submit(USER, "@complainer").await.unwrap(),
            FilingProgress::Next(FilingStep::CollectingAdminUsername)
        );
        filing.submit(USER, "@strict_mod").await.unwrap();

        assert!(filing.submit(USER, "bad").await.is_err());
        filing.submit(USER, "Unfair mute").await.unwrap();

        assert!(matches!(
            filing.submit(USER, "Too short to count").await,
            Err(ModerationError::Validation(_))
        ));
        assert_eq!(
            filing.in_progress(USER).map(|draft| draft.step),
            Some(FilingStep::CollectingComplaintText)
        );
    }

    #[tokio::test]
    async fn test_cancel_leaves_no_trace() {
        let filing = filing(MockChatGateway::new());
        fill_until_evidence(&filing).await;

        assert!(filing.cancel(USER));
        assert!(matches!(
            filing.submit(USER, "evidence").await,
            Err(ModerationError::NotFound(_))
        ));
        assert!(filing
            .ledger
            .store
            .complaints_with(ComplaintStatus::Pending)
            .is_empty());
    }

    #[tokio::test]
    async fn test_blocked_user_cannot_commit() {
        let mut gateway = MockChatGateway::new();
        gateway.expect_send_direct().returning(|_, _| Ok(()));
        let filing = filing(gateway);
        fill_until_evidence(&filing).await;

        filing
            .ledger
            .bot_block(USER, "spam", MODERATOR, None)
            .await
            .unwrap();
        assert!(matches!(
            filing.submit(USER, "https://example.org/screenshot").await,
            Err(ModerationError::Blocked { .. })
        ));
        assert!(filing.in_progress(USER).is_none());
        assert!(filing
            .ledger
            .store
            .complaints_with(ComplaintStatus::Pending)
            .is_empty());
        assert!(matches!(
            filing.start(USER),
            Err(ModerationError::Blocked { .. })
        ));
    }
}
