//! Handling of filed complaints by reviewers

use derive_more::Display;
use tracing::info;

use super::record::{Complaint, ComplaintStatus};
use crate::MODERATION_TARGET;
use crate::moderation::{Ledger, ModerationError, ModerationResult, Punishment, ensure_min_len};
use crate::store::StatusUpdate;

pub const MIN_RESOLUTION_CHARS: usize = 5;

/// A reviewer's verdict on a complaint
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Resolution {
    /// The complaint holds; `actions` describes what was done about it
    #[display("approved: {actions}")]
    Approve { actions: String },
    #[display("rejected: {reason}")]
    Reject { reason: String },
    /// Made up complaint; the complainant is blocked from the bot
    #[display("false report: {reason}")]
    FalseReport { reason: String },
    /// Misguided complaint; the complainant gets a bot warning
    #[display("incorrect report: {reason}")]
    IncorrectReport { reason: String },
}

impl Resolution {
    #[must_use]
    pub fn status(&self) -> ComplaintStatus {
        match self {
            Self::Approve { .. } => ComplaintStatus::Approved,
            Self::Reject { .. } => ComplaintStatus::Rejected,
            Self::FalseReport { .. } => ComplaintStatus::FalseReport,
            Self::IncorrectReport { .. } => ComplaintStatus::IncorrectReport,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Approve { actions } => actions,
            Self::Reject { reason }
            | Self::FalseReport { reason }
            | Self::IncorrectReport { reason } => reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Resolved {
        complaint: Complaint,
        /// Bot block the complainant received as a consequence, if any
        block: Option<Punishment>,
    },
    AlreadyHandled(ComplaintStatus),
}

/// Complaint counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplaintStats {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub false_reports: usize,
    pub incorrect_reports: usize,
}

impl ComplaintStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected + self.false_reports + self.incorrect_reports
    }
}

#[derive(Clone)]
pub struct ComplaintResolver {
    ledger: Ledger,
}

impl ComplaintResolver {
    #[must_use]
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Record a verdict, then apply its consequences to the complainant
    ///
    /// # Errors
    /// Returns an error for a short reason, an unknown complaint, or a failed
    /// save. A complaint that was already handled is not an error.
    pub async fn resolve(
        &self,
        complaint_id: u64,
        admin_id: u64,
        resolution: Resolution,
    ) -> ModerationResult<ResolutionOutcome> {
        ensure_min_len(resolution.text(), MIN_RESOLUTION_CHARS, "Reason")?;
        let status = resolution.status();
        let handling_result = resolution.text().trim();

        let update = self
            .ledger
            .store
            .resolve_complaint(
                complaint_id,
                status,
                admin_id,
                handling_result,
                self.ledger.now(),
            )
            .ok_or_else(|| ModerationError::not_found(format!("complaint #{complaint_id}")))?;
        let complaint = match update {
            StatusUpdate::Updated(complaint) => complaint,
            StatusUpdate::AlreadyHandled(current) => {
                info!("Complaint {complaint_id} was already handled as {current}");
                return Ok(ResolutionOutcome::AlreadyHandled(current));
            }
        };
        self.ledger.persist().await?;

        info!(
            target: MODERATION_TARGET,
            complaint_id = %complaint_id,
            admin_id = %admin_id,
            status = %status,
            "Complaint resolved"
        );

        let reason = format!("Complaint #{complaint_id}: {handling_result}");
        let block = match &resolution {
            Resolution::FalseReport { .. } => Some(
                self.ledger
                    .bot_block(complaint.user_id, &reason, admin_id, None)
                    .await?,
            ),
            Resolution::IncorrectReport { .. } => self
                .ledger
                .issue_bot_warn(complaint.user_id, &reason, admin_id)
                .await?
                .escalation(),
            Resolution::Approve { .. } | Resolution::Reject { .. } => None,
        };

        let notice = format!("Your complaint #{complaint_id} was {resolution}");
        self.ledger.notifier.user(complaint.user_id, &notice).await;
        Ok(ResolutionOutcome::Resolved { complaint, block })
    }

    /// Complaints waiting for a verdict, oldest first
    #[must_use]
    pub fn pending(&self) -> Vec<Complaint> {
        self.ledger.store.complaints_with(ComplaintStatus::Pending)
    }

    /// # Errors
    /// Returns [`ModerationError::NotFound`] for an unknown id
    pub fn get(&self, complaint_id: u64) -> ModerationResult<Complaint> {
        self.ledger
            .store
            .complaint(complaint_id)
            .ok_or_else(|| ModerationError::not_found(format!("complaint #{complaint_id}")))
    }

    #[must_use]
    pub fn stats(&self) -> ComplaintStats {
        let count = |status| self.ledger.store.complaints_with(status).len();
        ComplaintStats {
            pending: count(ComplaintStatus::Pending),
            approved: count(ComplaintStatus::Approved),
            rejected: count(ComplaintStatus::Rejected),
            false_reports: count(ComplaintStatus::FalseReport),
            incorrect_reports: count(ComplaintStatus::IncorrectReport),
        }
    }
}
