//! Strike counting
//!
//! Warns, admin warns and bot warns all follow one rule: count the active
//! strikes, and at the threshold run a harsher action, then clear the
//! strikes. The strikes are cleared only if the action succeeded.

use std::future::Future;

use super::error::ModerationResult;

/// Active strikes that trigger escalation
pub const STRIKE_THRESHOLD: usize = 3;

/// Result of recording a strike
#[derive(Debug, Clone, PartialEq)]
pub enum StrikeOutcome<T> {
    /// Below the threshold; carries the active strike count
    Counted(usize),
    /// The threshold was reached and the escalation ran
    Escalated(T),
}

impl<T> StrikeOutcome<T> {
    /// Active strikes left after the call
    #[must_use]
    pub fn remaining(&self) -> usize {
        match self {
            Self::Counted(active) => *active,
            Self::Escalated(_) => 0,
        }
    }

    pub fn escalation(self) -> Option<T> {
        match self {
            Self::Counted(_) => None,
            Self::Escalated(action) => Some(action),
        }
    }
}

/// Escalate once `active` reaches [`STRIKE_THRESHOLD`].
///
/// `clear` runs only after `escalate` returned `Ok`; a failed escalation
/// keeps the strikes so the next strike retries it.
///
/// # Errors
/// Returns the escalation's error unchanged
pub async fn escalate_at_threshold<T, E, Fut, C>(
    active: usize,
    escalate: E,
    clear: C,
) -> ModerationResult<StrikeOutcome<T>>
where
    E: FnOnce() -> Fut,
    Fut: Future<Output = ModerationResult<T>>,
    C: FnOnce() -> usize,
{
    if active < STRIKE_THRESHOLD {
        return Ok(StrikeOutcome::Counted(active));
    }

    let action = escalate().await?;
    clear();
    Ok(StrikeOutcome::Escalated(action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::ModerationError;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_below_threshold_only_counts() {
        let escalated = Cell::new(false);
        let cleared = Cell::new(false);
        let outcome = escalate_at_threshold(
            2,
            || async {
                escalated.set(true);
                Ok(())
            },
            || {
                cleared.set(true);
                0
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, StrikeOutcome::Counted(2));
        assert_eq!(outcome.remaining(), 2);
        assert!(!escalated.get());
        assert!(!cleared.get());
    }

    #[tokio::test]
    async fn test_escalation_clears_after_success() {
        let cleared = Cell::new(false);
        let outcome = escalate_at_threshold(
            3,
            || async { Ok("banned") },
            || {
                cleared.set(true);
                3
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.remaining(), 0);
        assert_eq!(outcome.escalation(), Some("banned"));
        assert!(cleared.get());
    }

    #[tokio::test]
    async fn test_failed_escalation_keeps_strikes() {
        let cleared = Cell::new(false);
        let result = escalate_at_threshold(
            4,
            || async { Err::<(), _>(ModerationError::not_found("member")) },
            || {
                cleared.set(true);
                4
            },
        )
        .await;

        assert!(matches!(result, Err(ModerationError::NotFound(_))));
        assert!(!cleared.get());
    }
}
