//! Peer reviews
//!
//! Leaving a review is a two step conversation: pick 1 to 5 stars, then write
//! the text. The draft lives in a [`SessionStore`] until the text is accepted.

use std::sync::Arc;
use tracing::info;

use super::record::UserReview;
use crate::moderation::{Ledger, ModerationError, ModerationResult, ensure_min_len};
use crate::notify::mention;
use crate::session::SessionStore;

pub const MIN_REVIEW_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStep {
    ChoosingRating,
    WritingText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDraft {
    pub to_user_id: u64,
    pub rating: Option<u8>,
    pub step: ReviewStep,
}

#[derive(Clone)]
pub struct Reviews {
    ledger: Ledger,
    sessions: Arc<dyn SessionStore<ReviewDraft>>,
}

impl Reviews {
    pub fn new(ledger: Ledger, sessions: Arc<dyn SessionStore<ReviewDraft>>) -> Self {
        Self { ledger, sessions }
    }

    /// Begin reviewing `to_user_id`
    ///
    /// # Errors
    /// Self reviews fail validation; a second review of the same user is a conflict
    pub fn start(&self, from_user_id: u64, to_user_id: u64) -> ModerationResult<ReviewStep> {
        self.ledger.check_bot_access(from_user_id)?;
        if from_user_id == to_user_id {
            return Err(ModerationError::validation("You cannot review yourself"));
        }
        self.ensure_first_review(from_user_id, to_user_id)?;

        self.sessions.put(
            from_user_id,
            ReviewDraft {
                to_user_id,
                rating: None,
                step: ReviewStep::ChoosingRating,
            },
        );
        Ok(ReviewStep::ChoosingRating)
    }

    /// Pick the star rating
    ///
    /// # Errors
    /// Fails if no review is in progress or the rating is outside 1 to 5
    pub fn rate(&self, from_user_id: u64, stars: u8) -> ModerationResult<ReviewStep> {
        let mut draft = self.draft(from_user_id)?;
        if draft.step != ReviewStep::ChoosingRating {
            return Err(ModerationError::validation("Rating already chosen, write your review"));
        }
        if !(1..=5).contains(&stars) {
            return Err(ModerationError::validation("Rating must be between 1 and 5"));
        }

        draft.rating = Some(stars);
        draft.step = ReviewStep::WritingText;
        self.sessions.put(from_user_id, draft);
        Ok(ReviewStep::WritingText)
    }

    /// Finish the review with its text
    ///
    /// # Errors
    /// Fails if no review is waiting for text, the text is too short, or the
    /// target was reviewed meanwhile
    pub async fn submit_text(&self, from_user_id: u64, text: &str) -> ModerationResult<UserReview> {
        let draft = self.draft(from_user_id)?;
        let Some(rating) = draft.rating.filter(|_| draft.step == ReviewStep::WritingText) else {
            return Err(ModerationError::validation("Choose a rating first"));
        };
        ensure_min_len(text, MIN_REVIEW_CHARS, "Review")?;

        self.sessions.take(from_user_id);
        self.ensure_first_review(from_user_id, draft.to_user_id)?;

        let review = self.ledger.store.insert_review(UserReview {
            id: 0,
            from_user_id,
            to_user_id: draft.to_user_id,
            rating,
            review_text: text.trim().to_string(),
            created_at: self.ledger.now(),
        });
        self.ledger.persist().await?;

        info!(
            review_id = %review.id,
            from_user_id = %from_user_id,
            to_user_id = %review.to_user_id,
            "Review left"
        );
        let notice = format!(
            "{} left you a review: {}/5\n{}",
            mention(from_user_id),
            review.rating,
            review.review_text
        );
        self.ledger.notifier.user(review.to_user_id, &notice).await;
        Ok(review)
    }

    /// Drop the draft. Returns whether there was one.
    pub fn cancel(&self, from_user_id: u64) -> bool {
        self.sessions.take(from_user_id).is_some()
    }

    #[must_use]
    pub fn in_progress(&self, from_user_id: u64) -> Option<ReviewDraft> {
        self.sessions.get(from_user_id)
    }

    #[must_use]
    pub fn reviews_of(&self, user_id: u64) -> Vec<UserReview> {
        self.ledger.store.reviews_of(user_id)
    }

    /// Mean star rating, `None` without reviews
    #[must_use]
    pub fn average(&self, user_id: u64) -> Option<f64> {
        let reviews = self.reviews_of(user_id);
        if reviews.is_empty() {
            return None;
        }
        let total: u32 = reviews.iter().map(|review| u32::from(review.rating)).sum();
        #[allow(clippy::cast_precision_loss)]
        let count = reviews.len() as f64;
        Some(f64::from(total) / count)
    }

    fn draft(&self, from_user_id: u64) -> ModerationResult<ReviewDraft> {
        self.sessions
            .get(from_user_id)
            .ok_or_else(|| ModerationError::not_found("review in progress"))
    }

    fn ensure_first_review(&self, from_user_id: u64, to_user_id: u64) -> ModerationResult<()> {
        if self.ledger.store.has_review(from_user_id, to_user_id) {
            return Err(ModerationError::conflict("You already reviewed this user"));
        }
        Ok(())
    }
}
