//! Likes and dislikes on ads

use tracing::debug;

use super::record::{AdRating, RatingKind};
use crate::moderation::{Ledger, ModerationError, ModerationResult};
use crate::store::RatingInsert;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingTally {
    pub likes: usize,
    pub dislikes: usize,
}

#[derive(Clone)]
pub struct Ratings {
    ledger: Ledger,
}

impl Ratings {
    #[must_use]
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Rate an ad once. Returns the ad's tally after the rating.
    ///
    /// # Errors
    /// Returns [`ModerationError::NotFound`] for an unknown ad and
    /// [`ModerationError::Conflict`] if the user already rated it
    pub async fn rate(
        &self,
        ad_id: u64,
        user_id: u64,
        rating: RatingKind,
    ) -> ModerationResult<RatingTally> {
        self.ledger.check_bot_access(user_id)?;
        let store = &self.ledger.store;
        if store.ad(ad_id).is_none() {
            return Err(ModerationError::not_found(format!("ad #{ad_id}")));
        }

        match store.insert_rating(AdRating {
            ad_id,
            user_id,
            rating,
        }) {
            RatingInsert::Inserted => {
                self.ledger.persist().await?;
                debug!("User {user_id} rated ad {ad_id}: {rating}");
                Ok(self.tally(ad_id))
            }
            RatingInsert::AlreadyRated => Err(ModerationError::conflict(format!(
                "You already rated ad #{ad_id}"
            ))),
        }
    }

    #[must_use]
    pub fn tally(&self, ad_id: u64) -> RatingTally {
        let (likes, dislikes) = self.ledger.store.rating_tally(ad_id);
        RatingTally { likes, dislikes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::MockChatGateway;
    use crate::market::{Ad, AdStatus};
    use crate::moderation::ledger::testing::*;
    use std::sync::Arc;

    fn ratings_with_ad() -> (Ratings, u64) {
        let ledger = ledger(MockChatGateway::new(), Arc::new(ManualClock::new(start())));
        let ad = ledger.store().insert_ad(Ad {
            id: 0,
            user_id: USER,
            photos: Vec::new(),
            description: "Acoustic guitar with case".to_string(),
            price: "80".to_string(),
            username: "@seller".to_string(),
            created_at: start(),
            status: AdStatus::Published,
            published_at: Some(start()),
        });
        (Ratings::new(ledger), ad.id)
    }

    #[tokio::test]
    async fn test_second_rating_conflicts() {
        let (ratings, ad_id) = ratings_with_ad();

        let tally = ratings.rate(ad_id, 42, RatingKind::Like).await.unwrap();
        assert_eq!(tally, RatingTally { likes: 1, dislikes: 0 });

        assert!(matches!(
            ratings.rate(ad_id, 42, RatingKind::Like).await,
            Err(ModerationError::Conflict(_))
        ));
        assert!(matches!(
            ratings.rate(ad_id, 42, RatingKind::Dislike).await,
            Err(ModerationError::Conflict(_))
        ));
        assert_eq!(ratings.tally(ad_id).likes, 1);

        let tally = ratings.rate(ad_id, 43, RatingKind::Dislike).await.unwrap();
        assert_eq!(tally, RatingTally { likes: 1, dislikes: 1 });
    }

    #[tokio::test]
    async fn test_unknown_ad_is_not_found() {
        let (ratings, _) = ratings_with_ad();
        assert!(matches!(
            ratings.rate(99, 42, RatingKind::Like).await,
            Err(ModerationError::NotFound(_))
        ));
        assert_eq!(ratings.tally(99), RatingTally::default());
    }
}
