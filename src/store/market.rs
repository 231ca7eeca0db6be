//! Ads, cooldowns, violations, ratings and reviews

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;

use super::{RatingInsert, Store};
use crate::market::{Ad, AdRating, AdStatus, RatingKind, UserReview};

impl Store {
    /// Insert an ad, assigning its id
    pub fn insert_ad(&self, mut ad: Ad) -> Ad {
        ad.id = self.next_id();
        self.0.ads.insert(ad.id, ad.clone());
        ad
    }

    #[must_use]
    pub fn ad(&self, id: u64) -> Option<Ad> {
        self.0.ads.get(&id).map(|entry| entry.value().clone())
    }

    /// Ads of a user, oldest first
    #[must_use]
    pub fn ads_of(&self, user_id: u64) -> Vec<Ad> {
        let mut ads: Vec<Ad> = self
            .0
            .ads
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        ads.sort_by_key(|ad| ad.id);
        ads
    }

    /// Draft to published, only if the ad is still a draft
    pub fn mark_published(&self, id: u64, at: DateTime<Utc>) -> Option<Ad> {
        let mut ad = self.0.ads.get_mut(&id)?;
        if ad.status != AdStatus::Draft {
            return None;
        }
        ad.status = AdStatus::Published;
        ad.published_at = Some(at);
        Some(ad.clone())
    }

    /// Delete an ad, only if `owner` owns it
    pub fn delete_ad(&self, id: u64, owner: u64) -> Option<Ad> {
        self.0
            .ads
            .remove_if(&id, |_, ad| ad.user_id == owner)
            .map(|(_, ad)| ad)
    }

    /// Upsert-increment the user's publish counter for a day
    pub fn bump_publishes(&self, user_id: u64, day: NaiveDate) -> u32 {
        let mut count = self.0.ad_publishes.entry((user_id, day)).or_insert(0);
        *count += 1;
        *count
    }

    /// Ads the user published on the given UTC day, deleted ones included
    #[must_use]
    pub fn publishes(&self, user_id: u64, day: NaiveDate) -> u32 {
        self.0
            .ad_publishes
            .get(&(user_id, day))
            .map_or(0, |entry| *entry.value())
    }

    #[must_use]
    pub fn cooldown(&self, user_id: u64) -> Option<DateTime<Utc>> {
        self.0.ad_cooldowns.get(&user_id).map(|entry| *entry.value())
    }

    /// Upsert the user's last publish instant
    pub fn set_cooldown(&self, user_id: u64, at: DateTime<Utc>) {
        self.0.ad_cooldowns.insert(user_id, at);
    }

    /// Upsert-increment the user's violation counter for a day
    pub fn bump_violation(&self, user_id: u64, day: NaiveDate) -> u32 {
        let mut count = self.0.ad_violations.entry((user_id, day)).or_insert(0);
        *count += 1;
        *count
    }

    #[must_use]
    pub fn violations(&self, user_id: u64, day: NaiveDate) -> u32 {
        self.0
            .ad_violations
            .get(&(user_id, day))
            .map_or(0, |entry| *entry.value())
    }

    /// Insert a rating unless the user already rated the ad
    pub fn insert_rating(&self, rating: AdRating) -> RatingInsert {
        match self.0.ad_ratings.entry((rating.ad_id, rating.user_id)) {
            Entry::Occupied(_) => RatingInsert::AlreadyRated,
            Entry::Vacant(slot) => {
                slot.insert(rating);
                RatingInsert::Inserted
            }
        }
    }

    /// `(likes, dislikes)` of an ad
    #[must_use]
    pub fn rating_tally(&self, ad_id: u64) -> (usize, usize) {
        self.0
            .ad_ratings
            .iter()
            .filter(|entry| entry.key().0 == ad_id)
            .fold((0, 0), |(likes, dislikes), entry| match entry.value().rating {
                RatingKind::Like => (likes + 1, dislikes),
                RatingKind::Dislike => (likes, dislikes + 1),
            })
    }

    pub fn insert_review(&self, mut review: UserReview) -> UserReview {
        review.id = self.next_id();
        self.0.reviews.insert(review.id, review.clone());
        review
    }

    /// Reviews received by a user, oldest first
    #[must_use]
    pub fn reviews_of(&self, user_id: u64) -> Vec<UserReview> {
        let mut reviews: Vec<UserReview> = self
            .0
            .reviews
            .iter()
            .filter(|entry| entry.value().to_user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        reviews.sort_by_key(|review| review.id);
        reviews
    }

    #[must_use]
    pub fn has_review(&self, from_user_id: u64, to_user_id: u64) -> bool {
        self.0.reviews.iter().any(|entry| {
            entry.value().from_user_id == from_user_id && entry.value().to_user_id == to_user_id
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn draft(user_id: u64) -> Ad {
        Ad {
            id: 0,
            user_id,
            photos: Vec::new(),
            description: "Selling a used laptop".to_string(),
            price: "300".to_string(),
            username: "@seller".to_string(),
            created_at: now(),
            status: AdStatus::Draft,
            published_at: None,
        }
    }

    #[test]
    fn test_publish_is_one_way() {
        let store = Store::in_memory();
        let ad = store.insert_ad(draft(1));

        let published = store.mark_published(ad.id, now()).unwrap();
        assert_eq!(published.status, AdStatus::Published);
        assert_eq!(published.published_at, Some(now()));
        assert_eq!(store.mark_published(ad.id, now()), None);
    }

    #[test]
    fn test_publish_counter_outlives_the_ad() {
        let store = Store::in_memory();
        let today = now().date_naive();
        let ad = store.insert_ad(draft(1));
        store.mark_published(ad.id, now());
        assert_eq!(store.bump_publishes(1, today), 1);

        store.delete_ad(ad.id, 1);
        assert_eq!(store.publishes(1, today), 1);
        assert_eq!(store.publishes(1, (now() + Duration::days(1)).date_naive()), 0);
        assert_eq!(store.publishes(2, today), 0);
    }

    #[test]
    fn test_delete_requires_owner() {
        let store = Store::in_memory();
        let ad = store.insert_ad(draft(1));

        assert_eq!(store.delete_ad(ad.id, 2), None);
        assert!(store.ad(ad.id).is_some());
        assert_eq!(store.delete_ad(ad.id, 1).map(|ad| ad.user_id), Some(1));
        assert!(store.ad(ad.id).is_none());
        assert!(store.ads_of(1).is_empty());
    }

    #[test]
    fn test_rating_is_unique_per_user_and_ad() {
        let store = Store::in_memory();
        let like = AdRating {
            ad_id: 5,
            user_id: 42,
            rating: RatingKind::Like,
        };
        assert_eq!(store.insert_rating(like.clone()), RatingInsert::Inserted);
        assert_eq!(
            store.insert_rating(AdRating {
                rating: RatingKind::Dislike,
                ..like
            }),
            RatingInsert::AlreadyRated
        );
        assert_eq!(store.rating_tally(5), (1, 0));
    }

    #[test]
    fn test_violation_counter_is_per_day() {
        let store = Store::in_memory();
        let today = now().date_naive();
        assert_eq!(store.bump_violation(1, today), 1);
        assert_eq!(store.bump_violation(1, today), 2);
        assert_eq!(store.violations(1, today), 2);
        assert_eq!(store.violations(1, (now() + Duration::days(1)).date_naive()), 0);
    }
}
