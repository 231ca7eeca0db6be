//! Marketplace records

use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Publication state of an ad. Draft to published is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum AdStatus {
    #[display("draft")]
    Draft,
    #[display("published")]
    Published,
}

/// A marketplace listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub id: u64,
    pub user_id: u64,
    /// Opaque media references, in display order
    pub photos: Vec<String>,
    pub description: String,
    pub price: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub status: AdStatus,
    pub published_at: Option<DateTime<Utc>>,
}

impl Ad {
    /// Text posted to the market channel
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!(
            "{}\n\nPrice: {}\nContact: {}",
            self.description, self.price, self.username
        );
        if !self.photos.is_empty() {
            text.push_str(&format!("\nPhotos: {}", self.photos.len()));
        }
        text
    }
}

/// Last successful publish of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCooldown {
    pub user_id: u64,
    pub last_published_at: DateTime<Utc>,
}

/// Denied publish attempts of a user on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdViolation {
    pub user_id: u64,
    pub date: NaiveDate,
    pub count: u32,
}

/// Ads a user published on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPublishCount {
    pub user_id: u64,
    pub date: NaiveDate,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum RatingKind {
    #[display("like")]
    Like,
    #[display("dislike")]
    Dislike,
}

/// One user's rating of one ad; unique per `(ad_id, user_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdRating {
    pub ad_id: u64,
    pub user_id: u64,
    pub rating: RatingKind,
}

/// Peer review between users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReview {
    pub id: u64,
    pub from_user_id: u64,
    pub to_user_id: u64,
    /// 1 to 5
    pub rating: u8,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
}
