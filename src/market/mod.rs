//! Marketplace: ads, the publication gate, ratings and reviews

pub mod ads;
pub mod gate;
pub mod ratings;
pub mod record;
pub mod reviews;

pub use ads::{AdBoard, PublishOutcome};
pub use gate::{AdGate, DenyReason, PublishClaim, PublishDecision};
pub use ratings::{RatingTally, Ratings};
pub use record::{
    Ad, AdCooldown, AdPublishCount, AdRating, AdStatus, AdViolation, RatingKind, UserReview,
};
pub use reviews::{ReviewDraft, ReviewStep, Reviews};
