//! Marketplace ads
//!
//! Drafts are created from a user's private conversation with the bot and
//! published to the chat's market channel once the gate allows it.

use tracing::{info, warn};

use super::gate::{AdGate, DenyReason, PublishDecision};
use super::record::{Ad, AdStatus};
use crate::MODERATION_TARGET;
use crate::config::ChatDirectory;
use crate::gateway::GatewayError;
use crate::moderation::{Ledger, ModerationError, ModerationResult, ensure_min_len};

/// Photos allowed per ad
pub const MAX_PHOTOS: usize = 10;

/// Minimum description length
pub const MIN_DESCRIPTION_CHARS: usize = 10;

/// Result of [`AdBoard::publish`]
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Published(Ad),
    /// The gate refused; the attempt was counted as a violation
    Denied {
        reason: DenyReason,
        violations_today: u32,
    },
}

#[derive(Clone)]
pub struct AdBoard {
    ledger: Ledger,
    gate: AdGate,
    chats: ChatDirectory,
}

impl AdBoard {
    #[must_use]
    pub fn new(ledger: Ledger, gate: AdGate, chats: ChatDirectory) -> Self {
        Self {
            ledger,
            gate,
            chats,
        }
    }

    /// Create a draft ad
    ///
    /// # Errors
    /// Returns an error if the user is bot-blocked or a field fails validation
    pub async fn create_draft(
        &self,
        user_id: u64,
        username: &str,
        description: &str,
        price: &str,
        photos: Vec<String>,
    ) -> ModerationResult<Ad> {
        self.ledger.check_bot_access(user_id)?;
        ensure_min_len(description, MIN_DESCRIPTION_CHARS, "Description")?;
        if price.trim().is_empty() {
            return Err(ModerationError::validation("Price must not be empty"));
        }
        if photos.len() > MAX_PHOTOS {
            return Err(ModerationError::validation(format!(
                "An ad can have at most {MAX_PHOTOS} photos"
            )));
        }

        let ad = self.ledger.store.insert_ad(Ad {
            id: 0,
            user_id,
            photos,
            description: description.trim().to_string(),
            price: price.trim().to_string(),
            username: username.to_string(),
            created_at: self.ledger.now(),
            status: AdStatus::Draft,
            published_at: None,
        });
        self.ledger.persist().await?;

        info!(ad_id = %ad.id, user_id = %user_id, "Ad draft created");
        Ok(ad)
    }

    /// Post a draft to the chat's market channel if the gate allows it. A user
    /// publishes one ad at a time, so the gate check and the recorded publish
    /// cannot interleave with another publish of theirs.
    ///
    /// # Errors
    /// Returns an error if the ad is not the caller's draft, the chat has no
    /// market channel, another publish of the user is in flight, or posting fails
    pub async fn publish(
        &self,
        ad_id: u64,
        user_id: u64,
        chat_id: u64,
    ) -> ModerationResult<PublishOutcome> {
        self.ledger.check_bot_access(user_id)?;
        let Some(_claim) = self.gate.claim(user_id) else {
            return Err(ModerationError::conflict(
                "Another of your ads is being published, try again in a moment",
            ));
        };
        let ad = self.owned(ad_id, user_id)?;
        if ad.status == AdStatus::Published {
            return Err(ModerationError::conflict(format!(
                "Ad #{ad_id} is already published"
            )));
        }

        if let PublishDecision::Denied(reason) = self.gate.can_publish(user_id, chat_id) {
            let violations_today = self.gate.record_violation(user_id);
            self.ledger.persist().await?;
            warn!(
                target: MODERATION_TARGET,
                user_id = %user_id,
                chat_id = %chat_id,
                violations_today = violations_today,
                "Ad publish denied: {reason}"
            );
            return Ok(PublishOutcome::Denied {
                reason,
                violations_today,
            });
        }

        let channel_id = self
            .chats
            .get(chat_id)
            .and_then(|settings| settings.market_channel_id)
            .ok_or(GatewayError::NotConfigured {
                chat_id,
                setting: "market_channel_id",
            })?;
        self.ledger
            .gateway
            .send_message(channel_id, None, &ad.render())
            .await?;

        let published = self
            .ledger
            .store
            .mark_published(ad_id, self.ledger.now())
            .ok_or_else(|| ModerationError::conflict(format!("Ad #{ad_id} is already published")))?;
        self.gate.record_publish(user_id);
        self.ledger.persist().await?;

        info!(
            target: MODERATION_TARGET,
            ad_id = %ad_id,
            user_id = %user_id,
            chat_id = %chat_id,
            "Ad published"
        );
        Ok(PublishOutcome::Published(published))
    }

    /// Delete one of the caller's ads, draft or published
    ///
    /// # Errors
    /// Returns [`ModerationError::NotFound`] if the ad does not exist or is not the caller's
    pub async fn delete(&self, ad_id: u64, user_id: u64) -> ModerationResult<Ad> {
        let ad = self
            .ledger
            .store
            .delete_ad(ad_id, user_id)
            .ok_or_else(|| ModerationError::not_found(format!("ad #{ad_id}")))?;
        self.ledger.persist().await?;
        info!(ad_id = %ad_id, user_id = %user_id, "Ad deleted");
        Ok(ad)
    }

    #[must_use]
    pub fn ads_of(&self, user_id: u64) -> Vec<Ad> {
        self.ledger.store.ads_of(user_id)
    }

    fn owned(&self, ad_id: u64, user_id: u64) -> ModerationResult<Ad> {
        self.ledger
            .store
            .ad(ad_id)
            .filter(|ad| ad.user_id == user_id)
            .ok_or_else(|| ModerationError::not_found(format!("ad #{ad_id}")))
    }
}
