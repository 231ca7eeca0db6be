//! Punishment records
//!
//! This module defines the records kept for every warn, mute, ban, ad block,
//! bot block and privilege warning, together with their expiry rules.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::MODERATION_TARGET;

/// Issuer recorded for actions the bot takes on its own (escalations, misuse mutes)
pub const SYSTEM_ISSUER: u64 = 0;

/// Chat id used for bot-wide records that are not tied to a chat
pub const BOT_SCOPE: u64 = 0;

/// Reason recorded when a strike counter escalates
pub const THREE_STRIKES_REASON: &str = "3 warnings";

/// Kind of punishment with an active/inactive lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum PunishmentKind {
    /// Posting rights revoked in a chat
    Mute,
    /// Removed from a chat
    Ban,
    /// Not allowed to publish marketplace ads in a chat
    #[display("Ad block")]
    AdBlock,
    /// Not allowed to use the bot at all
    #[display("Bot block")]
    BotBlock,
}

impl PunishmentKind {
    /// Every kind, in sweep order
    pub const ALL: [Self; 4] = [Self::Mute, Self::Ban, Self::AdBlock, Self::BotBlock];

    /// Whether the punishment is mirrored by a restriction on the chat platform
    #[must_use]
    pub fn touches_chat(self) -> bool {
        matches!(self, Self::Mute | Self::Ban)
    }
}

/// A mute, ban, ad block or bot block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Punishment {
    pub id: u64,
    pub kind: PunishmentKind,
    pub user_id: u64,
    /// [`BOT_SCOPE`] for bot blocks
    pub chat_id: u64,
    pub reason: String,
    pub issued_by: u64,
    pub issued_at: DateTime<Utc>,
    /// `None` means the punishment only ends when lifted explicitly
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Punishment {
    /// Create a new active record; the store assigns the id on insert
    pub fn new(
        kind: PunishmentKind,
        user_id: u64,
        chat_id: u64,
        reason: impl Into<String>,
        issued_by: u64,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: 0,
            kind,
            user_id,
            chat_id,
            reason: reason.into(),
            issued_by,
            issued_at,
            expires_at,
            is_active: true,
        }
    }

    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }

    /// Whether the nominal expiry has passed, regardless of `is_active`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Active and not yet expired
    #[must_use]
    pub fn is_in_force_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// Mark the record inactive. Returns `false` if it already was.
    pub fn deactivate(&mut self) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;

        info!(
            target: MODERATION_TARGET,
            punishment_id = %self.id,
            kind = %self.kind,
            user_id = %self.user_id,
            chat_id = %self.chat_id,
            "Punishment deactivated"
        );
        true
    }

    /// Human readable term, e.g. "permanently" or "until 2024-03-01 12:00 UTC"
    #[must_use]
    pub fn term(&self) -> String {
        describe_until(self.expires_at.as_ref())
    }
}

/// Render an optional end instant for user-facing messages
#[must_use]
pub fn describe_until(until: Option<&DateTime<Utc>>) -> String {
    until.map_or_else(
        || "permanently".to_string(),
        |at| format!("until {}", at.format("%Y-%m-%d %H:%M UTC")),
    )
}

/// A chat-level warning. Active while `expires_at > now`; there is no flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warn {
    pub id: u64,
    pub user_id: u64,
    pub chat_id: u64,
    pub reason: String,
    pub issued_by: u64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Warn {
    pub fn new(
        user_id: u64,
        chat_id: u64,
        reason: impl Into<String>,
        issued_by: u64,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            chat_id,
            reason: reason.into(),
            issued_by,
            issued_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Which privilege a [`PrivilegeWarn`] counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum PrivilegeScope {
    /// Moderator rights; three strikes revoke them
    #[display("admin")]
    Admin,
    /// Bot usage; three strikes block the user from the bot
    #[display("bot")]
    Bot,
}

/// Bot-wide warning against a privilege rather than chat membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivilegeWarn {
    pub id: u64,
    pub scope: PrivilegeScope,
    pub user_id: u64,
    pub reason: String,
    pub issued_by: u64,
    pub issued_at: DateTime<Utc>,
    pub is_active: bool,
}

impl PrivilegeWarn {
    pub fn new(
        scope: PrivilegeScope,
        user_id: u64,
        reason: impl Into<String>,
        issued_by: u64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            scope,
            user_id,
            reason: reason.into(),
            issued_by,
            issued_at,
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_punishment_expiry() {
        let mute = Punishment::new(
            PunishmentKind::Mute,
            12345,
            67890,
            "spam",
            1,
            at(10),
            Some(at(12)),
        );
        assert!(mute.is_in_force_at(at(11)));
        assert!(mute.is_expired_at(at(12)));
        assert!(!mute.is_in_force_at(at(12)));
        assert!(!mute.is_permanent());

        let ban = Punishment::new(PunishmentKind::Ban, 12345, 67890, "spam", 1, at(10), None);
        assert!(ban.is_permanent());
        assert!(ban.is_in_force_at(at(10) + Duration::days(3650)));
    }

    #[test]
    fn test_deactivate_only_once() {
        let mut mute =
            Punishment::new(PunishmentKind::Mute, 12345, 67890, "spam", 1, at(10), None);
        assert!(mute.deactivate());
        assert!(!mute.is_active);
        assert!(!mute.deactivate());
        assert!(!mute.is_in_force_at(at(10)));
    }

    #[test]
    fn test_only_mutes_and_bans_touch_the_chat() {
        let touching: Vec<PunishmentKind> = PunishmentKind::ALL
            .into_iter()
            .filter(|kind| kind.touches_chat())
            .collect();
        assert_eq!(touching, vec![PunishmentKind::Mute, PunishmentKind::Ban]);
    }

    #[test]
    fn test_warn_activity_is_time_based() {
        let warn = Warn::new(12345, 67890, "flood", 1, at(10), at(14));
        assert!(warn.is_active_at(at(13)));
        assert!(!warn.is_active_at(at(14)));
    }

    #[test]
    fn test_term_rendering() {
        assert_eq!(describe_until(None), "permanently");
        assert_eq!(describe_until(Some(&at(12))), "until 2024-03-01 12:00 UTC");
        assert_eq!(PunishmentKind::AdBlock.to_string(), "Ad block");
        assert_eq!(PunishmentKind::Mute.to_string(), "Mute");
    }
}
