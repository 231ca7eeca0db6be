//! Punishment ledger
//!
//! The single authority for issuing and retiring warns, mutes, bans, ad
//! blocks, privilege warns and bot blocks.
//!
//! Issuing a mute or ban applies the restriction through the gateway first and
//! records it second, so a failed gateway call leaves no row behind. Lifting
//! runs the other way round: the conditional deactivation decides which caller
//! owns the lift, and only that caller talks to the gateway.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::{ModerationError, ModerationResult};
use super::record::{
    BOT_SCOPE, PrivilegeScope, PrivilegeWarn, Punishment, PunishmentKind, SYSTEM_ISSUER,
    THREE_STRIKES_REASON, Warn,
};
use super::strikes::{STRIKE_THRESHOLD, StrikeOutcome, escalate_at_threshold};
use crate::MODERATION_TARGET;
use crate::clock::Clock;
use crate::config::PolicyConfig;
use crate::gateway::{AdminRights, ChatGateway, GatewayResult};
use crate::notify::{Notifier, mention};
use crate::store::{Deactivation, Store};

/// Reason recorded for automatic mutes of users who misuse bot commands
pub const MISUSE_REASON: &str = "Bot command misuse";

/// Result of [`Ledger::issue_warn`]
#[derive(Debug, Clone, PartialEq)]
pub struct WarnOutcome {
    pub warn: Warn,
    /// Active warns of the pair after the call; 0 once escalated
    pub active_warns: usize,
    /// The ban issued when the warn reached the threshold
    pub ban: Option<Punishment>,
}

/// Result of lifting a punishment
#[derive(Debug, Clone, PartialEq)]
pub enum LiftOutcome {
    Lifted(Punishment),
    /// Nothing was active; lifting is idempotent
    NotActive,
}

#[derive(Clone)]
pub struct Ledger {
    pub(crate) store: Store,
    pub(crate) gateway: Arc<dyn ChatGateway>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Notifier,
    pub(crate) policy: PolicyConfig,
}

impl Ledger {
    pub fn new(
        store: Store,
        gateway: Arc<dyn ChatGateway>,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            notifier,
            policy,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Warn a member. The third active warn bans the member permanently and
    /// clears the pair's warns.
    ///
    /// # Errors
    /// Returns an error if the escalation ban fails; the warn itself stays recorded
    pub async fn issue_warn(
        &self,
        user_id: u64,
        chat_id: u64,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<WarnOutcome> {
        let now = self.clock.now();
        let warn = self.store.insert_warn(Warn::new(
            user_id,
            chat_id,
            reason,
            issued_by,
            now,
            now + self.policy.warn_expiry(),
        ));
        info!(
            target: MODERATION_TARGET,
            warn_id = %warn.id,
            user_id = %user_id,
            chat_id = %chat_id,
            issued_by = %issued_by,
            "Warn issued"
        );

        let active = self.store.active_warns(user_id, chat_id, now).len();
        let escalation = escalate_at_threshold(
            active,
            || {
                self.impose(
                    PunishmentKind::Ban,
                    user_id,
                    chat_id,
                    None,
                    THREE_STRIKES_REASON,
                    SYSTEM_ISSUER,
                )
            },
            || self.store.clear_warns(user_id, chat_id),
        )
        .await;
        self.persist().await?;
        let strikes = escalation.inspect_err(|e| {
            error!(
                target: MODERATION_TARGET,
                user_id = %user_id,
                chat_id = %chat_id,
                error = %e,
                "Warn escalation failed, warns kept"
            );
        })?;

        let text = format!(
            "{} received a warning ({active}/{STRIKE_THRESHOLD}): {reason}",
            mention(user_id)
        );
        self.announce(chat_id, &text).await;

        let active_warns = strikes.remaining();
        let ban = strikes.escalation();
        if let Some(ban) = &ban {
            self.announce_imposed(ban).await;
        }
        Ok(WarnOutcome {
            warn,
            active_warns,
            ban,
        })
    }

    /// Mute a member, indefinitely when `duration` is `None`
    ///
    /// # Errors
    /// Returns an error if the target is an administrator or the restriction fails
    pub async fn issue_mute(
        &self,
        user_id: u64,
        chat_id: u64,
        duration: Option<Duration>,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<Punishment> {
        self.issue(PunishmentKind::Mute, user_id, chat_id, duration, reason, issued_by)
            .await
    }

    /// Ban a member, permanently when `duration` is `None`
    ///
    /// # Errors
    /// Returns an error if the target is an administrator or the ban fails
    pub async fn issue_ban(
        &self,
        user_id: u64,
        chat_id: u64,
        duration: Option<Duration>,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<Punishment> {
        self.issue(PunishmentKind::Ban, user_id, chat_id, duration, reason, issued_by)
            .await
    }

    /// # Errors
    /// Returns an error if lifting the restriction fails; the record is inactive regardless
    pub async fn lift_mute(&self, user_id: u64, chat_id: u64) -> ModerationResult<LiftOutcome> {
        self.lift(PunishmentKind::Mute, user_id, chat_id).await
    }

    /// # Errors
    /// Returns an error if the unban fails; the record is inactive regardless
    pub async fn lift_ban(&self, user_id: u64, chat_id: u64) -> ModerationResult<LiftOutcome> {
        self.lift(PunishmentKind::Ban, user_id, chat_id).await
    }

    /// Block a member from publishing ads in a chat
    ///
    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn issue_ad_block(
        &self,
        user_id: u64,
        chat_id: u64,
        duration: Option<Duration>,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<Punishment> {
        self.issue(PunishmentKind::AdBlock, user_id, chat_id, duration, reason, issued_by)
            .await
    }

    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn lift_ad_block(&self, user_id: u64, chat_id: u64) -> ModerationResult<LiftOutcome> {
        self.lift(PunishmentKind::AdBlock, user_id, chat_id).await
    }

    /// The ad block in force for a pair
    #[must_use]
    pub fn ad_block(&self, user_id: u64, chat_id: u64) -> Option<Punishment> {
        self.in_force(PunishmentKind::AdBlock, user_id, chat_id)
    }

    #[must_use]
    pub fn is_ad_blocked(&self, user_id: u64, chat_id: u64) -> bool {
        self.ad_block(user_id, chat_id).is_some()
    }

    #[must_use]
    pub fn active_mute(&self, user_id: u64, chat_id: u64) -> Option<Punishment> {
        self.in_force(PunishmentKind::Mute, user_id, chat_id)
    }

    #[must_use]
    pub fn active_ban(&self, user_id: u64, chat_id: u64) -> Option<Punishment> {
        self.in_force(PunishmentKind::Ban, user_id, chat_id)
    }

    /// Warn a moderator. The third active admin warn revokes their rights in
    /// `chat_id` and clears their admin warns.
    ///
    /// # Errors
    /// Returns an error if revoking the rights fails; the warns are kept
    pub async fn issue_admin_warn(
        &self,
        user_id: u64,
        chat_id: u64,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<StrikeOutcome<()>> {
        let active = self.record_privilege_warn(PrivilegeScope::Admin, user_id, reason, issued_by);
        let escalation = escalate_at_threshold(
            active,
            || async {
                self.gateway
                    .set_admin(chat_id, user_id, AdminRights::none())
                    .await
                    .map_err(ModerationError::from)
            },
            || self.store.clear_privilege_warns(PrivilegeScope::Admin, user_id),
        )
        .await;
        self.persist().await?;
        let strikes = escalation?;

        let text = match &strikes {
            StrikeOutcome::Counted(active) => format!(
                "{} received an admin warning ({active}/{STRIKE_THRESHOLD}): {reason}",
                mention(user_id)
            ),
            StrikeOutcome::Escalated(()) => {
                info!(
                    target: MODERATION_TARGET,
                    user_id = %user_id,
                    chat_id = %chat_id,
                    "Moderator demoted after {STRIKE_THRESHOLD} admin warnings"
                );
                format!(
                    "{} lost moderator rights: {THREE_STRIKES_REASON}",
                    mention(user_id)
                )
            }
        };
        self.notifier.moderation_log(chat_id, &text).await;
        self.notifier.user(user_id, &text).await;
        Ok(strikes)
    }

    /// Warn a user about bot usage. The third active bot warn blocks them from the bot.
    ///
    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn issue_bot_warn(
        &self,
        user_id: u64,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<StrikeOutcome<Punishment>> {
        let active = self.record_privilege_warn(PrivilegeScope::Bot, user_id, reason, issued_by);
        let escalation = escalate_at_threshold(
            active,
            || {
                self.impose(
                    PunishmentKind::BotBlock,
                    user_id,
                    BOT_SCOPE,
                    None,
                    THREE_STRIKES_REASON,
                    SYSTEM_ISSUER,
                )
            },
            || self.store.clear_privilege_warns(PrivilegeScope::Bot, user_id),
        )
        .await;
        self.persist().await?;
        let strikes = escalation?;

        match &strikes {
            StrikeOutcome::Counted(active) => {
                let text = format!(
                    "You received a bot warning ({active}/{STRIKE_THRESHOLD}): {reason}"
                );
                self.notifier.user(user_id, &text).await;
            }
            StrikeOutcome::Escalated(block) => self.announce_imposed(block).await,
        }
        Ok(strikes)
    }

    /// Block a user from using the bot
    ///
    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn bot_block(
        &self,
        user_id: u64,
        reason: &str,
        issued_by: u64,
        duration: Option<Duration>,
    ) -> ModerationResult<Punishment> {
        self.issue(
            PunishmentKind::BotBlock,
            user_id,
            BOT_SCOPE,
            duration,
            reason,
            issued_by,
        )
        .await
    }

    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn bot_unblock(&self, user_id: u64) -> ModerationResult<LiftOutcome> {
        self.lift(PunishmentKind::BotBlock, user_id, BOT_SCOPE).await
    }

    #[must_use]
    pub fn active_bot_block(&self, user_id: u64) -> Option<Punishment> {
        self.in_force(PunishmentKind::BotBlock, user_id, BOT_SCOPE)
    }

    #[must_use]
    pub fn is_bot_blocked(&self, user_id: u64) -> bool {
        self.active_bot_block(user_id).is_some()
    }

    /// Refuse bot-blocked users
    ///
    /// # Errors
    /// Returns [`ModerationError::Blocked`] with the block's reason and expiry
    pub fn check_bot_access(&self, user_id: u64) -> ModerationResult<()> {
        match self.active_bot_block(user_id) {
            Some(block) => Err(ModerationError::Blocked {
                reason: block.reason,
                until: block.expires_at,
            }),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn active_warns(&self, user_id: u64, chat_id: u64) -> Vec<Warn> {
        self.store.active_warns(user_id, chat_id, self.clock.now())
    }

    /// Remove the newest active warn of a pair
    ///
    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn remove_last_warn(&self, user_id: u64, chat_id: u64) -> ModerationResult<Option<Warn>> {
        let Some(last) = self.active_warns(user_id, chat_id).pop() else {
            return Ok(None);
        };
        let removed = self.store.remove_warn(last.id);
        self.persist().await?;
        if removed.is_some() {
            info!(
                target: MODERATION_TARGET,
                warn_id = %last.id,
                user_id = %user_id,
                chat_id = %chat_id,
                "Warn removed"
            );
        }
        Ok(removed)
    }

    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn clear_warns(&self, user_id: u64, chat_id: u64) -> ModerationResult<usize> {
        let cleared = self.store.clear_warns(user_id, chat_id);
        self.persist().await?;
        info!(
            target: MODERATION_TARGET,
            user_id = %user_id,
            chat_id = %chat_id,
            cleared = cleared,
            "Warns cleared"
        );
        Ok(cleared)
    }

    /// # Errors
    /// Returns an error if the store cannot be saved
    pub async fn clear_admin_warns(&self, user_id: u64) -> ModerationResult<usize> {
        let cleared = self
            .store
            .clear_privilege_warns(PrivilegeScope::Admin, user_id);
        self.persist().await?;
        Ok(cleared)
    }

    /// Mute a member who used a moderation command without the rights to
    ///
    /// # Errors
    /// Returns an error if the mute fails
    pub async fn punish_command_misuse(
        &self,
        user_id: u64,
        chat_id: u64,
    ) -> ModerationResult<Punishment> {
        warn!(
            target: MODERATION_TARGET,
            user_id = %user_id,
            chat_id = %chat_id,
            "Moderation command used without rights"
        );
        self.issue_mute(
            user_id,
            chat_id,
            Some(self.policy.misuse_mute()),
            MISUSE_REASON,
            SYSTEM_ISSUER,
        )
        .await
    }

    /// Resolve a user handle in a chat
    ///
    /// # Errors
    /// Returns an error if the handle matches no member
    pub async fn resolve_user(&self, chat_id: u64, handle: &str) -> ModerationResult<u64> {
        Ok(self.gateway.resolve_user(chat_id, handle).await?)
    }

    /// Whether the member holds moderator rights in the chat. A failed
    /// lookup counts as no.
    pub async fn is_privileged(&self, user_id: u64, chat_id: u64) -> bool {
        match self.gateway.member_role(chat_id, user_id).await {
            Ok(role) => role.is_privileged(),
            Err(e) => {
                debug!("Role lookup for user {user_id} in chat {chat_id} failed: {e}");
                false
            }
        }
    }

    async fn issue(
        &self,
        kind: PunishmentKind,
        user_id: u64,
        chat_id: u64,
        duration: Option<Duration>,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<Punishment> {
        let record = self
            .impose(kind, user_id, chat_id, duration, reason, issued_by)
            .await?;
        self.persist().await?;
        self.announce_imposed(&record).await;
        Ok(record)
    }

    /// Apply the punishment on the platform, then record it. The new record
    /// supersedes the pair's active one.
    async fn impose(
        &self,
        kind: PunishmentKind,
        user_id: u64,
        chat_id: u64,
        duration: Option<Duration>,
        reason: &str,
        issued_by: u64,
    ) -> ModerationResult<Punishment> {
        let now = self.clock.now();
        let expires_at = duration.map(|duration| now + duration);

        if kind.touches_chat() {
            self.ensure_not_privileged(user_id, chat_id).await?;
            self.apply(kind, user_id, chat_id, expires_at, reason).await?;
        }

        let record = self.store.insert_punishment(Punishment::new(
            kind, user_id, chat_id, reason, issued_by, now, expires_at,
        ));
        info!(
            target: MODERATION_TARGET,
            punishment_id = %record.id,
            kind = %kind,
            user_id = %user_id,
            chat_id = %chat_id,
            issued_by = %issued_by,
            expires_at = ?record.expires_at,
            "Punishment issued"
        );
        Ok(record)
    }

    async fn lift(
        &self,
        kind: PunishmentKind,
        user_id: u64,
        chat_id: u64,
    ) -> ModerationResult<LiftOutcome> {
        let Deactivation::Deactivated(record) = self.store.deactivate_active(kind, user_id, chat_id)
        else {
            debug!("No active {kind} for user {user_id} in chat {chat_id}");
            return Ok(LiftOutcome::NotActive);
        };

        let released = self.release(&record).await;
        self.persist().await?;
        released?;

        self.announce_lifted(&record, false).await;
        Ok(LiftOutcome::Lifted(record))
    }

    /// Put a restriction in place on the platform. Ad blocks and bot blocks
    /// only exist in the store.
    pub(crate) async fn apply(
        &self,
        kind: PunishmentKind,
        user_id: u64,
        chat_id: u64,
        expires_at: Option<DateTime<Utc>>,
        reason: &str,
    ) -> GatewayResult<()> {
        match kind {
            PunishmentKind::Mute => self.gateway.restrict(chat_id, user_id, expires_at).await,
            PunishmentKind::Ban => self.gateway.ban(chat_id, user_id, expires_at, reason).await,
            PunishmentKind::AdBlock | PunishmentKind::BotBlock => Ok(()),
        }
    }

    /// Undo a punishment on the platform. Ad blocks and bot blocks only exist
    /// in the store.
    pub(crate) async fn release(&self, record: &Punishment) -> GatewayResult<()> {
        match record.kind {
            PunishmentKind::Mute => self.gateway.unrestrict(record.chat_id, record.user_id).await,
            PunishmentKind::Ban => self.gateway.unban(record.chat_id, record.user_id).await,
            PunishmentKind::AdBlock | PunishmentKind::BotBlock => Ok(()),
        }
    }

    async fn ensure_not_privileged(&self, user_id: u64, chat_id: u64) -> ModerationResult<()> {
        match self.gateway.member_role(chat_id, user_id).await {
            Ok(role) if role.is_privileged() => Err(ModerationError::validation(
                "Administrators cannot be muted or banned",
            )),
            Ok(_) => Ok(()),
            Err(e) => {
                // Former members can still be banned
                debug!("Role lookup for user {user_id} in chat {chat_id} failed: {e}");
                Ok(())
            }
        }
    }

    fn in_force(&self, kind: PunishmentKind, user_id: u64, chat_id: u64) -> Option<Punishment> {
        let now = self.clock.now();
        self.store
            .active_punishment(kind, user_id, chat_id)
            .filter(|record| record.is_in_force_at(now))
    }

    fn record_privilege_warn(
        &self,
        scope: PrivilegeScope,
        user_id: u64,
        reason: &str,
        issued_by: u64,
    ) -> usize {
        let warn = self.store.insert_privilege_warn(PrivilegeWarn::new(
            scope,
            user_id,
            reason,
            issued_by,
            self.clock.now(),
        ));
        info!(
            target: MODERATION_TARGET,
            warn_id = %warn.id,
            scope = %scope,
            user_id = %user_id,
            issued_by = %issued_by,
            "Privilege warn issued"
        );
        self.store.active_privilege_warns(scope, user_id).len()
    }

    pub(crate) async fn persist(&self) -> ModerationResult<()> {
        self.store.save().await.map_err(|e| {
            error!("Failed to save store: {e}");
            ModerationError::from(e)
        })
    }

    async fn announce(&self, chat_id: u64, text: &str) {
        tokio::join!(
            self.notifier.chat(chat_id, text),
            self.notifier.moderation_log(chat_id, text)
        );
    }

    pub(crate) async fn announce_imposed(&self, record: &Punishment) {
        let who = mention(record.user_id);
        let term = record.term();
        match record.kind {
            PunishmentKind::Mute => {
                let text = format!("{who} was muted {term}: {}", record.reason);
                self.announce(record.chat_id, &text).await;
            }
            PunishmentKind::Ban => {
                let text = format!("{who} was banned {term}: {}", record.reason);
                self.announce(record.chat_id, &text).await;
            }
            PunishmentKind::AdBlock => {
                let text = format!("{who} was blocked from posting ads {term}: {}", record.reason);
                self.notifier.moderation_log(record.chat_id, &text).await;
                self.notifier
                    .user(
                        record.user_id,
                        &format!("You can no longer post ads {term}: {}", record.reason),
                    )
                    .await;
            }
            PunishmentKind::BotBlock => {
                let text = format!("You were blocked from using the bot {term}: {}", record.reason);
                self.notifier.user(record.user_id, &text).await;
            }
        }
    }

    /// Tell everyone concerned that a punishment ended
    pub(crate) async fn announce_lifted(&self, record: &Punishment, expired: bool) {
        let who = mention(record.user_id);
        let how = if expired { "expired" } else { "was lifted" };
        match record.kind {
            PunishmentKind::Mute | PunishmentKind::Ban => {
                let text = format!("{} of {who} {how}", record.kind);
                self.announce(record.chat_id, &text).await;
            }
            PunishmentKind::AdBlock => {
                let text = format!("{} of {who} {how}", record.kind);
                self.notifier.moderation_log(record.chat_id, &text).await;
                self.notifier
                    .user(record.user_id, &format!("Your ad block {how}"))
                    .await;
            }
            PunishmentKind::BotBlock => {
                self.notifier
                    .user(record.user_id, &format!("Your bot block {how}"))
                    .await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{ChatDirectory, ChatSettings};
    use crate::gateway::MockChatGateway;
    use chrono::TimeZone;

    pub const USER: u64 = 12345;
    pub const CHAT: u64 = 67890;
    pub const MODERATOR: u64 = 555;
    pub const ANNOUNCE_CHANNEL: u64 = 1;
    pub const LOG_CHANNEL: u64 = 2;
    pub const MARKET_CHANNEL: u64 = 3;

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    pub fn chats() -> ChatDirectory {
        let chats = ChatDirectory::new();
        chats.insert(ChatSettings {
            chat_id: CHAT,
            announce_channel_id: Some(ANNOUNCE_CHANNEL),
            log_channel_id: Some(LOG_CHANNEL),
            market_channel_id: Some(MARKET_CHANNEL),
            ..ChatSettings::default()
        });
        chats
    }

    /// Accept every message and direct message
    pub fn quiet(gateway: &mut MockChatGateway) {
        gateway.expect_send_message().returning(|_, _, _| Ok(()));
        gateway.expect_send_direct().returning(|_, _| Ok(()));
    }

    pub fn ledger(gateway: MockChatGateway, clock: Arc<ManualClock>) -> Ledger {
        ledger_with_policy(gateway, clock, PolicyConfig::default())
    }

    pub fn ledger_with_policy(
        gateway: MockChatGateway,
        clock: Arc<ManualClock>,
        policy: PolicyConfig,
    ) -> Ledger {
        let gateway: Arc<dyn ChatGateway> = Arc::new(gateway);
        Ledger::new(
            Store::in_memory(),
            Arc::clone(&gateway),
            clock,
            Notifier::new(gateway, chats()),
            policy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::{GatewayError, MemberRole, MockChatGateway};
    use mockall::predicate::{always, eq};

    fn regular_members(gateway: &mut MockChatGateway) {
        gateway
            .expect_member_role()
            .returning(|_, _| Ok(MemberRole::Regular));
    }

    #[tokio::test]
    async fn test_single_active_mute_per_pair() {
        let mut gateway = MockChatGateway::new();
        regular_members(&mut gateway);
        gateway.expect_restrict().times(2).returning(|_, _, _| Ok(()));
        quiet(&mut gateway);

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        let first = ledger
            .issue_mute(USER, CHAT, Some(Duration::hours(1)), "flood", MODERATOR)
            .await
            .unwrap();
        let second = ledger
            .issue_mute(USER, CHAT, None, "flood again", MODERATOR)
            .await
            .unwrap();

        let active = ledger.store().active_punishments(PunishmentKind::Mute);
        assert_eq!(active, vec![second.clone()]);
        assert!(!ledger
            .store()
            .punishment(PunishmentKind::Mute, first.id)
            .unwrap()
            .is_active);
        assert_eq!(ledger.active_mute(USER, CHAT), Some(second));
    }

    #[tokio::test]
    async fn test_third_warn_bans_and_clears_warns() {
        let mut gateway = MockChatGateway::new();
        regular_members(&mut gateway);
        gateway
            .expect_ban()
            .with(eq(CHAT), eq(USER), eq(None), eq(THREE_STRIKES_REASON))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        gateway
            .expect_send_message()
            .withf(|channel, _, text| *channel == ANNOUNCE_CHANNEL && text.contains("was banned"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        quiet(&mut gateway);

        let clock = Arc::new(ManualClock::new(start()));
        let ledger = ledger(gateway, Arc::clone(&clock));
        for reason in ["flood", "caps"] {
            let outcome = ledger.issue_warn(USER, CHAT, reason, MODERATOR).await.unwrap();
            assert_eq!(outcome.ban, None);
            clock.advance(Duration::minutes(1));
        }
        assert_eq!(ledger.active_warns(USER, CHAT).len(), 2);

        let outcome = ledger.issue_warn(USER, CHAT, "spam", MODERATOR).await.unwrap();
        assert_eq!(outcome.active_warns, 0);
        assert!(ledger.active_warns(USER, CHAT).is_empty());

        let ban = outcome.ban.expect("third warn bans");
        assert_eq!(ban.reason, THREE_STRIKES_REASON);
        assert_eq!(ban.issued_by, SYSTEM_ISSUER);
        assert!(ban.is_permanent());
        assert_eq!(ledger.active_ban(USER, CHAT), Some(ban));
    }

    #[tokio::test]
    async fn test_failed_escalation_keeps_warns() {
        let mut gateway = MockChatGateway::new();
        regular_members(&mut gateway);
        gateway.expect_ban().times(1).returning(|chat_id, user_id, _, _| {
            Err(GatewayError::MemberNotFound { chat_id, user_id })
        });
        quiet(&mut gateway);

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        ledger.issue_warn(USER, CHAT, "a", MODERATOR).await.unwrap();
        ledger.issue_warn(USER, CHAT, "b", MODERATOR).await.unwrap();

        let result = ledger.issue_warn(USER, CHAT, "c", MODERATOR).await;
        assert!(matches!(result, Err(ModerationError::Gateway(_))));
        assert_eq!(ledger.active_warns(USER, CHAT).len(), 3);
        assert_eq!(ledger.active_ban(USER, CHAT), None);
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_no_row() {
        let mut gateway = MockChatGateway::new();
        regular_members(&mut gateway);
        gateway.expect_restrict().times(1).returning(|chat_id, user_id, _| {
            Err(GatewayError::MemberNotFound { chat_id, user_id })
        });
        gateway.expect_send_message().never();

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        let result = ledger.issue_mute(USER, CHAT, None, "flood", MODERATOR).await;

        assert!(matches!(result, Err(ModerationError::Gateway(_))));
        assert!(ledger.store().active_punishments(PunishmentKind::Mute).is_empty());
    }

    #[tokio::test]
    async fn test_administrators_cannot_be_muted() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_member_role()
            .returning(|_, _| Ok(MemberRole::Owner));
        gateway.expect_restrict().never();

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        let result = ledger.issue_mute(USER, CHAT, None, "flood", MODERATOR).await;

        assert!(matches!(result, Err(ModerationError::Validation(_))));
        assert_eq!(ledger.active_mute(USER, CHAT), None);
    }

    #[tokio::test]
    async fn test_lift_is_idempotent() {
        let mut gateway = MockChatGateway::new();
        regular_members(&mut gateway);
        gateway.expect_restrict().returning(|_, _, _| Ok(()));
        gateway
            .expect_unrestrict()
            .with(eq(CHAT), eq(USER))
            .times(1)
            .returning(|_, _| Ok(()));
        quiet(&mut gateway);

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        ledger
            .issue_mute(USER, CHAT, Some(Duration::hours(2)), "flood", MODERATOR)
            .await
            .unwrap();

        assert!(matches!(
            ledger.lift_mute(USER, CHAT).await.unwrap(),
            LiftOutcome::Lifted(_)
        ));
        assert_eq!(ledger.lift_mute(USER, CHAT).await.unwrap(), LiftOutcome::NotActive);
        assert_eq!(ledger.lift_ban(USER, CHAT).await.unwrap(), LiftOutcome::NotActive);
    }

    #[tokio::test]
    async fn test_ad_block_has_no_platform_side() {
        let mut gateway = MockChatGateway::new();
        gateway.expect_member_role().never();
        gateway.expect_restrict().never();
        quiet(&mut gateway);

        let clock = Arc::new(ManualClock::new(start()));
        let ledger = ledger(gateway, Arc::clone(&clock));
        ledger
            .issue_ad_block(USER, CHAT, Some(Duration::days(1)), "scam", MODERATOR)
            .await
            .unwrap();
        assert!(ledger.is_ad_blocked(USER, CHAT));
        assert!(!ledger.is_ad_blocked(USER, CHAT + 1));

        // Past its expiry the block no longer gates, even before a sweep
        clock.advance(Duration::days(1));
        assert!(!ledger.is_ad_blocked(USER, CHAT));

        clock.set(start());
        assert!(matches!(
            ledger.lift_ad_block(USER, CHAT).await.unwrap(),
            LiftOutcome::Lifted(_)
        ));
        assert!(!ledger.is_ad_blocked(USER, CHAT));
    }

    #[tokio::test]
    async fn test_third_admin_warn_demotes() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_set_admin()
            .with(eq(CHAT), eq(USER), eq(AdminRights::none()))
            .times(1)
            .returning(|_, _, _| Ok(()));
        quiet(&mut gateway);

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        for expected in 1..STRIKE_THRESHOLD {
            let outcome = ledger
                .issue_admin_warn(USER, CHAT, "abuse", MODERATOR)
                .await
                .unwrap();
            assert_eq!(outcome, StrikeOutcome::Counted(expected));
        }
        let outcome = ledger
            .issue_admin_warn(USER, CHAT, "abuse", MODERATOR)
            .await
            .unwrap();
        assert_eq!(outcome, StrikeOutcome::Escalated(()));
        assert!(ledger
            .store()
            .active_privilege_warns(PrivilegeScope::Admin, USER)
            .is_empty());
    }

    #[tokio::test]
    async fn test_third_bot_warn_blocks() {
        let mut gateway = MockChatGateway::new();
        gateway.expect_send_direct().with(eq(USER), always()).returning(|_, _| Ok(()));

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        ledger.issue_bot_warn(USER, "spam", MODERATOR).await.unwrap();
        ledger.issue_bot_warn(USER, "spam", MODERATOR).await.unwrap();
        assert!(ledger.check_bot_access(USER).is_ok());

        let block = ledger
            .issue_bot_warn(USER, "spam", MODERATOR)
            .await
            .unwrap()
            .escalation()
            .expect("third bot warn blocks");
        assert_eq!(block.reason, THREE_STRIKES_REASON);
        assert!(ledger.is_bot_blocked(USER));
        assert!(matches!(
            ledger.check_bot_access(USER),
            Err(ModerationError::Blocked { until: None, .. })
        ));

        assert!(matches!(
            ledger.bot_unblock(USER).await.unwrap(),
            LiftOutcome::Lifted(_)
        ));
        assert!(!ledger.is_bot_blocked(USER));
    }

    #[tokio::test]
    async fn test_remove_last_warn() {
        let mut gateway = MockChatGateway::new();
        quiet(&mut gateway);

        let clock = Arc::new(ManualClock::new(start()));
        let ledger = ledger(gateway, Arc::clone(&clock));
        ledger.issue_warn(USER, CHAT, "first", MODERATOR).await.unwrap();
        clock.advance(Duration::minutes(1));
        ledger.issue_warn(USER, CHAT, "second", MODERATOR).await.unwrap();

        let removed = ledger.remove_last_warn(USER, CHAT).await.unwrap().unwrap();
        assert_eq!(removed.reason, "second");
        assert_eq!(ledger.active_warns(USER, CHAT).len(), 1);
        assert_eq!(ledger.clear_warns(USER, CHAT).await.unwrap(), 1);
        assert_eq!(ledger.remove_last_warn(USER, CHAT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_misuse_mutes_for_configured_days() {
        let mut gateway = MockChatGateway::new();
        regular_members(&mut gateway);
        gateway
            .expect_restrict()
            .with(eq(CHAT), eq(USER), eq(Some(start() + Duration::days(1))))
            .times(1)
            .returning(|_, _, _| Ok(()));
        quiet(&mut gateway);

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        let mute = ledger.punish_command_misuse(USER, CHAT).await.unwrap();
        assert_eq!(mute.reason, MISUSE_REASON);
        assert_eq!(mute.issued_by, SYSTEM_ISSUER);
    }

    #[tokio::test]
    async fn test_privilege_lookup_failure_counts_as_regular() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_member_role()
            .with(eq(CHAT), eq(MODERATOR))
            .returning(|_, _| Ok(MemberRole::Administrator));
        gateway
            .expect_member_role()
            .returning(|chat_id, user_id| Err(GatewayError::MemberNotFound { chat_id, user_id }));

        let ledger = ledger(gateway, Arc::new(ManualClock::new(start())));
        assert!(ledger.is_privileged(MODERATOR, CHAT).await);
        assert!(!ledger.is_privileged(USER, CHAT).await);
    }
}
