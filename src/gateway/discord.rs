//! Discord implementation of the chat gateway
//!
//! A chat is a guild. Mutes use the chat's muted role when one is configured,
//! otherwise a communication timeout, which Discord caps at 28 days. Moderator
//! rights are carried by the chat's moderator role.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use poise::serenity_prelude::{
    ChannelId, CreateMessage, GuildId, Http, Member, PartialGuild, RoleId, UserId,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{AdminRights, ChatGateway, GatewayError, GatewayResult, MemberRole};
use crate::config::{ChatDirectory, ChatSettings};

/// Longest timeout Discord accepts
const MAX_TIMEOUT_DAYS: i64 = 28;

/// Gateway backed by the serenity HTTP client
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
    chats: ChatDirectory,
}

impl SerenityGateway {
    pub fn new(http: Arc<Http>, chats: ChatDirectory) -> Self {
        Self { http, chats }
    }

    fn settings(&self, chat_id: u64) -> ChatSettings {
        self.chats.get(chat_id).unwrap_or(ChatSettings {
            chat_id,
            ..ChatSettings::default()
        })
    }

    async fn guild_and_member(
        &self,
        chat_id: u64,
        user_id: u64,
    ) -> GatewayResult<(PartialGuild, Member)> {
        let http: &Http = &self.http;
        let guild = GuildId::new(chat_id).to_partial_guild(http).await?;

        let member = guild
            .member(http, UserId::new(user_id))
            .await
            .map_err(|e| {
                debug!("Failed to get member {user_id} in chat {chat_id}: {e}");
                GatewayError::MemberNotFound { chat_id, user_id }
            })?;

        Ok((guild, member))
    }

    fn moderator_role(&self, chat_id: u64) -> GatewayResult<RoleId> {
        self.settings(chat_id)
            .moderator_role_id
            .map(RoleId::new)
            .ok_or(GatewayError::NotConfigured {
                chat_id,
                setting: "moderator role",
            })
    }
}

/// Strip `<@123>` / `<@!123>` mention syntax
fn mention_id(handle: &str) -> Option<u64> {
    handle
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.trim_start_matches('!'))
        .and_then(|id| id.parse().ok())
}

#[async_trait]
impl ChatGateway for SerenityGateway {
    async fn send_message(
        &self,
        channel_id: u64,
        thread_id: Option<u64>,
        text: &str,
    ) -> GatewayResult<()> {
        let http: &Http = &self.http;
        // Threads are channels of their own on Discord
        let target = ChannelId::new(thread_id.unwrap_or(channel_id));
        target.say(http, text).await?;
        Ok(())
    }

    async fn send_direct(&self, user_id: u64, text: &str) -> GatewayResult<()> {
        let http: &Http = &self.http;
        UserId::new(user_id)
            .direct_message(http, CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        until: Option<DateTime<Utc>>,
    ) -> GatewayResult<()> {
        let http: &Http = &self.http;

        if let Some(role_id) = self.settings(chat_id).muted_role_id {
            http.add_member_role(
                GuildId::new(chat_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Muted"),
            )
            .await?;
            info!("Applied muted role to user {user_id} in chat {chat_id}");
            return Ok(());
        }

        let (_, mut member) = self.guild_and_member(chat_id, user_id).await?;
        let ceiling = Utc::now() + Duration::days(MAX_TIMEOUT_DAYS);
        let timeout_until = until.map_or(ceiling, |until| until.min(ceiling));

        member
            .disable_communication_until_datetime(http, timeout_until.into())
            .await?;

        info!("Timed out user {user_id} in chat {chat_id} until {timeout_until}");
        Ok(())
    }

    async fn unrestrict(&self, chat_id: u64, user_id: u64) -> GatewayResult<()> {
        let http: &Http = &self.http;

        if let Some(role_id) = self.settings(chat_id).muted_role_id {
            http.remove_member_role(
                GuildId::new(chat_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("Mute lifted"),
            )
            .await?;
        } else {
            let (_, mut member) = self.guild_and_member(chat_id, user_id).await?;
            member.enable_communication(http).await?;
        }

        info!("Restored posting rights for user {user_id} in chat {chat_id}");
        Ok(())
    }

    async fn ban(
        &self,
        chat_id: u64,
        user_id: u64,
        until: Option<DateTime<Utc>>,
        reason: &str,
    ) -> GatewayResult<()> {
        let http: &Http = &self.http;
        // Discord bans never expire on their own; the expiry sweep unbans
        debug!("Banning user {user_id} in chat {chat_id}, expires {until:?}");

        GuildId::new(chat_id)
            .ban_with_reason(http, UserId::new(user_id), 0, reason)
            .await?;

        info!("Banned user {user_id} in chat {chat_id}");
        Ok(())
    }

    async fn unban(&self, chat_id: u64, user_id: u64) -> GatewayResult<()> {
        let http: &Http = &self.http;
        GuildId::new(chat_id)
            .unban(http, UserId::new(user_id))
            .await?;

        info!("Unbanned user {user_id} in chat {chat_id}");
        Ok(())
    }

    async fn member_role(&self, chat_id: u64, user_id: u64) -> GatewayResult<MemberRole> {
        let (guild, member) = self.guild_and_member(chat_id, user_id).await?;

        if guild.owner_id == UserId::new(user_id) {
            return Ok(MemberRole::Owner);
        }

        let moderator_role = self.settings(chat_id).moderator_role_id.map(RoleId::new);
        let is_admin = member.roles.iter().any(|role_id| {
            Some(*role_id) == moderator_role
                || guild
                    .roles
                    .get(role_id)
                    .is_some_and(|role| role.permissions.administrator())
        });

        Ok(if is_admin {
            MemberRole::Administrator
        } else {
            MemberRole::Regular
        })
    }

    async fn set_admin(
        &self,
        chat_id: u64,
        user_id: u64,
        rights: AdminRights,
    ) -> GatewayResult<()> {
        let http: &Http = &self.http;
        let role_id = self.moderator_role(chat_id)?;
        let guild_id = GuildId::new(chat_id);
        let user = UserId::new(user_id);

        if rights.is_empty() {
            http.remove_member_role(guild_id, user, role_id, Some("Demoted"))
                .await?;
            info!("Demoted user {user_id} in chat {chat_id}");
        } else {
            http.add_member_role(guild_id, user, role_id, Some("Promoted"))
                .await?;
            info!("Promoted user {user_id} in chat {chat_id} with {rights:?}");
        }
        Ok(())
    }

    async fn resolve_user(&self, chat_id: u64, handle: &str) -> GatewayResult<u64> {
        let handle = handle.trim();
        if let Ok(id) = handle.parse::<u64>() {
            return Ok(id);
        }
        if let Some(id) = mention_id(handle) {
            return Ok(id);
        }

        let name = handle.trim_start_matches('@');
        if name.is_empty() {
            return Err(GatewayError::UnknownHandle(handle.to_string()));
        }

        let http: &Http = &self.http;
        let members = GuildId::new(chat_id)
            .search_members(http, name, Some(10))
            .await?;

        members
            .iter()
            .find(|member| member.user.name.eq_ignore_ascii_case(name))
            .map(|member| member.user.id.get())
            .ok_or_else(|| GatewayError::UnknownHandle(handle.to_string()))
    }
}
