//! Chat platform gateway
//!
//! The rest of the crate never talks to the chat platform directly. It goes
//! through the [`ChatGateway`] capability, injected into every component, so
//! tests can substitute a mock.

mod discord;
mod error;

pub use discord::SerenityGateway;
pub use error::{GatewayError, GatewayResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Role of a member in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRole {
    Regular,
    Administrator,
    Owner,
}

impl MemberRole {
    /// Administrators and owners must never stay muted or banned
    #[must_use]
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Administrator | Self::Owner)
    }
}

/// Capability set granted when promoting a member. The empty set demotes.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminRights {
    pub can_delete_messages: bool,
    pub can_restrict_members: bool,
    pub can_pin_messages: bool,
    pub can_invite_users: bool,
    pub can_manage_threads: bool,
}

impl AdminRights {
    /// No rights at all; applying this demotes the member
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// The rights given to chat moderators
    #[must_use]
    pub fn moderator() -> Self {
        Self {
            can_delete_messages: true,
            can_restrict_members: true,
            can_pin_messages: true,
            can_invite_users: true,
            can_manage_threads: true,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }
}

/// Capabilities consumed from the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Post a message to a channel, optionally inside one of its threads
    async fn send_message(
        &self,
        channel_id: u64,
        thread_id: Option<u64>,
        text: &str,
    ) -> GatewayResult<()>;

    /// Send a private message to a user
    async fn send_direct(&self, user_id: u64, text: &str) -> GatewayResult<()>;

    /// Revoke posting rights, until the given instant or indefinitely
    async fn restrict(
        &self,
        chat_id: u64,
        user_id: u64,
        until: Option<DateTime<Utc>>,
    ) -> GatewayResult<()>;

    /// Restore posting rights
    async fn unrestrict(&self, chat_id: u64, user_id: u64) -> GatewayResult<()>;

    /// Remove a member from the chat
    async fn ban(
        &self,
        chat_id: u64,
        user_id: u64,
        until: Option<DateTime<Utc>>,
        reason: &str,
    ) -> GatewayResult<()>;

    /// Allow a banned member back
    async fn unban(&self, chat_id: u64, user_id: u64) -> GatewayResult<()>;

    /// Look up the current role of a member
    async fn member_role(&self, chat_id: u64, user_id: u64) -> GatewayResult<MemberRole>;

    /// Promote with the given rights, or demote with [`AdminRights::none`]
    async fn set_admin(&self, chat_id: u64, user_id: u64, rights: AdminRights)
    -> GatewayResult<()>;

    /// Resolve a numeric id, a mention or an `@name` handle to a user id
    async fn resolve_user(&self, chat_id: u64, handle: &str) -> GatewayResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privileged_roles() {
        assert!(!MemberRole::Regular.is_privileged());
        assert!(MemberRole::Administrator.is_privileged());
        assert!(MemberRole::Owner.is_privileged());
    }

    #[test]
    fn test_admin_rights() {
        assert!(AdminRights::none().is_empty());
        assert!(!AdminRights::moderator().is_empty());
        assert!(AdminRights::moderator().can_restrict_members);
    }
}
