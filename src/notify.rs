//! Outbound notifications
//!
//! Notifications are best effort: a failed delivery is logged and never fails
//! the operation that produced it.

use futures_util::StreamExt;
use futures_util::stream;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ChatDirectory;
use crate::gateway::ChatGateway;

/// Concurrent sends per broadcast
pub const FAN_OUT: usize = 8;

/// Chat mention of a user
#[must_use]
pub fn mention(user_id: u64) -> String {
    format!("<@{user_id}>")
}

#[derive(Clone)]
pub struct Notifier {
    gateway: Arc<dyn ChatGateway>,
    chats: ChatDirectory,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn ChatGateway>, chats: ChatDirectory) -> Self {
        Self { gateway, chats }
    }

    /// Announce in the chat's announcement channel. Returns whether it was delivered.
    pub async fn chat(&self, chat_id: u64, text: &str) -> bool {
        let Some(channel_id) = self
            .chats
            .get(chat_id)
            .and_then(|settings| settings.announce_channel_id)
        else {
            debug!("No announcement channel for chat {chat_id}");
            return false;
        };
        self.deliver(channel_id, None, text).await
    }

    /// Post to the chat's moderation log, inside its thread when one is set
    pub async fn moderation_log(&self, chat_id: u64, text: &str) -> bool {
        let Some(settings) = self.chats.get(chat_id) else {
            debug!("No settings for chat {chat_id}, moderation log skipped");
            return false;
        };
        let Some(channel_id) = settings.log_channel_id else {
            debug!("No moderation log for chat {chat_id}");
            return false;
        };
        self.deliver(channel_id, settings.log_thread_id, text).await
    }

    /// Private message to a user
    pub async fn user(&self, user_id: u64, text: &str) -> bool {
        match self.gateway.send_direct(user_id, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to message user {user_id}: {e}");
                false
            }
        }
    }

    /// Private message to many users with bounded concurrency. Returns how many got it.
    pub async fn broadcast_users(&self, user_ids: &[u64], text: &str) -> usize {
        let delivered: Vec<bool> = stream::iter(user_ids.iter().copied())
            .map(|user_id| self.user(user_id, text))
            .buffer_unordered(FAN_OUT)
            .collect()
            .await;
        delivered.into_iter().filter(|ok| *ok).count()
    }

    async fn deliver(&self, channel_id: u64, thread_id: Option<u64>, text: &str) -> bool {
        match self.gateway.send_message(channel_id, thread_id, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to post to channel {channel_id}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatSettings;
    use crate::gateway::{GatewayError, MockChatGateway};
    use mockall::predicate::{always, eq};

    fn chats() -> ChatDirectory {
        let chats = ChatDirectory::new();
        chats.insert(ChatSettings {
            chat_id: 10,
            announce_channel_id: Some(100),
            log_channel_id: Some(200),
            log_thread_id: Some(201),
            ..ChatSettings::default()
        });
        chats
    }

    #[tokio::test]
    async fn test_routes_to_configured_channels() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_send_message()
            .with(eq(100), eq(None), eq("hello"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        gateway
            .expect_send_message()
            .with(eq(200), eq(Some(201)), eq("log"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let notifier = Notifier::new(Arc::new(gateway), chats());
        assert!(notifier.chat(10, "hello").await);
        assert!(notifier.moderation_log(10, "log").await);
        // Unknown chat: nothing sent
        assert!(!notifier.chat(11, "hello").await);
    }

    #[tokio::test]
    async fn test_broadcast_counts_deliveries() {
        let mut gateway = MockChatGateway::new();
        gateway
            .expect_send_direct()
            .with(eq(2), always())
            .returning(|user_id, _| Err(GatewayError::UnknownHandle(user_id.to_string())));
        gateway
            .expect_send_direct()
            .returning(|_, _| Ok(()));

        let notifier = Notifier::new(Arc::new(gateway), ChatDirectory::new());
        assert_eq!(notifier.broadcast_users(&[1, 2, 3], "new complaint").await, 2);
    }
}
