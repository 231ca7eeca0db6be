//! Error types for chat platform calls

use thiserror::Error;

/// Errors returned by a [`ChatGateway`](super::ChatGateway)
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Discord API error
    #[error("Discord API error: {0}")]
    Api(#[from] Box<poise::serenity_prelude::Error>),

    /// The member is not (or no longer) in the chat
    #[error("Member {user_id} not found in chat {chat_id}")]
    MemberNotFound { chat_id: u64, user_id: u64 },

    /// A user handle could not be resolved to an id
    #[error("Unknown user: {0}")]
    UnknownHandle(String),

    /// The chat lacks the settings this call needs (channel, role)
    #[error("Chat {chat_id} has no {setting} configured")]
    NotConfigured { chat_id: u64, setting: &'static str },
}

impl From<poise::serenity_prelude::Error> for GatewayError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::Api(Box::new(error))
    }
}

/// Result type for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GatewayError::MemberNotFound {
            chat_id: 67890,
            user_id: 12345,
        };
        assert_eq!(error.to_string(), "Member 12345 not found in chat 67890");

        let error = GatewayError::UnknownHandle("@nobody".to_string());
        assert_eq!(error.to_string(), "Unknown user: @nobody");

        let error = GatewayError::NotConfigured {
            chat_id: 67890,
            setting: "muted role",
        };
        assert_eq!(error.to_string(), "Chat 67890 has no muted role configured");
    }
}
