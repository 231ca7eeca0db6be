use poise::serenity_prelude::{self as serenity, Context, EventHandler, GuildId, Message, Ready};
use tracing::{debug, info, warn};

use crate::complaints::FilingProgress;
use crate::market::ReviewStep;
use crate::moderation::ModerationError;
use crate::{Data, EVENT_TARGET};

pub struct Handler {
    data: Data,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self { data }
    }
}

/// Feed a private message into the user's complaint or review conversation.
/// Returns the reply, or `None` when no conversation is in progress.
pub async fn route_direct_message(data: &Data, user_id: u64, text: &str) -> Option<String> {
    if data.filing.in_progress(user_id).is_some() {
        let reply = match data.filing.submit(user_id, text).await {
            Ok(FilingProgress::Next(step)) => step.prompt().to_string(),
            Ok(FilingProgress::Filed(complaint)) => format!(
                "Complaint #{} filed. You will be notified once it is reviewed.",
                complaint.id
            ),
            Err(e) => failure_reply(&e),
        };
        return Some(reply);
    }

    let draft = data.reviews.in_progress(user_id)?;
    let reply = match draft.step {
        ReviewStep::ChoosingRating => match text.trim().parse::<u8>() {
            Ok(stars) => match data.reviews.rate(user_id, stars) {
                Ok(_) => "Now write your review".to_string(),
                Err(e) => failure_reply(&e),
            },
            Err(_) => "Send a number from 1 to 5".to_string(),
        },
        ReviewStep::WritingText => match data.reviews.submit_text(user_id, text).await {
            Ok(_) => "Thanks, your review was published".to_string(),
            Err(e) => failure_reply(&e),
        },
    };
    Some(reply)
}

fn failure_reply(error: &ModerationError) -> String {
    match error {
        ModerationError::Gateway(_) | ModerationError::Storage(_) => {
            warn!(target: EVENT_TARGET, "Conversation step failed: {error}");
            "Something went wrong, try again later".to_string()
        }
        other => other.to_string(),
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        let configured = guilds
            .iter()
            .filter(|guild| self.data.chat_settings(**guild).is_some())
            .count();
        info!(
            target: EVENT_TARGET,
            "Cache ready! The bot is in {guild_count} guild(s), {configured} configured"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.guild_id.is_some() {
            return;
        }
        let user_id = msg.author.id.get();
        let Some(reply) = route_direct_message(&self.data, user_id, &msg.content).await else {
            debug!(target: EVENT_TARGET, "Ignoring private message from {user_id}");
            return;
        };
        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            warn!(target: EVENT_TARGET, "Failed to reply to {user_id}: {e}");
        }
    }
}
