//! Slash commands
//!
//! Thin glue between poise and the services in [`Data`]. Moderation commands
//! are only for members with moderator rights; using one without them earns a
//! mute. Bot administration commands are reserved to the configured admin ids.

use chrono::Duration;
use poise::serenity_prelude as serenity;
use poise::{ChoiceParameter, Context, CreateReply, command};
use tracing::warn;

use crate::complaints::{Resolution, ResolutionOutcome};
use crate::market::{PublishOutcome, RatingKind};
use crate::moderation::{
    LiftOutcome, ModerationError, ModerationResult, ReconcileRequest, StrikeOutcome,
};
use crate::notify::mention;
use crate::{Data, Error};

type Ctx<'a> = Context<'a, Data, Error>;

/// Parse `30m`, `12h`, `7d` or `2w`. `None` means permanent.
///
/// # Errors
/// Returns [`ModerationError::Validation`] for anything else
pub fn parse_duration(raw: Option<&str>) -> ModerationResult<Option<Duration>> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    let invalid = || ModerationError::Validation(format!("Invalid duration {raw:?}, use 30m, 12h, 7d or 2w"));

    let split = raw.len() - raw.chars().last().map_or(0, char::len_utf8);
    let (amount, unit) = raw.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }
    let duration = match unit {
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    };
    duration.map(Some).ok_or_else(invalid)
}

fn chat_id(ctx: Ctx<'_>) -> Result<u64, Error> {
    Ok(ctx
        .guild_id()
        .ok_or("This command only works in a server")?
        .get())
}

/// Reply with the outcome. Refusals are shown to the caller only; platform and
/// storage failures go to the error handler.
async fn respond(ctx: Ctx<'_>, result: ModerationResult<String>) -> Result<(), Error> {
    match result {
        Ok(text) => {
            ctx.say(text).await?;
            Ok(())
        }
        Err(e @ (ModerationError::Gateway(_) | ModerationError::Storage(_))) => {
            ctx.send(
                CreateReply::default()
                    .content("Something went wrong, try again later")
                    .ephemeral(true),
            )
            .await?;
            Err(e.into())
        }
        Err(e) => {
            ctx.send(CreateReply::default().content(e.to_string()).ephemeral(true))
                .await?;
            Ok(())
        }
    }
}

async fn refuse(ctx: Ctx<'_>, text: &str) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// The chat id if the caller is a moderator there. Anyone else is muted for
/// misusing the command.
async fn moderator_chat(ctx: Ctx<'_>) -> Result<Option<u64>, Error> {
    let chat_id = chat_id(ctx)?;
    let user_id = ctx.author().id.get();
    let ledger = &ctx.data().ledger;
    if ledger.is_privileged(user_id, chat_id).await {
        return Ok(Some(chat_id));
    }

    if let Err(e) = ledger.punish_command_misuse(user_id, chat_id).await {
        warn!("Could not mute user {user_id} for command misuse: {e}");
    }
    refuse(ctx, "You are not allowed to use this command").await?;
    Ok(None)
}

async fn bot_admin(ctx: Ctx<'_>) -> Result<bool, Error> {
    if ctx.data().is_admin(ctx.author().id.get()) {
        return Ok(true);
    }
    refuse(ctx, "Only bot administrators can use this command").await?;
    Ok(false)
}

fn lifted(outcome: &LiftOutcome, user_id: u64, what: &str) -> String {
    match outcome {
        LiftOutcome::Lifted(_) => format!("{what} of {} lifted", mention(user_id)),
        LiftOutcome::NotActive => format!("{} has no active {what}", mention(user_id)),
    }
}

/// Warn a member. The third active warning bans them.
#[command(slash_command, guild_only)]
pub async fn warn(
    ctx: Ctx<'_>,
    #[description = "Member to warn (@name, mention or id)"] user: String,
    #[description = "Reason"] reason: String,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let outcome = ledger
            .issue_warn(user_id, chat_id, &reason, ctx.author().id.get())
            .await?;
        Ok::<_, ModerationError>(match outcome.ban {
            Some(_) => format!("{} reached 3 warnings and was banned", mention(user_id)),
            None => format!(
                "{} warned ({}/3): {reason}",
                mention(user_id),
                outcome.active_warns
            ),
        })
    }
    .await;
    respond(ctx, result).await
}

/// Remove a member's most recent warning
#[command(slash_command, guild_only)]
pub async fn unwarn(
    ctx: Ctx<'_>,
    #[description = "Member (@name, mention or id)"] user: String,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        Ok::<_, ModerationError>(match ledger.remove_last_warn(user_id, chat_id).await? {
            Some(_) => format!("Removed the last warning of {}", mention(user_id)),
            None => format!("{} has no active warnings", mention(user_id)),
        })
    }
    .await;
    respond(ctx, result).await
}

/// List a member's active warnings
#[command(slash_command, guild_only)]
pub async fn warns(
    ctx: Ctx<'_>,
    #[description = "Member (@name, mention or id)"] user: String,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let warns = ledger.active_warns(user_id, chat_id);
        if warns.is_empty() {
            return Ok::<_, ModerationError>(format!("{} has no active warnings", mention(user_id)));
        }
        let lines: Vec<String> = warns
            .iter()
            .map(|w| {
                format!(
                    "#{} {} (by {}, expires {})",
                    w.id,
                    w.reason,
                    mention(w.issued_by),
                    w.expires_at.format("%Y-%m-%d %H:%M UTC")
                )
            })
            .collect();
        Ok::<_, ModerationError>(format!(
            "Active warnings of {}:\n{}",
            mention(user_id),
            lines.join("\n")
        ))
    }
    .await;
    respond(ctx, result).await
}

/// Mute a member
#[command(slash_command, guild_only)]
pub async fn mute(
    ctx: Ctx<'_>,
    #[description = "Member (@name, mention or id)"] user: String,
    #[description = "Reason"] reason: String,
    #[description = "Duration such as 30m, 12h or 7d; permanent if omitted"]
    duration: Option<String>,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let duration = parse_duration(duration.as_deref())?;
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let mute = ledger
            .issue_mute(user_id, chat_id, duration, &reason, ctx.author().id.get())
            .await?;
        Ok::<_, ModerationError>(format!("{} muted {}", mention(user_id), mute.term()))
    }
    .await;
    respond(ctx, result).await
}

/// Lift a member's mute
#[command(slash_command, guild_only)]
pub async fn unmute(
    ctx: Ctx<'_>,
    #[description = "Member (@name, mention or id)"] user: String,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let outcome = ledger.lift_mute(user_id, chat_id).await?;
        Ok::<_, ModerationError>(lifted(&outcome, user_id, "mute"))
    }
    .await;
    respond(ctx, result).await
}

/// Ban a member
#[command(slash_command, guild_only)]
pub async fn ban(
    ctx: Ctx<'_>,
    #[description = "Member (@name, mention or id)"] user: String,
    #[description = "Reason"] reason: String,
    #[description = "Duration such as 30m, 12h or 7d; permanent if omitted"]
    duration: Option<String>,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let duration = parse_duration(duration.as_deref())?;
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let ban = ledger
            .issue_ban(user_id, chat_id, duration, &reason, ctx.author().id.get())
            .await?;
        Ok::<_, ModerationError>(format!("{} banned {}", mention(user_id), ban.term()))
    }
    .await;
    respond(ctx, result).await
}

/// Lift a ban
#[command(slash_command, guild_only)]
pub async fn unban(
    ctx: Ctx<'_>,
    #[description = "User (mention or id)"] user: String,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let outcome = ledger.lift_ban(user_id, chat_id).await?;
        Ok::<_, ModerationError>(lifted(&outcome, user_id, "ban"))
    }
    .await;
    respond(ctx, result).await
}

/// Block a member from publishing ads
#[command(slash_command, guild_only)]
pub async fn adblock(
    ctx: Ctx<'_>,
    #[description = "Member (@name, mention or id)"] user: String,
    #[description = "Reason"] reason: String,
    #[description = "Duration such as 30m, 12h or 7d; permanent if omitted"]
    duration: Option<String>,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let duration = parse_duration(duration.as_deref())?;
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let block = ledger
            .issue_ad_block(user_id, chat_id, duration, &reason, ctx.author().id.get())
            .await?;
        Ok::<_, ModerationError>(format!(
            "{} can no longer publish ads {}",
            mention(user_id),
            block.term()
        ))
    }
    .await;
    respond(ctx, result).await
}

/// Lift an ad block
#[command(slash_command, guild_only)]
pub async fn unadblock(
    ctx: Ctx<'_>,
    #[description = "Member (@name, mention or id)"] user: String,
) -> Result<(), Error> {
    let Some(chat_id) = moderator_chat(ctx).await? else {
        return Ok(());
    };
    let ledger = &ctx.data().ledger;
    let result = async {
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        let outcome = ledger.lift_ad_block(user_id, chat_id).await?;
        Ok::<_, ModerationError>(lifted(&outcome, user_id, "ad block"))
    }
    .await;
    respond(ctx, result).await
}

/// Warn a moderator. The third warning removes their rights.
#[command(slash_command, guild_only)]
pub async fn adminwarn(
    ctx: Ctx<'_>,
    #[description = "Moderator (@name, mention or id)"] user: String,
    #[description = "Reason"] reason: String,
) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    let chat_id = chat_id(ctx)?;
    let ledger = &ctx.data().ledger;
    let result = async {
        let user_id = ledger.resolve_user(chat_id, &user).await?;
        Ok::<_, ModerationError>(
            match ledger
                .issue_admin_warn(user_id, chat_id, &reason, ctx.author().id.get())
                .await?
            {
                StrikeOutcome::Counted(active) => {
                    format!("{} received an admin warning ({active}/3)", mention(user_id))
                }
                StrikeOutcome::Escalated(()) => {
                    format!("{} lost moderator rights", mention(user_id))
                }
            },
        )
    }
    .await;
    respond(ctx, result).await
}

/// Warn a user about bot usage. The third warning blocks them from the bot.
#[command(slash_command)]
pub async fn botwarn(
    ctx: Ctx<'_>,
    #[description = "User"] user: serenity::User,
    #[description = "Reason"] reason: String,
) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    let user_id = user.id.get();
    let result = ctx
        .data()
        .ledger
        .issue_bot_warn(user_id, &reason, ctx.author().id.get())
        .await
        .map(|outcome| match outcome {
            StrikeOutcome::Counted(active) => {
                format!("{} received a bot warning ({active}/3)", mention(user_id))
            }
            StrikeOutcome::Escalated(_) => {
                format!("{} is now blocked from the bot", mention(user_id))
            }
        });
    respond(ctx, result).await
}

/// Block a user from the bot
#[command(slash_command)]
pub async fn botblock(
    ctx: Ctx<'_>,
    #[description = "User"] user: serenity::User,
    #[description = "Reason"] reason: String,
    #[description = "Duration such as 30m, 12h or 7d; permanent if omitted"]
    duration: Option<String>,
) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    let user_id = user.id.get();
    let ledger = &ctx.data().ledger;
    let result = async {
        let duration = parse_duration(duration.as_deref())?;
        let block = ledger
            .bot_block(user_id, &reason, ctx.author().id.get(), duration)
            .await?;
        Ok::<_, ModerationError>(format!(
            "{} is blocked from the bot {}",
            mention(user_id),
            block.term()
        ))
    }
    .await;
    respond(ctx, result).await
}

/// Lift a bot block
#[command(slash_command)]
pub async fn botunblock(
    ctx: Ctx<'_>,
    #[description = "User"] user: serenity::User,
) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    let user_id = user.id.get();
    let result = ctx
        .data()
        .ledger
        .bot_unblock(user_id)
        .await
        .map(|outcome| lifted(&outcome, user_id, "bot block"));
    respond(ctx, result).await
}

/// Expire due punishments now instead of waiting for the next sweep
#[command(slash_command)]
pub async fn sweep(ctx: Ctx<'_>) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    if ctx.data().request_reconcile(ReconcileRequest::SweepNow).await {
        refuse(ctx, "Sweep requested").await
    } else {
        refuse(ctx, "The sweep loop is not running").await
    }
}

/// Create a draft ad
#[command(slash_command)]
pub async fn ad_new(
    ctx: Ctx<'_>,
    #[description = "What you are selling"] description: String,
    #[description = "Price"] price: String,
    #[description = "Photo"] photo: Option<serenity::Attachment>,
) -> Result<(), Error> {
    let author = ctx.author();
    let username = format!("@{}", author.name);
    let photos = photo.map(|p| p.url).into_iter().collect();
    let result = ctx
        .data()
        .ads
        .create_draft(author.id.get(), &username, &description, &price, photos)
        .await
        .map(|ad| {
            format!(
                "Draft #{} saved. Publish it with /ad_publish in a server.\n\n{}",
                ad.id,
                ad.render()
            )
        });
    respond(ctx, result).await
}

/// Publish one of your draft ads to this server's market channel
#[command(slash_command, guild_only)]
pub async fn ad_publish(
    ctx: Ctx<'_>,
    #[description = "Draft number"] ad_id: u64,
) -> Result<(), Error> {
    let chat_id = chat_id(ctx)?;
    let result = ctx
        .data()
        .ads
        .publish(ad_id, ctx.author().id.get(), chat_id)
        .await
        .map(|outcome| match outcome {
            PublishOutcome::Published(ad) => format!("Ad #{} published", ad.id),
            PublishOutcome::Denied {
                reason,
                violations_today,
            } => format!("{reason} (attempts refused today: {violations_today})"),
        });
    respond(ctx, result).await
}

/// Delete one of your ads
#[command(slash_command)]
pub async fn ad_delete(
    ctx: Ctx<'_>,
    #[description = "Ad number"] ad_id: u64,
) -> Result<(), Error> {
    let result = ctx
        .data()
        .ads
        .delete(ad_id, ctx.author().id.get())
        .await
        .map(|ad| format!("Ad #{} deleted", ad.id));
    respond(ctx, result).await
}

/// List your ads
#[command(slash_command)]
pub async fn my_ads(ctx: Ctx<'_>) -> Result<(), Error> {
    let ads = ctx.data().ads.ads_of(ctx.author().id.get());
    let text = if ads.is_empty() {
        "You have no ads".to_string()
    } else {
        ads.iter()
            .map(|ad| format!("#{} [{}] {} ({})", ad.id, ad.status, ad.description, ad.price))
            .collect::<Vec<_>>()
            .join("\n")
    };
    refuse(ctx, &text).await
}

#[derive(Debug, Clone, Copy, ChoiceParameter)]
pub enum RatingChoice {
    Like,
    Dislike,
}

impl From<RatingChoice> for RatingKind {
    fn from(choice: RatingChoice) -> Self {
        match choice {
            RatingChoice::Like => Self::Like,
            RatingChoice::Dislike => Self::Dislike,
        }
    }
}

/// Like or dislike an ad, once
#[command(slash_command)]
pub async fn rate(
    ctx: Ctx<'_>,
    #[description = "Ad number"] ad_id: u64,
    #[description = "Your rating"] rating: RatingChoice,
) -> Result<(), Error> {
    let result = ctx
        .data()
        .ratings
        .rate(ad_id, ctx.author().id.get(), rating.into())
        .await
        .map(|tally| {
            format!(
                "Ad #{ad_id}: {} like(s), {} dislike(s)",
                tally.likes, tally.dislikes
            )
        });
    respond(ctx, result).await
}

/// Review another user. The bot asks for stars and text in private messages.
#[command(slash_command)]
pub async fn review(
    ctx: Ctx<'_>,
    #[description = "User to review"] user: serenity::User,
) -> Result<(), Error> {
    let result = ctx
        .data()
        .reviews
        .start(ctx.author().id.get(), user.id.get())
        .map(|_| {
            format!(
                "Reviewing {}. Send me 1 to 5 stars in a private message.",
                mention(user.id.get())
            )
        });
    respond(ctx, result).await
}

/// Show a user's reviews
#[command(slash_command)]
pub async fn reviews(
    ctx: Ctx<'_>,
    #[description = "User"] user: serenity::User,
) -> Result<(), Error> {
    let service = &ctx.data().reviews;
    let user_id = user.id.get();
    let text = match service.average(user_id) {
        None => format!("{} has no reviews yet", mention(user_id)),
        Some(average) => {
            let lines: Vec<String> = service
                .reviews_of(user_id)
                .iter()
                .map(|r| format!("{}/5 from {}: {}", r.rating, mention(r.from_user_id), r.review_text))
                .collect();
            format!(
                "{} is rated {average:.1}/5\n{}",
                mention(user_id),
                lines.join("\n")
            )
        }
    };
    ctx.say(text).await?;
    Ok(())
}

/// File a complaint against a moderator. The bot asks for details in private messages.
#[command(slash_command)]
pub async fn complaint(ctx: Ctx<'_>) -> Result<(), Error> {
    let result = ctx
        .data()
        .filing
        .start(ctx.author().id.get())
        .map(|step| format!("Complaint started. {}", step.prompt()));
    respond(ctx, result).await
}

/// Abandon a complaint or review in progress
#[command(slash_command)]
pub async fn cancel(ctx: Ctx<'_>) -> Result<(), Error> {
    let user_id = ctx.author().id.get();
    let data = ctx.data();
    let filing = data.filing.cancel(user_id);
    let review = data.reviews.cancel(user_id);
    let text = if filing || review {
        "Cancelled"
    } else {
        "Nothing to cancel"
    };
    refuse(ctx, text).await
}

#[derive(Debug, Clone, Copy, ChoiceParameter)]
pub enum Verdict {
    Approve,
    Reject,
    #[name = "False report"]
    FalseReport,
    #[name = "Incorrect report"]
    IncorrectReport,
}

impl Verdict {
    fn with_text(self, text: String) -> Resolution {
        match self {
            Self::Approve => Resolution::Approve { actions: text },
            Self::Reject => Resolution::Reject { reason: text },
            Self::FalseReport => Resolution::FalseReport { reason: text },
            Self::IncorrectReport => Resolution::IncorrectReport { reason: text },
        }
    }
}

/// List pending complaints
#[command(slash_command)]
pub async fn complaints(ctx: Ctx<'_>) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    let pending = ctx.data().resolver.pending();
    let text = if pending.is_empty() {
        "No pending complaints".to_string()
    } else {
        pending
            .iter()
            .map(|c| format!("#{} {} against {}: {}", c.id, c.username, c.admin_username, c.description))
            .collect::<Vec<_>>()
            .join("\n")
    };
    refuse(ctx, &text).await
}

/// Resolve a complaint
#[command(slash_command)]
pub async fn resolve(
    ctx: Ctx<'_>,
    #[description = "Complaint number"] complaint_id: u64,
    #[description = "Verdict"] verdict: Verdict,
    #[description = "Reason, or the actions taken when approving"] text: String,
) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    let result = ctx
        .data()
        .resolver
        .resolve(complaint_id, ctx.author().id.get(), verdict.with_text(text))
        .await
        .map(|outcome| match outcome {
            ResolutionOutcome::Resolved { complaint, block } => {
                let mut text = format!("Complaint #{} marked {}", complaint.id, complaint.status);
                if let Some(block) = block {
                    text.push_str(&format!(
                        "; {} blocked from the bot {}",
                        mention(block.user_id),
                        block.term()
                    ));
                }
                text
            }
            ResolutionOutcome::AlreadyHandled(status) => {
                format!("Complaint #{complaint_id} was already handled: {status}")
            }
        });
    respond(ctx, result).await
}

/// Complaint counts per status
#[command(slash_command)]
pub async fn complaint_stats(ctx: Ctx<'_>) -> Result<(), Error> {
    if !bot_admin(ctx).await? {
        return Ok(());
    }
    let stats = ctx.data().resolver.stats();
    let text = format!(
        "Complaints: {} total\npending {}\napproved {}\nrejected {}\nfalse reports {}\nincorrect reports {}",
        stats.total(),
        stats.pending,
        stats.approved,
        stats.rejected,
        stats.false_reports,
        stats.incorrect_reports
    );
    refuse(ctx, &text).await
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        warn(),
        unwarn(),
        warns(),
        mute(),
        unmute(),
        ban(),
        unban(),
        adblock(),
        unadblock(),
        adminwarn(),
        botwarn(),
        botblock(),
        botunblock(),
        sweep(),
        ad_new(),
        ad_publish(),
        ad_delete(),
        my_ads(),
        rate(),
        review(),
        reviews(),
        complaint(),
        cancel(),
        complaints(),
        resolve(),
        complaint_stats(),
    ]
}
