//! Ad publication gate
//!
//! Decides whether a user may publish an ad right now. Checks run in order:
//! an ad block in force, the minimum interval since the last publish, then
//! the daily cap on the current UTC day.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use dashmap::DashSet;
use derive_more::Display;
use std::sync::Arc;
use tracing::{debug, info};

use crate::MODERATION_TARGET;
use crate::moderation::{Ledger, describe_until};

/// Why a publish was refused
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum DenyReason {
    #[display("You are blocked from posting ads: {reason}, {}", describe_until(until.as_ref()))]
    Blocked {
        reason: String,
        until: Option<DateTime<Utc>>,
    },
    #[display("You can post your next ad at {}", retry_after.format("%Y-%m-%d %H:%M UTC"))]
    Cooldown { retry_after: DateTime<Utc> },
    #[display("Daily ad limit reached, try again after {}", retry_after.format("%Y-%m-%d %H:%M UTC"))]
    DailyLimit { retry_after: DateTime<Utc> },
}

impl DenyReason {
    /// When asking again may succeed; `None` for permanent blocks
    #[must_use]
    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Blocked { until, .. } => *until,
            Self::Cooldown { retry_after } | Self::DailyLimit { retry_after } => Some(*retry_after),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDecision {
    Allowed,
    Denied(DenyReason),
}

impl PublishDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Allowed => None,
            Self::Denied(reason) => reason.retry_after(),
        }
    }
}

/// Exclusive right to publish for one user, released on drop
#[derive(Debug)]
pub struct PublishClaim {
    user_id: u64,
    publishing: Arc<DashSet<u64>>,
}

impl Drop for PublishClaim {
    fn drop(&mut self) {
        self.publishing.remove(&self.user_id);
    }
}

#[derive(Clone)]
pub struct AdGate {
    ledger: Ledger,
    /// Users with a publish in flight
    publishing: Arc<DashSet<u64>>,
}

impl AdGate {
    #[must_use]
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            publishing: Arc::new(DashSet::new()),
        }
    }

    /// Take the user's publish slot. `None` while another publish of theirs is
    /// in flight. Hold the claim from the gate check until the publish is recorded.
    #[must_use]
    pub fn claim(&self, user_id: u64) -> Option<PublishClaim> {
        self.publishing.insert(user_id).then(|| PublishClaim {
            user_id,
            publishing: Arc::clone(&self.publishing),
        })
    }

    #[must_use]
    pub fn can_publish(&self, user_id: u64, chat_id: u64) -> PublishDecision {
        if let Some(block) = self.ledger.ad_block(user_id, chat_id) {
            return PublishDecision::Denied(DenyReason::Blocked {
                reason: block.reason,
                until: block.expires_at,
            });
        }

        let store = &self.ledger.store;
        let policy = &self.ledger.policy;
        let now = self.ledger.clock.now();

        if let Some(last) = store.cooldown(user_id) {
            let retry_after = last + policy.min_ad_interval();
            if now < retry_after {
                debug!("User {user_id} is in ad cooldown until {retry_after}");
                return PublishDecision::Denied(DenyReason::Cooldown { retry_after });
            }
        }

        let today = now.date_naive();
        if store.publishes(user_id, today) as usize >= policy.max_ads_per_day {
            let retry_after = today.and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
            return PublishDecision::Denied(DenyReason::DailyLimit { retry_after });
        }

        PublishDecision::Allowed
    }

    /// Start the cooldown and count the publish for today. Call only once the
    /// ad was actually posted.
    pub fn record_publish(&self, user_id: u64) {
        let now = self.ledger.clock.now();
        self.ledger.store.set_cooldown(user_id, now);
        let published_today = self.ledger.store.bump_publishes(user_id, now.date_naive());
        info!(
            target: MODERATION_TARGET,
            user_id = %user_id,
            published_today = published_today,
            "Ad cooldown started"
        );
    }

    /// Count a denied publish attempt for today. Returns today's total.
    pub fn record_violation(&self, user_id: u64) -> u32 {
        let today = self.ledger.clock.now().date_naive();
        self.ledger.store.bump_violation(user_id, today)
    }

    #[must_use]
    pub fn violations_today(&self, user_id: u64) -> u32 {
        let today = self.ledger.clock.now().date_naive();
        self.ledger.store.violations(user_id, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PolicyConfig;
    use crate::gateway::MockChatGateway;
    use crate::moderation::ledger::testing::*;
    use std::sync::Arc;

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let clock = Arc::new(ManualClock::new(start()));
        let ledger = ledger(MockChatGateway::new(), Arc::clone(&clock));
        let gate = AdGate::new(ledger);
        assert!(gate.can_publish(USER, CHAT).is_allowed());

        gate.record_publish(USER);
        let retry_after = start() + Duration::hours(24);

        clock.set(retry_after - Duration::seconds(1));
        assert_eq!(
            gate.can_publish(USER, CHAT),
            PublishDecision::Denied(DenyReason::Cooldown { retry_after })
        );

        clock.set(retry_after);
        assert_eq!(gate.can_publish(USER, CHAT), PublishDecision::Allowed);
    }

    #[test]
    fn test_daily_limit_resets_at_utc_midnight() {
        let policy = PolicyConfig {
            min_ad_interval_hours: 1,
            max_ads_per_day: 1,
            ..PolicyConfig::default()
        };
        let clock = Arc::new(ManualClock::new(start()));
        let ledger = ledger_with_policy(MockChatGateway::new(), Arc::clone(&clock), policy);
        let gate = AdGate::new(ledger);
        gate.record_publish(USER);

        clock.advance(Duration::hours(2));
        let midnight = start().date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
        let decision = gate.can_publish(USER, CHAT);
        assert_eq!(
            decision,
            PublishDecision::Denied(DenyReason::DailyLimit {
                retry_after: midnight
            })
        );
        assert_eq!(decision.retry_after(), Some(midnight));

        clock.set(midnight);
        assert!(gate.can_publish(USER, CHAT).is_allowed());
    }

    #[tokio::test]
    async fn test_ad_block_wins_over_everything() {
        let mut gateway = MockChatGateway::new();
        quiet(&mut gateway);
        let clock = Arc::new(ManualClock::new(start()));
        let ledger = ledger(gateway, Arc::clone(&clock));
        ledger
            .issue_ad_block(USER, CHAT, None, "scam listings", MODERATOR)
            .await
            .unwrap();
        let gate = AdGate::new(ledger);

        let decision = gate.can_publish(USER, CHAT);
        let PublishDecision::Denied(reason) = &decision else {
            panic!("blocked users must be denied");
        };
        assert_eq!(
            reason.to_string(),
            "You are blocked from posting ads: scam listings, permanently"
        );
        assert_eq!(decision.retry_after(), None);
        // Blocks are per chat
        assert!(gate.can_publish(USER, CHAT + 1).is_allowed());
    }

    #[test]
    fn test_one_claim_per_user() {
        let gate = AdGate::new(ledger(MockChatGateway::new(), Arc::new(ManualClock::new(start()))));

        let claim = gate.claim(USER).expect("slot is free");
        assert!(gate.claim(USER).is_none());
        assert!(gate.clone().claim(USER).is_none(), "clones share the slots");
        assert!(gate.claim(USER + 1).is_some());

        drop(claim);
        assert!(gate.claim(USER).is_some());
    }

    #[test]
    fn test_violations_are_counted_per_day() {
        let clock = Arc::new(ManualClock::new(start()));
        let gate = AdGate::new(ledger(MockChatGateway::new(), Arc::clone(&clock)));

        assert_eq!(gate.record_violation(USER), 1);
        assert_eq!(gate.record_violation(USER), 2);
        assert_eq!(gate.violations_today(USER), 2);

        clock.advance(Duration::days(1));
        assert_eq!(gate.violations_today(USER), 0);
    }
}
