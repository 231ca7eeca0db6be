//! Reconciliation between stored punishments and the chat platform
//!
//! [`Reconciler::startup`] runs once before commands are served and replays
//! every active mute and ban against the platform. [`Reconciler::run`] then
//! sweeps expired punishments on a fixed interval until shut down.

use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::ledger::Ledger;
use super::record::{Punishment, PunishmentKind};
use crate::MODERATION_TARGET;
use crate::gateway::{GatewayError, MemberRole};
use crate::notify::{FAN_OUT, mention};
use crate::store::Deactivation;

/// Control messages for the sweep task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileRequest {
    /// Sweep now instead of waiting for the next tick
    SweepNow,
    Shutdown,
}

/// What startup reconciliation did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Restrictions applied again with their stored expiry
    pub reapplied: usize,
    /// Records dropped because the member is an administrator or owner
    pub exempted: usize,
    /// Records dropped because the platform call failed
    pub dropped: usize,
    /// Already expired; left to the first sweep
    pub deferred: usize,
    /// Deactivated by someone else while being replayed
    pub skipped: usize,
}

/// What one expiry sweep did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub lifted: usize,
    /// Someone else deactivated the record first
    pub skipped: usize,
    /// Deactivated, but the platform call failed
    pub failed: usize,
}

enum Restore {
    Reapplied,
    Exempted,
    Dropped,
    Deferred,
    Skipped,
}

enum Expiry {
    Lifted,
    Skipped,
    Failed,
}

#[derive(Clone)]
pub struct Reconciler {
    ledger: Ledger,
}

impl Reconciler {
    #[must_use]
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Replay active mutes and bans against the platform
    pub async fn startup(&self) -> ReconcileReport {
        let store = &self.ledger.store;
        let records: Vec<Punishment> = PunishmentKind::ALL
            .into_iter()
            .filter(|kind| kind.touches_chat())
            .flat_map(|kind| store.active_punishments(kind))
            .collect();
        info!("Reconciling {} active punishment(s)", records.len());

        let results: Vec<Restore> = stream::iter(records)
            .map(|record| self.restore(record))
            .buffer_unordered(FAN_OUT)
            .collect()
            .await;

        let mut report = ReconcileReport::default();
        for result in results {
            match result {
                Restore::Reapplied => report.reapplied += 1,
                Restore::Exempted => report.exempted += 1,
                Restore::Dropped => report.dropped += 1,
                Restore::Deferred => report.deferred += 1,
                Restore::Skipped => report.skipped += 1,
            }
        }

        if report.exempted + report.dropped > 0 {
            self.save().await;
        }
        info!(
            target: MODERATION_TARGET,
            reapplied = report.reapplied,
            exempted = report.exempted,
            dropped = report.dropped,
            deferred = report.deferred,
            skipped = report.skipped,
            "Startup reconciliation finished"
        );
        report
    }

    async fn restore(&self, record: Punishment) -> Restore {
        let ledger = &self.ledger;
        if record.is_expired_at(ledger.clock.now()) {
            return Restore::Deferred;
        }

        let role = match ledger.gateway.member_role(record.chat_id, record.user_id).await {
            Ok(role) => role,
            // A banned user has left the chat
            Err(GatewayError::MemberNotFound { .. }) if record.kind == PunishmentKind::Ban => {
                MemberRole::Regular
            }
            Err(e) => {
                return self
                    .drop_record(&record, &format!("member lookup failed: {e}"), Restore::Dropped)
                    .await;
            }
        };
        if role.is_privileged() {
            return self
                .drop_record(&record, "member is an administrator", Restore::Exempted)
                .await;
        }

        if let Err(e) = ledger
            .apply(
                record.kind,
                record.user_id,
                record.chat_id,
                record.expires_at,
                &record.reason,
            )
            .await
        {
            return self
                .drop_record(&record, &format!("reapply failed: {e}"), Restore::Dropped)
                .await;
        }

        debug!(
            target: MODERATION_TARGET,
            punishment_id = %record.id,
            user_id = %record.user_id,
            chat_id = %record.chat_id,
            "Punishment reapplied"
        );
        let text = format!(
            "Restored {} of {} {}",
            record.kind.to_string().to_lowercase(),
            mention(record.user_id),
            record.term()
        );
        ledger.notifier.moderation_log(record.chat_id, &text).await;
        Restore::Reapplied
    }

    /// Deactivate a record that cannot be replayed. Returns `outcome`, or
    /// [`Restore::Skipped`] when another path deactivated it first.
    async fn drop_record(&self, record: &Punishment, why: &str, outcome: Restore) -> Restore {
        let Deactivation::Deactivated(_) = self
            .ledger
            .store
            .deactivate_punishment(record.kind, record.id)
        else {
            debug!("Punishment {} was deactivated meanwhile, not dropping", record.id);
            return Restore::Skipped;
        };
        warn!(
            target: MODERATION_TARGET,
            punishment_id = %record.id,
            kind = %record.kind,
            user_id = %record.user_id,
            chat_id = %record.chat_id,
            "Dropping punishment at startup: {why}"
        );

        let text = format!(
            "{} of {} dropped: {why}",
            record.kind,
            mention(record.user_id)
        );
        self.ledger
            .notifier
            .moderation_log(record.chat_id, &text)
            .await;
        outcome
    }

    /// Lift every active punishment whose expiry has passed
    pub async fn sweep(&self) -> SweepReport {
        let now = self.ledger.clock.now();
        let due: Vec<Punishment> = PunishmentKind::ALL
            .into_iter()
            .flat_map(|kind| self.ledger.store.due_punishments(kind, now))
            .collect();
        if due.is_empty() {
            return SweepReport::default();
        }

        let results: Vec<Expiry> = stream::iter(due)
            .map(|record| self.expire(record))
            .buffer_unordered(FAN_OUT)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for result in results {
            match result {
                Expiry::Lifted => report.lifted += 1,
                Expiry::Skipped => report.skipped += 1,
                Expiry::Failed => report.failed += 1,
            }
        }

        if report.lifted + report.failed > 0 {
            self.save().await;
        }
        info!(
            target: MODERATION_TARGET,
            lifted = report.lifted,
            skipped = report.skipped,
            failed = report.failed,
            "Expiry sweep finished"
        );
        report
    }

    async fn expire(&self, record: Punishment) -> Expiry {
        let Deactivation::Deactivated(record) = self
            .ledger
            .store
            .deactivate_punishment(record.kind, record.id)
        else {
            return Expiry::Skipped;
        };

        match self.ledger.release(&record).await {
            Ok(()) => {
                self.ledger.announce_lifted(&record, true).await;
                Expiry::Lifted
            }
            Err(e) => {
                error!(
                    target: MODERATION_TARGET,
                    punishment_id = %record.id,
                    kind = %record.kind,
                    user_id = %record.user_id,
                    chat_id = %record.chat_id,
                    error = %e,
                    "Failed to lift expired punishment"
                );
                Expiry::Failed
            }
        }
    }

    async fn save(&self) {
        if let Err(e) = self.ledger.store.save().await {
            error!("Failed to save store after reconciliation: {e}");
        }
    }

    /// Spawn the sweep loop
    pub fn spawn(
        self,
        period: std::time::Duration,
    ) -> (mpsc::Sender<ReconcileRequest>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(self.run(period, rx));
        (tx, handle)
    }

    /// Sweep every `period` until [`ReconcileRequest::Shutdown`] arrives or
    /// every sender is gone
    pub async fn run(self, period: std::time::Duration, mut requests: mpsc::Receiver<ReconcileRequest>) {
        info!("Starting expiry sweep every {}s", period.as_secs());
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(ReconcileRequest::SweepNow) => {
                        debug!("Sweep requested");
                        self.sweep().await;
                    }
                    Some(ReconcileRequest::Shutdown) | None => break,
                },
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("Expiry sweep stopped");
    }
}
