//! Persistent store
//!
//! Single owner of every record. Tables are concurrent maps so the command
//! path and the expiry sweep can use the store at the same time; state changes
//! go through conditional updates rather than long-held locks. The whole store
//! is snapshotted to one YAML file after each mutating operation.

mod complaints;
mod market;
mod moderation;
mod punishments;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

use crate::complaints::Complaint;
use crate::market::{Ad, AdCooldown, AdPublishCount, AdRating, AdViolation, UserReview};
use crate::moderation::{PrivilegeScope, PrivilegeWarn, Punishment, PunishmentKind, Warn};
use punishments::PunishmentTable;

/// Errors that can occur while persisting the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Outcome of a conditional "set inactive where active" update
#[derive(Debug, Clone, PartialEq)]
pub enum Deactivation<T> {
    /// This call flipped the record; carries the record as stored now
    Deactivated(T),
    /// Someone else got there first, or there was nothing active
    AlreadyInactive,
}

/// Outcome of inserting a rating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingInsert {
    Inserted,
    AlreadyRated,
}

/// Outcome of a conditional complaint status update
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Updated(Complaint),
    AlreadyHandled(crate::complaints::ComplaintStatus),
}

/// Serialized form of the store
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Snapshot {
    last_id: u64,
    warns: Vec<Warn>,
    punishments: Vec<Punishment>,
    privilege_warns: Vec<PrivilegeWarn>,
    ads: Vec<Ad>,
    ad_cooldowns: Vec<AdCooldown>,
    ad_violations: Vec<AdViolation>,
    ad_publishes: Vec<AdPublishCount>,
    ad_ratings: Vec<AdRating>,
    reviews: Vec<UserReview>,
    complaints: Vec<Complaint>,
}

/// Handle to the store; clones share the same tables
#[derive(Clone)]
pub struct Store(Arc<StoreInner>);

#[derive(Default)]
struct StoreInner {
    path: Option<PathBuf>,
    last_id: AtomicU64,
    warns: DashMap<u64, Warn>,
    /// `(user_id, chat_id)` -> warn ids
    warns_by_pair: DashMap<(u64, u64), BTreeSet<u64>>,
    mutes: PunishmentTable,
    bans: PunishmentTable,
    ad_blocks: PunishmentTable,
    bot_blocks: PunishmentTable,
    admin_warns: DashMap<u64, PrivilegeWarn>,
    bot_warns: DashMap<u64, PrivilegeWarn>,
    ads: DashMap<u64, Ad>,
    ad_cooldowns: DashMap<u64, DateTime<Utc>>,
    ad_violations: DashMap<(u64, NaiveDate), u32>,
    /// Successful publishes per `(user_id, day)`; deleting the ad keeps the count
    ad_publishes: DashMap<(u64, NaiveDate), u32>,
    ad_ratings: DashMap<(u64, u64), AdRating>,
    reviews: DashMap<u64, UserReview>,
    complaints: DashMap<u64, Complaint>,
    /// Serializes snapshot writers
    save_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.0.path)
            .field("warns", &self.0.warns.len())
            .field("ads", &self.0.ads.len())
            .field("complaints", &self.0.complaints.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// A store that lives only in memory; [`Store::save`] is a no-op
    #[must_use]
    pub fn in_memory() -> Self {
        Self(Arc::new(StoreInner::default()))
    }

    /// Load the store from a YAML snapshot. A missing file yields an empty store.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_yaml::from_str::<Snapshot>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store at {}, starting empty", path.display());
                Snapshot::default()
            }
            Err(e) => return Err(e.into()),
        };

        let store = Self(Arc::new(StoreInner {
            path: Some(path),
            ..StoreInner::default()
        }));
        store.restore(snapshot);
        Ok(store)
    }

    fn restore(&self, snapshot: Snapshot) {
        let inner = &self.0;
        let mut last_id = snapshot.last_id;

        for warn in snapshot.warns {
            last_id = last_id.max(warn.id);
            let (id, pair) = (warn.id, (warn.user_id, warn.chat_id));
            inner.warns.insert(id, warn);
            inner.warns_by_pair.entry(pair).or_default().insert(id);
        }
        for record in snapshot.punishments {
            last_id = last_id.max(record.id);
            self.table(record.kind).insert(record);
        }
        for warn in snapshot.privilege_warns {
            last_id = last_id.max(warn.id);
            self.privilege_table(warn.scope).insert(warn.id, warn);
        }
        for ad in snapshot.ads {
            last_id = last_id.max(ad.id);
            inner.ads.insert(ad.id, ad);
        }
        for cooldown in snapshot.ad_cooldowns {
            inner
                .ad_cooldowns
                .insert(cooldown.user_id, cooldown.last_published_at);
        }
        for violation in snapshot.ad_violations {
            inner
                .ad_violations
                .insert((violation.user_id, violation.date), violation.count);
        }
        for published in snapshot.ad_publishes {
            inner
                .ad_publishes
                .insert((published.user_id, published.date), published.count);
        }
        for rating in snapshot.ad_ratings {
            inner
                .ad_ratings
                .insert((rating.ad_id, rating.user_id), rating);
        }
        for review in snapshot.reviews {
            last_id = last_id.max(review.id);
            inner.reviews.insert(review.id, review);
        }
        for complaint in snapshot.complaints {
            last_id = last_id.max(complaint.id);
            inner.complaints.insert(complaint.id, complaint);
        }

        inner.last_id.store(last_id, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Snapshot {
        let inner = &self.0;
        let mut punishments = Vec::new();
        for kind in PunishmentKind::ALL {
            punishments.extend(self.table(kind).rows());
        }
        let mut privilege_warns: Vec<PrivilegeWarn> = inner
            .admin_warns
            .iter()
            .chain(inner.bot_warns.iter())
            .map(|entry| entry.value().clone())
            .collect();
        privilege_warns.sort_by_key(|warn| warn.id);
        punishments.sort_by_key(|record| record.id);

        Snapshot {
            last_id: inner.last_id.load(Ordering::SeqCst),
            warns: sorted_values(&inner.warns),
            punishments,
            privilege_warns,
            ads: sorted_values(&inner.ads),
            ad_cooldowns: inner
                .ad_cooldowns
                .iter()
                .map(|entry| AdCooldown {
                    user_id: *entry.key(),
                    last_published_at: *entry.value(),
                })
                .collect(),
            ad_violations: inner
                .ad_violations
                .iter()
                .map(|entry| AdViolation {
                    user_id: entry.key().0,
                    date: entry.key().1,
                    count: *entry.value(),
                })
                .collect(),
            ad_publishes: inner
                .ad_publishes
                .iter()
                .map(|entry| AdPublishCount {
                    user_id: entry.key().0,
                    date: entry.key().1,
                    count: *entry.value(),
                })
                .collect(),
            ad_ratings: inner
                .ad_ratings
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
            reviews: sorted_values(&inner.reviews),
            complaints: sorted_values(&inner.complaints),
        }
    }

    /// Write the snapshot to disk (temp file, then rename)
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be serialized or written
    pub async fn save(&self) -> Result<(), StoreError> {
        let Some(path) = self.0.path.as_deref() else {
            return Ok(());
        };

        let _guard = self.0.save_lock.lock().await;
        let yaml = serde_yaml::to_string(&self.snapshot())?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let temp = temp_path(path);
        tokio::fs::write(&temp, yaml).await?;
        tokio::fs::rename(&temp, path).await?;

        debug!("Store saved to {}", path.display());
        Ok(())
    }

    /// Next auto-increment id, shared by every table
    fn next_id(&self) -> u64 {
        self.0.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn table(&self, kind: PunishmentKind) -> &PunishmentTable {
        match kind {
            PunishmentKind::Mute => &self.0.mutes,
            PunishmentKind::Ban => &self.0.bans,
            PunishmentKind::AdBlock => &self.0.ad_blocks,
            PunishmentKind::BotBlock => &self.0.bot_blocks,
        }
    }

    fn privilege_table(&self, scope: PrivilegeScope) -> &DashMap<u64, PrivilegeWarn> {
        match scope {
            PrivilegeScope::Admin => &self.0.admin_warns,
            PrivilegeScope::Bot => &self.0.bot_warns,
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn sorted_values<T: Clone>(map: &DashMap<u64, T>) -> Vec<T> {
    let mut entries: Vec<(u64, T)> = map
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
    entries.sort_by_key(|(id, _)| *id);
    entries.into_iter().map(|(_, value)| value).collect()
}
