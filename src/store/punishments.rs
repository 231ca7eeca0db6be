//! Indexed table for one punishment kind
//!
//! Besides the rows, each table keeps two indexes: the active row per
//! `(user, chat)` pair and the expiry order of active timed rows, so lookups
//! and the expiry sweep never scan the whole table.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

use super::Deactivation;
use crate::moderation::Punishment;

#[derive(Default)]
pub(super) struct PunishmentTable {
    rows: DashMap<u64, Punishment>,
    /// `(user_id, chat_id)` -> id of the active row
    active: DashMap<(u64, u64), u64>,
    /// `(expires_at, id)` of active rows with an expiry
    expiring: Mutex<BTreeSet<(DateTime<Utc>, u64)>>,
}

impl PunishmentTable {
    fn expiring(&self) -> MutexGuard<'_, BTreeSet<(DateTime<Utc>, u64)>> {
        self.expiring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a row. An active row replaces the pair's previous active row,
    /// which is deactivated; its id is returned.
    pub(super) fn insert(&self, record: Punishment) -> Option<u64> {
        let id = record.id;
        let pair = (record.user_id, record.chat_id);
        let is_active = record.is_active;
        let expires_at = record.expires_at;
        self.rows.insert(id, record);

        if !is_active {
            return None;
        }
        if let Some(at) = expires_at {
            self.expiring().insert((at, id));
        }

        let previous = self.active.insert(pair, id).filter(|previous| *previous != id);
        if let Some(previous) = previous {
            warn!("Row {id} superseded active row {previous} for pair {pair:?}");
            self.retire(previous);
        }
        previous
    }

    fn retire(&self, id: u64) {
        let expires_at = {
            let Some(mut row) = self.rows.get_mut(&id) else {
                return;
            };
            if !row.deactivate() {
                return;
            }
            row.expires_at
        };
        if let Some(at) = expires_at {
            self.expiring().remove(&(at, id));
        }
    }

    pub(super) fn get(&self, id: u64) -> Option<Punishment> {
        self.rows.get(&id).map(|row| row.value().clone())
    }

    pub(super) fn active_for(&self, user_id: u64, chat_id: u64) -> Option<Punishment> {
        let id = *self.active.get(&(user_id, chat_id))?;
        self.get(id).filter(|row| row.is_active)
    }

    /// Conditional update: flips the row only if it is still active
    pub(super) fn deactivate(&self, id: u64) -> Deactivation<Punishment> {
        let record = {
            let Some(mut row) = self.rows.get_mut(&id) else {
                return Deactivation::AlreadyInactive;
            };
            if !row.deactivate() {
                return Deactivation::AlreadyInactive;
            }
            row.clone()
        };

        self.active
            .remove_if(&(record.user_id, record.chat_id), |_, active| *active == id);
        if let Some(at) = record.expires_at {
            self.expiring().remove(&(at, id));
        }
        Deactivation::Deactivated(record)
    }

    pub(super) fn deactivate_pair(&self, user_id: u64, chat_id: u64) -> Deactivation<Punishment> {
        let id = match self.active.get(&(user_id, chat_id)) {
            Some(id) => *id,
            None => return Deactivation::AlreadyInactive,
        };
        self.deactivate(id)
    }

    pub(super) fn all_active(&self) -> Vec<Punishment> {
        let ids: Vec<u64> = self.active.iter().map(|entry| *entry.value()).collect();
        ids.into_iter()
            .filter_map(|id| self.get(id))
            .filter(|row| row.is_active)
            .collect()
    }

    /// Active rows whose expiry is at or before `now`
    pub(super) fn due(&self, now: DateTime<Utc>) -> Vec<Punishment> {
        let ids: Vec<u64> = self
            .expiring()
            .range(..=(now, u64::MAX))
            .map(|(_, id)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.get(id))
            .filter(|row| row.is_active)
            .collect()
    }

    pub(super) fn rows(&self) -> Vec<Punishment> {
        self.rows.iter().map(|row| row.value().clone()).collect()
    }
}
