//! Warn, punishment and privilege warn tables

use chrono::{DateTime, Utc};

use super::{Deactivation, Store};
use crate::moderation::{PrivilegeScope, PrivilegeWarn, Punishment, PunishmentKind, Warn};

impl Store {
    /// Insert a warn, assigning its id
    pub fn insert_warn(&self, mut warn: Warn) -> Warn {
        warn.id = self.next_id();
        // Row before index: a concurrent clear never leaves an unindexed row
        self.0.warns.insert(warn.id, warn.clone());
        self.0
            .warns_by_pair
            .entry((warn.user_id, warn.chat_id))
            .or_default()
            .insert(warn.id);
        warn
    }

    /// Unexpired warns for a pair, oldest first
    #[must_use]
    pub fn active_warns(&self, user_id: u64, chat_id: u64, now: DateTime<Utc>) -> Vec<Warn> {
        let Some(ids) = self
            .0
            .warns_by_pair
            .get(&(user_id, chat_id))
            .map(|ids| ids.value().clone())
        else {
            return Vec::new();
        };
        ids.into_iter()
            .filter_map(|id| self.0.warns.get(&id).map(|warn| warn.value().clone()))
            .filter(|warn| warn.is_active_at(now))
            .collect()
    }

    /// Remove every warn of a pair, expired ones included. Returns how many went.
    pub fn clear_warns(&self, user_id: u64, chat_id: u64) -> usize {
        let Some((_, ids)) = self.0.warns_by_pair.remove(&(user_id, chat_id)) else {
            return 0;
        };
        ids.into_iter()
            .filter(|id| self.0.warns.remove(id).is_some())
            .count()
    }

    pub fn remove_warn(&self, id: u64) -> Option<Warn> {
        let (_, warn) = self.0.warns.remove(&id)?;
        let pair = (warn.user_id, warn.chat_id);
        if let Some(mut ids) = self.0.warns_by_pair.get_mut(&pair) {
            ids.remove(&id);
        }
        self.0.warns_by_pair.remove_if(&pair, |_, ids| ids.is_empty());
        Some(warn)
    }

    /// Insert a punishment, assigning its id. An active record supersedes the
    /// pair's previous active record of the same kind.
    pub fn insert_punishment(&self, mut record: Punishment) -> Punishment {
        record.id = self.next_id();
        self.table(record.kind).insert(record.clone());
        record
    }

    #[must_use]
    pub fn punishment(&self, kind: PunishmentKind, id: u64) -> Option<Punishment> {
        self.table(kind).get(id)
    }

    /// The active record of a pair, even if its expiry already passed
    #[must_use]
    pub fn active_punishment(
        &self,
        kind: PunishmentKind,
        user_id: u64,
        chat_id: u64,
    ) -> Option<Punishment> {
        self.table(kind).active_for(user_id, chat_id)
    }

    #[must_use]
    pub fn active_punishments(&self, kind: PunishmentKind) -> Vec<Punishment> {
        self.table(kind).all_active()
    }

    /// Active records with `expires_at <= now`
    #[must_use]
    pub fn due_punishments(&self, kind: PunishmentKind, now: DateTime<Utc>) -> Vec<Punishment> {
        self.table(kind).due(now)
    }

    /// Set a record inactive where it is still active
    pub fn deactivate_punishment(&self, kind: PunishmentKind, id: u64) -> Deactivation<Punishment> {
        self.table(kind).deactivate(id)
    }

    /// Set the pair's active record inactive, if there is one
    pub fn deactivate_active(
        &self,
        kind: PunishmentKind,
        user_id: u64,
        chat_id: u64,
    ) -> Deactivation<Punishment> {
        self.table(kind).deactivate_pair(user_id, chat_id)
    }

    pub fn insert_privilege_warn(&self, mut warn: PrivilegeWarn) -> PrivilegeWarn {
        warn.id = self.next_id();
        self.privilege_table(warn.scope).insert(warn.id, warn.clone());
        warn
    }

    #[must_use]
    pub fn active_privilege_warns(&self, scope: PrivilegeScope, user_id: u64) -> Vec<PrivilegeWarn> {
        let mut warns: Vec<PrivilegeWarn> = self
            .privilege_table(scope)
            .iter()
            .filter(|entry| entry.value().user_id == user_id && entry.value().is_active)
            .map(|entry| entry.value().clone())
            .collect();
        warns.sort_by_key(|warn| warn.id);
        warns
    }

    /// Set every active privilege warn of a user inactive. Returns how many flipped.
    pub fn clear_privilege_warns(&self, scope: PrivilegeScope, user_id: u64) -> usize {
        let mut cleared = 0;
        for mut entry in self.privilege_table(scope).iter_mut() {
            let warn = entry.value_mut();
            if warn.user_id == user_id && warn.is_active {
                warn.is_active = false;
                cleared += 1;
            }
        }
        cleared
    }
}
