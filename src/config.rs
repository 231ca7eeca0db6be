//! Configuration
//!
//! Policy knobs come from the environment; per-chat channel and role settings
//! come from a YAML file, one entry per chat.

use chrono::Duration;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to read chat settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse chat settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Durations and limits applied by the ledger, the gate and the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyConfig {
    pub warn_expire_days: i64,
    pub min_ad_interval_hours: i64,
    pub max_ads_per_day: usize,
    pub misuse_mute_days: i64,
    pub sweep_interval_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            warn_expire_days: 7,
            min_ad_interval_hours: 24,
            max_ads_per_day: 1,
            misuse_mute_days: 1,
            sweep_interval_secs: 60,
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub fn warn_expiry(&self) -> Duration {
        Duration::days(self.warn_expire_days)
    }

    #[must_use]
    pub fn min_ad_interval(&self) -> Duration {
        Duration::hours(self.min_ad_interval_hours)
    }

    #[must_use]
    pub fn misuse_mute(&self) -> Duration {
        Duration::days(self.misuse_mute_days)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub data_file: PathBuf,
    pub chat_settings_file: PathBuf,
    /// Users notified about new complaints
    pub admin_ids: Vec<u64>,
    pub policy: PolicyConfig,
}

impl Config {
    /// Read the configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `DISCORD_TOKEN` is missing or a numeric option does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup
    ///
    /// # Errors
    /// Returns an error if `DISCORD_TOKEN` is missing or a numeric option does not parse
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;
        let defaults = PolicyConfig::default();

        let policy = PolicyConfig {
            warn_expire_days: parse_or(&lookup, "WARN_EXPIRE_DAYS", defaults.warn_expire_days)?,
            min_ad_interval_hours: parse_or(
                &lookup,
                "MIN_AD_INTERVAL_HOURS",
                defaults.min_ad_interval_hours,
            )?,
            max_ads_per_day: parse_or(&lookup, "MAX_ADS_PER_DAY", defaults.max_ads_per_day)?,
            misuse_mute_days: parse_or(&lookup, "MISUSE_MUTE_DAYS", defaults.misuse_mute_days)?,
            sweep_interval_secs: parse_or(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
        };

        let admin_ids = match lookup("ADMIN_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse().map_err(|_| ConfigError::Invalid {
                        key: "ADMIN_IDS",
                        value: raw.clone(),
                    })
                })
                .collect::<Result<Vec<u64>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            token,
            data_file: lookup("DATA_FILE").map_or_else(|| "data/store.yaml".into(), PathBuf::from),
            chat_settings_file: lookup("CHAT_SETTINGS_FILE")
                .map_or_else(|| "data/chats.yaml".into(), PathBuf::from),
            admin_ids,
            policy,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Channels and roles configured for one chat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub chat_id: u64,
    /// Where punishments are announced to the chat
    pub announce_channel_id: Option<u64>,
    /// Moderation log channel
    pub log_channel_id: Option<u64>,
    /// Optional thread of the moderation log channel
    pub log_thread_id: Option<u64>,
    /// Where published ads are posted
    pub market_channel_id: Option<u64>,
    /// Role applied to muted members; without it mutes use platform timeouts
    pub muted_role_id: Option<u64>,
    /// Role that carries moderator rights
    pub moderator_role_id: Option<u64>,
}

/// Shared lookup of [`ChatSettings`] by chat id
#[derive(Debug, Clone, Default)]
pub struct ChatDirectory {
    chats: Arc<DashMap<u64, ChatSettings>>,
}

impl ChatDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a YAML list. A missing file yields an empty directory.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let directory = Self::new();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(directory),
            Err(e) => return Err(e.into()),
        };

        let settings: Vec<ChatSettings> = serde_yaml::from_str(&content)?;
        for chat in settings {
            directory.insert(chat);
        }
        info!("Loaded settings for {} chat(s)", directory.chats.len());
        Ok(directory)
    }

    pub fn insert(&self, settings: ChatSettings) {
        self.chats.insert(settings.chat_id, settings);
    }

    #[must_use]
    pub fn get(&self, chat_id: u64) -> Option<ChatSettings> {
        self.chats.get(&chat_id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "abc")])).unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.policy, PolicyConfig::default());
        assert_eq!(config.policy.sweep_interval().as_secs(), 60);
        assert_eq!(config.data_file, PathBuf::from("data/store.yaml"));
        assert!(config.admin_ids.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("WARN_EXPIRE_DAYS", "30"),
            ("MIN_AD_INTERVAL_HOURS", "6"),
            ("MAX_ADS_PER_DAY", "3"),
            ("ADMIN_IDS", "11, 22,33"),
        ]))
        .unwrap();
        assert_eq!(config.policy.warn_expiry(), Duration::days(30));
        assert_eq!(config.policy.min_ad_interval(), Duration::hours(6));
        assert_eq!(config.policy.max_ads_per_day, 3);
        assert_eq!(config.admin_ids, vec![11, 22, 33]);
    }

    #[test]
    fn test_missing_token_and_bad_numbers() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[])),
            Err(ConfigError::Missing("DISCORD_TOKEN"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[
                ("DISCORD_TOKEN", "abc"),
                ("MAX_ADS_PER_DAY", "many"),
            ])),
            Err(ConfigError::Invalid {
                key: "MAX_ADS_PER_DAY",
                ..
            })
        ));
    }

    #[test]
    fn test_chat_settings_serialization() {
        let settings = ChatSettings {
            chat_id: 67890,
            announce_channel_id: Some(1),
            log_channel_id: Some(2),
            log_thread_id: Some(3),
            market_channel_id: Some(4),
            muted_role_id: None,
            moderator_role_id: Some(5),
        };
        let yaml = serde_yaml::to_string(&vec![settings.clone()]).expect("Failed to serialize");
        assert!(yaml.contains("chat_id: 67890"));

        let parsed: Vec<ChatSettings> = serde_yaml::from_str(&yaml).expect("Failed to deserialize");
        let directory = ChatDirectory::new();
        for chat in parsed {
            directory.insert(chat);
        }
        assert_eq!(directory.get(67890), Some(settings));
        assert_eq!(directory.get(1), None);
    }
}
