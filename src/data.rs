use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;
use tokio::sync::mpsc::Sender;
use tracing::warn;

use crate::clock::Clock;
use crate::complaints::{ComplaintDraft, ComplaintFiling, ComplaintResolver};
use crate::config::{ChatDirectory, ChatSettings, PolicyConfig};
use crate::gateway::ChatGateway;
use crate::market::{AdBoard, AdGate, ReviewDraft, Ratings, Reviews};
use crate::moderation::{Ledger, ReconcileRequest, Reconciler};
use crate::notify::Notifier;
use crate::session::MemorySessions;
use crate::store::Store;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

/// Every service the commands and event handlers reach for
#[derive(Clone)]
pub struct DataInner {
    pub chats: ChatDirectory,
    pub policy: PolicyConfig,
    /// Users allowed to resolve complaints and manage bot access
    pub admin_ids: Arc<[u64]>,
    pub ledger: Ledger,
    pub gate: AdGate,
    pub ads: AdBoard,
    pub ratings: Ratings,
    pub reviews: Reviews,
    pub filing: ComplaintFiling,
    pub resolver: ComplaintResolver,
    pub reconcile_tx: Arc<Option<Sender<ReconcileRequest>>>,
}

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("policy", &self.policy)
            .field("admin_ids", &self.admin_ids)
            .field("reconcile_tx", &self.reconcile_tx)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Data {
    fn deref_mut(&mut self) -> &mut Self::Target {
        Arc::make_mut(&mut self.0)
    }
}

impl Data {
    /// Wire every service over one store, gateway and clock
    #[must_use]
    pub fn new(
        store: Store,
        gateway: Arc<dyn ChatGateway>,
        clock: Arc<dyn Clock>,
        chats: ChatDirectory,
        policy: PolicyConfig,
        admin_ids: Vec<u64>,
    ) -> Self {
        let admin_ids: Arc<[u64]> = admin_ids.into();
        let notifier = Notifier::new(Arc::clone(&gateway), chats.clone());
        let ledger = Ledger::new(store, gateway, clock, notifier, policy);
        let gate = AdGate::new(ledger.clone());

        Self(Arc::new(DataInner {
            ads: AdBoard::new(ledger.clone(), gate.clone(), chats.clone()),
            ratings: Ratings::new(ledger.clone()),
            reviews: Reviews::new(
                ledger.clone(),
                Arc::new(MemorySessions::<ReviewDraft>::new()),
            ),
            filing: ComplaintFiling::new(
                ledger.clone(),
                Arc::new(MemorySessions::<ComplaintDraft>::new()),
                Arc::clone(&admin_ids),
            ),
            resolver: ComplaintResolver::new(ledger.clone()),
            gate,
            ledger,
            chats,
            policy,
            admin_ids,
            reconcile_tx: Arc::new(None),
        }))
    }

    /// A reconciler over the same ledger
    #[must_use]
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.ledger.clone())
    }

    /// Set the sweep loop's request sender
    pub fn set_reconcile_tx(&mut self, tx: Sender<ReconcileRequest>) {
        Arc::make_mut(&mut self.0).reconcile_tx = Arc::new(Some(tx));
    }

    /// Ask the sweep loop for something. Returns whether the loop took it.
    pub async fn request_reconcile(&self, request: ReconcileRequest) -> bool {
        let Some(tx) = self.reconcile_tx.as_ref() else {
            warn!("Sweep loop is not running, dropping {request:?}");
            return false;
        };
        tx.send(request).await.is_ok()
    }

    #[must_use]
    pub fn chat_settings(&self, guild_id: serenity::GuildId) -> Option<ChatSettings> {
        self.chats.get(guild_id.get())
    }

    #[must_use]
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Save the store
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be written
    pub async fn save(&self) -> Result<(), crate::store::StoreError> {
        self.ledger.store().save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::MockChatGateway;
    use chrono::TimeZone;
    use chrono::Utc;

    fn data() -> Data {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        Data::new(
            Store::in_memory(),
            Arc::new(MockChatGateway::new()),
            Arc::new(clock),
            ChatDirectory::new(),
            PolicyConfig::default(),
            vec![901, 902],
        )
    }

    #[test]
    fn test_data_debug_impl() {
        let debug_output = format!("{:?}", data());
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("policy"));
        assert!(debug_output.contains("admin_ids"));
    }

    #[test]
    fn test_services_share_one_store() {
        let data = data();
        data.reviews.start(1, 2).unwrap();
        data.filing.start(1).unwrap();

        let ad = data.ledger.store().insert_ad(crate::market::Ad {
            id: 0,
            user_id: 1,
            photos: Vec::new(),
            description: "Mountain bike, 21 gears".to_string(),
            price: "150".to_string(),
            username: "@seller".to_string(),
            created_at: data.ledger.now(),
            status: crate::market::AdStatus::Draft,
            published_at: None,
        });
        assert_eq!(data.ads.ads_of(1), vec![ad]);
        assert!(data.is_admin(901));
        assert!(!data.is_admin(1));
    }

    #[tokio::test]
    async fn test_reconcile_requests_need_a_running_loop() {
        let mut data = data();
        assert!(!data.request_reconcile(ReconcileRequest::SweepNow).await);

        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        data.set_reconcile_tx(tx);
        assert!(data.request_reconcile(ReconcileRequest::SweepNow).await);
        assert_eq!(rx.recv().await, Some(ReconcileRequest::SweepNow));
    }
}
