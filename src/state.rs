use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::tracking::TrackingSession;
use crate::models::bid::Bid;
use crate::models::change::ChangeEvent;
use crate::models::deal::Deal;
use crate::models::kyc::KycRecord;
use crate::models::loyalty::{LoyaltyAccount, LoyaltyTransaction, Redemption, Reward};
use crate::models::negotiation::Negotiation;
use crate::models::order::Order;
use crate::models::rating::Rating;
use crate::models::tracking::LocationPing;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,
    pub orders: DashMap<Uuid, Order>,
    pub bids: DashMap<Uuid, Bid>,
    pub negotiations: DashMap<Uuid, Negotiation>,
    pub deals: DashMap<Uuid, Deal>,
    pub ratings: DashMap<Uuid, Rating>,
    pub loyalty_accounts: DashMap<Uuid, LoyaltyAccount>,
    pub loyalty_transactions: DashMap<Uuid, LoyaltyTransaction>,
    pub rewards: DashMap<Uuid, Reward>,
    pub redemptions: DashMap<Uuid, Redemption>,
    pub locations: DashMap<Uuid, LocationPing>,
    pub kyc_records: DashMap<Uuid, KycRecord>,
    pub tracking_sessions: DashMap<Uuid, TrackingSession>,
    pub change_tx: broadcast::Sender<ChangeEvent>,
    pub completed_deals_tx: mpsc::Sender<Deal>,
    pub metrics: Metrics,
    order_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    change_seq: AtomicU64,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<Deal>) {
        let (completed_deals_tx, completed_deals_rx) = mpsc::channel(config.completion_queue_size);
        let (change_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        (
            Self {
                config,
                orders: DashMap::new(),
                bids: DashMap::new(),
                negotiations: DashMap::new(),
                deals: DashMap::new(),
                ratings: DashMap::new(),
                loyalty_accounts: DashMap::new(),
                loyalty_transactions: DashMap::new(),
                rewards: DashMap::new(),
                redemptions: DashMap::new(),
                locations: DashMap::new(),
                kyc_records: DashMap::new(),
                tracking_sessions: DashMap::new(),
                change_tx,
                completed_deals_tx,
                metrics: Metrics::new(),
                order_locks: DashMap::new(),
                change_seq: AtomicU64::new(0),
            },
            completed_deals_rx,
        )
    }

    /// Lock serializing every multi-row write that belongs to one order.
    pub fn order_lock(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        self.order_locks.entry(order_id).or_default().clone()
    }

    pub fn next_change_seq(&self) -> u64 {
        self.change_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}
