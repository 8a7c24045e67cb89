//! Rider-side live view: active shuttles and the merged alert feed.

use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};
use crate::models::{Alert, PositionSample, Shuttle, ShuttleStatus};
use crate::store::{Snapshots, TrackerStore};

pub mod feed;

pub use feed::AlertFeed;

#[derive(Debug)]
pub enum RiderEvent {
    ShuttlesChanged,
    AlertsChanged { new: usize },
    /// A live query reported a failure; the dashboard keeps running.
    QueryFailed(TrackerError),
}

struct AlertDelivery {
    shuttle_id: String,
    generation: u64,
    result: Result<Vec<Alert>>,
}

/// One shuttle's alert query, forwarding snapshots into the dashboard.
struct AlertSubscription {
    generation: u64,
    /// The first snapshot holds the shuttle's existing alerts.
    loaded: bool,
    task: JoinHandle<()>,
}

impl Drop for AlertSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Step {
    Shuttles(Option<Result<Vec<Shuttle>>>),
    Alerts(Option<AlertDelivery>),
}

/// Follows the in-progress shuttles and keeps one alert subscription per
/// shuttle, adding and dropping subscriptions as shuttles start and end
/// trips. Alerts of a shuttle whose trip ended stay in the feed.
pub struct RiderDashboard {
    store: Arc<dyn TrackerStore>,
    alert_limit: usize,
    shuttles: Snapshots<Vec<Shuttle>>,
    shuttles_closed: bool,
    active: Vec<Shuttle>,
    subscriptions: HashMap<String, AlertSubscription>,
    next_generation: u64,
    deliveries_tx: mpsc::UnboundedSender<AlertDelivery>,
    deliveries_rx: mpsc::UnboundedReceiver<AlertDelivery>,
    feed: AlertFeed,
}

impl RiderDashboard {
    pub fn new(store: Arc<dyn TrackerStore>, alert_limit: usize) -> Self {
        let shuttles = store.watch_shuttles_with_status(ShuttleStatus::InProgress);
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        Self {
            store,
            alert_limit,
            shuttles,
            shuttles_closed: false,
            active: Vec::new(),
            subscriptions: HashMap::new(),
            next_generation: 0,
            deliveries_tx,
            deliveries_rx,
            feed: AlertFeed::default(),
        }
    }

    pub fn active_shuttles(&self) -> &[Shuttle] {
        &self.active
    }

    pub fn feed(&self) -> &AlertFeed {
        &self.feed
    }

    pub fn open_alerts(&mut self) -> &[Alert] {
        self.feed.open()
    }

    pub fn clear_alerts(&mut self) {
        self.feed.clear();
    }

    /// Shuttle ids with a live alert subscription, sorted.
    pub fn subscribed_shuttles(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.subscriptions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Waits for the next change and applies it. `None` once the shuttle
    /// query has ended and no alert subscription is left.
    pub async fn next_event(&mut self) -> Option<RiderEvent> {
        loop {
            if self.shuttles_closed && self.subscriptions.is_empty() {
                return None;
            }

            let step = tokio::select! {
                snapshot = self.shuttles.next(), if !self.shuttles_closed => Step::Shuttles(snapshot),
                delivery = self.deliveries_rx.recv() => Step::Alerts(delivery),
            };

            match step {
                Step::Shuttles(Some(Ok(shuttles))) => {
                    self.apply_shuttles(shuttles);
                    return Some(RiderEvent::ShuttlesChanged);
                }
                Step::Shuttles(Some(Err(e))) => {
                    warn!("Active shuttle query failed: {}", e);
                    return Some(RiderEvent::QueryFailed(e));
                }
                Step::Shuttles(None) => {
                    debug!("Active shuttle query ended");
                    self.shuttles_closed = true;
                }
                Step::Alerts(Some(delivery)) => {
                    if let Some(event) = self.on_delivery(delivery) {
                        return Some(event);
                    }
                }
                // The dashboard holds a sender, so the channel never closes.
                Step::Alerts(None) => return None,
            }
        }
    }

    fn apply_shuttles(&mut self, shuttles: Vec<Shuttle>) {
        let current: HashSet<&str> = shuttles.iter().map(|s| s.shuttle_id.as_str()).collect();

        let before = self.subscriptions.len();
        self.subscriptions.retain(|id, _| current.contains(id.as_str()));
        let dropped = before - self.subscriptions.len();

        let mut added = 0;
        for shuttle in &shuttles {
            if !self.subscriptions.contains_key(&shuttle.shuttle_id) {
                self.subscribe(&shuttle.shuttle_id);
                added += 1;
            }
        }

        if added > 0 || dropped > 0 {
            info!(
                "Active shuttles: {} (+{} -{} alert subscriptions)",
                shuttles.len(),
                added,
                dropped
            );
        }
        self.active = shuttles;
    }

    fn subscribe(&mut self, shuttle_id: &str) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let mut alerts = self.store.watch_recent_alerts(shuttle_id, self.alert_limit);
        let tx = self.deliveries_tx.clone();
        let id = shuttle_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(result) = alerts.next().await {
                let delivery = AlertDelivery {
                    shuttle_id: id.clone(),
                    generation,
                    result,
                };
                if tx.send(delivery).is_err() {
                    break;
                }
            }
        });

        self.subscriptions
            .insert(
                shuttle_id.to_string(),
                AlertSubscription {
                    generation,
                    loaded: false,
                    task,
                },
            );
    }

    /// Applies a delivery only if it came from the shuttle's current
    /// subscription. A subscription's first snapshot is history and does
    /// not add to the unseen count.
    fn on_delivery(&mut self, delivery: AlertDelivery) -> Option<RiderEvent> {
        let subscription = match self.subscriptions.get_mut(&delivery.shuttle_id) {
            Some(s) if s.generation == delivery.generation => s,
            _ => {
                debug!(
                    "Dropping alerts from a closed subscription for {}",
                    delivery.shuttle_id
                );
                return None;
            }
        };

        match delivery.result {
            Ok(alerts) if !subscription.loaded => {
                subscription.loaded = true;
                self.feed.preload(alerts);
                Some(RiderEvent::AlertsChanged { new: 0 })
            }
            Ok(alerts) => {
                let new = self.feed.merge(alerts);
                Some(RiderEvent::AlertsChanged { new })
            }
            Err(e) => {
                warn!("Alert query for {} failed: {}", delivery.shuttle_id, e);
                Some(RiderEvent::QueryFailed(e))
            }
        }
    }
}

/// Where a shuttle was last seen, from its position history.
pub async fn latest_position(
    store: &dyn TrackerStore,
    shuttle_id: &str,
) -> Result<Option<PositionSample>> {
    let mut latest = store.latest_positions(shuttle_id, 1).await?;
    Ok(latest.pop())
}
