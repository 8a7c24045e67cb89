use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::Alert;

/// The rider's merged alert list across every subscribed shuttle.
#[derive(Debug, Default)]
pub struct AlertFeed {
    alerts: Vec<Alert>,
    unseen: usize,
}

impl AlertFeed {
    /// Folds a batch into the feed: duplicates by id keep the incoming
    /// copy, newest first. Returns how many ids were not in the feed before;
    /// that many are added to the unseen count.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Alert>) -> usize {
        let new = self.fold(incoming);
        self.unseen += new;
        new
    }

    /// Like `merge`, for alerts that already existed before the rider
    /// started following the shuttle: they join the feed without counting
    /// as unseen.
    pub fn preload(&mut self, existing: impl IntoIterator<Item = Alert>) {
        self.fold(existing);
    }

    fn fold(&mut self, incoming: impl IntoIterator<Item = Alert>) -> usize {
        let previous: HashSet<Uuid> = self.alerts.iter().map(|a| a.alert_id).collect();

        let mut by_id: HashMap<Uuid, Alert> =
            self.alerts.drain(..).map(|a| (a.alert_id, a)).collect();
        for alert in incoming {
            by_id.insert(alert.alert_id, alert);
        }

        let mut merged: Vec<Alert> = by_id.into_values().collect();
        merged.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.alert_id.cmp(&b.alert_id))
        });

        let new = merged
            .iter()
            .filter(|a| !previous.contains(&a.alert_id))
            .count();
        self.alerts = merged;
        new
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn unseen(&self) -> usize {
        self.unseen
    }

    /// The rider looked at the feed.
    pub fn open(&mut self) -> &[Alert] {
        self.unseen = 0;
        &self.alerts
    }

    /// Local only; the shuttles' alert logs are untouched.
    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
