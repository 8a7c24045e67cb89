//! In-process store with the same snapshot semantics as the database.
//! Backs the test suite and embedders running without a database.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{Result, TrackerError};
use crate::models::{Alert, Coordinates, PositionSample, Shuttle, ShuttleStatus, UserRecord};
use crate::store::{Snapshots, TrackerStore};

#[derive(Default)]
struct State {
    shuttles: BTreeMap<String, Shuttle>,
    positions: Vec<PositionSample>,
    alerts: Vec<Alert>,
    users: HashMap<String, UserRecord>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing, so ordering by timestamp matches write order.
    fn server_now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn shuttle_mut(&mut self, shuttle_id: &str) -> Result<&mut Shuttle> {
        self.shuttles
            .get_mut(shuttle_id)
            .ok_or_else(|| TrackerError::NotFound(format!("shuttle {}", shuttle_id)))
    }
}

struct Inner {
    state: Mutex<State>,
    changes: watch::Sender<u64>,
    offline: AtomicBool,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changes,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// While offline every call fails with a remote error. Switching
    /// wakes the live queries so they report the failure or recover.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        self.inner.changes.send_modify(|version| *version += 1);
    }

    pub fn position_count(&self, shuttle_id: &str) -> usize {
        self.lock()
            .positions
            .iter()
            .filter(|p| p.shuttle_id == shuttle_id)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(TrackerError::remote("store unreachable"));
        }
        Ok(())
    }

    fn write<T>(&self, apply: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        self.check_online()?;
        let out = apply(&mut self.lock())?;
        self.inner.changes.send_modify(|version| *version += 1);
        Ok(out)
    }

    fn read<T>(&self, query: impl FnOnce(&State) -> T) -> Result<T> {
        self.check_online()?;
        Ok(query(&self.lock()))
    }

    /// Emits the query result now and again after every write that changes it.
    /// A failed read is reported once; the next attempt waits for a change.
    fn live<T, F>(&self, query: F) -> Snapshots<T>
    where
        T: PartialEq + Clone + Send + Sync + 'static,
        F: Fn(&State) -> T + Send + Sync + 'static,
    {
        let store = self.clone();
        let changes = self.inner.changes.subscribe();
        let query = Arc::new(query);
        let last: Option<T> = None;
        let started = false;

        stream::unfold(
            (store, changes, query, last, started),
            |(store, mut changes, query, mut last, started)| async move {
                if started {
                    // The sender lives as long as `store` does.
                    changes.changed().await.ok()?;
                } else {
                    let _ = changes.borrow_and_update();
                }
                loop {
                    let snapshot = match store.read(|state| (*query)(state)) {
                        Ok(snapshot) => snapshot,
                        Err(e) => return Some((Err(e), (store, changes, query, None, true))),
                    };
                    if last.as_ref() != Some(&snapshot) {
                        last = Some(snapshot.clone());
                        return Some((Ok(snapshot), (store, changes, query, last, true)));
                    }
                    changes.changed().await.ok()?;
                }
            },
        )
        .boxed()
    }
}

impl TrackerStore for MemoryStore {
    fn get_shuttle<'a>(&'a self, shuttle_id: &'a str) -> BoxFuture<'a, Result<Option<Shuttle>>> {
        async move { self.read(|state| state.shuttles.get(shuttle_id).cloned()) }.boxed()
    }

    fn upsert_shuttle<'a>(&'a self, shuttle: &'a Shuttle) -> BoxFuture<'a, Result<()>> {
        async move {
            self.write(|state| {
                state.shuttles.insert(shuttle.shuttle_id.clone(), shuttle.clone());
                Ok(())
            })
        }
        .boxed()
    }

    fn set_trip_state<'a>(
        &'a self,
        shuttle_id: &'a str,
        status: ShuttleStatus,
        occupied: i32,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.write(|state| {
                let shuttle = state.shuttle_mut(shuttle_id)?;
                shuttle.status = status;
                shuttle.occupied = occupied;
                Ok(())
            })
        }
        .boxed()
    }

    fn set_occupied<'a>(&'a self, shuttle_id: &'a str, occupied: i32) -> BoxFuture<'a, Result<()>> {
        async move {
            self.write(|state| {
                let shuttle = state.shuttle_mut(shuttle_id)?;
                if occupied < 0 || occupied > shuttle.capacity {
                    return Err(TrackerError::remote("occupied out of range"));
                }
                shuttle.occupied = occupied;
                Ok(())
            })
        }
        .boxed()
    }

    fn update_position<'a>(
        &'a self,
        shuttle_id: &'a str,
        at: Coordinates,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>> {
        async move {
            self.write(|state| {
                let running = state
                    .shuttles
                    .get(shuttle_id)
                    .map_or(false, Shuttle::is_in_progress);
                if !running {
                    return Ok(None);
                }
                let now = state.server_now();
                let shuttle = state.shuttle_mut(shuttle_id)?;
                shuttle.latitude = Some(at.latitude);
                shuttle.longitude = Some(at.longitude);
                shuttle.last_updated = Some(now);
                Ok(Some(now))
            })
        }
        .boxed()
    }

    fn append_position<'a>(
        &'a self,
        shuttle_id: &'a str,
        at: Coordinates,
        captured_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<PositionSample>> {
        async move {
            self.write(|state| {
                state.shuttle_mut(shuttle_id)?;
                let sample = PositionSample {
                    position_id: state.positions.len() as i64 + 1,
                    shuttle_id: shuttle_id.to_string(),
                    latitude: at.latitude,
                    longitude: at.longitude,
                    captured_at,
                };
                state.positions.push(sample.clone());
                Ok(sample)
            })
        }
        .boxed()
    }

    fn latest_positions<'a>(
        &'a self,
        shuttle_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PositionSample>>> {
        async move {
            self.read(|state| {
                let mut samples: Vec<PositionSample> = state
                    .positions
                    .iter()
                    .filter(|p| p.shuttle_id == shuttle_id)
                    .cloned()
                    .collect();
                samples.sort_by(|a, b| {
                    b.captured_at
                        .cmp(&a.captured_at)
                        .then(b.position_id.cmp(&a.position_id))
                });
                samples.truncate(limit);
                samples
            })
        }
        .boxed()
    }

    fn append_alert<'a>(
        &'a self,
        shuttle_id: &'a str,
        message: &'a str,
        shuttle_name: &'a str,
    ) -> BoxFuture<'a, Result<Alert>> {
        async move {
            self.write(|state| {
                state.shuttle_mut(shuttle_id)?;
                let alert = Alert {
                    alert_id: Uuid::new_v4(),
                    shuttle_id: shuttle_id.to_string(),
                    message: message.to_string(),
                    shuttle_name: shuttle_name.to_string(),
                    created_at: state.server_now(),
                };
                state.alerts.push(alert.clone());
                Ok(alert)
            })
        }
        .boxed()
    }

    fn put_user<'a>(&'a self, user: &'a UserRecord) -> BoxFuture<'a, Result<()>> {
        async move {
            self.write(|state| {
                state.users.insert(user.uid.clone(), user.clone());
                Ok(())
            })
        }
        .boxed()
    }

    fn get_user<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>> {
        async move { self.read(|state| state.users.get(uid).cloned()) }.boxed()
    }

    fn watch_shuttles_with_status(&self, status: ShuttleStatus) -> Snapshots<Vec<Shuttle>> {
        self.live(move |state| {
            state
                .shuttles
                .values()
                .filter(|s| s.status == status)
                .cloned()
                .collect()
        })
    }

    fn watch_shuttle(&self, shuttle_id: &str) -> Snapshots<Option<Shuttle>> {
        let shuttle_id = shuttle_id.to_string();
        self.live(move |state| state.shuttles.get(&shuttle_id).cloned())
    }

    fn watch_recent_alerts(&self, shuttle_id: &str, limit: usize) -> Snapshots<Vec<Alert>> {
        let shuttle_id = shuttle_id.to_string();
        self.live(move |state| {
            let mut alerts: Vec<Alert> = state
                .alerts
                .iter()
                .filter(|a| a.shuttle_id == shuttle_id)
                .cloned()
                .collect();
            alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            alerts.truncate(limit);
            alerts
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShuttleRegistration;

    fn shuttle(id: &str) -> Shuttle {
        ShuttleRegistration {
            code: "UG-01".to_string(),
            name: format!("Shuttle {}", id),
            capacity: 4,
            driver_name: "Ama".to_string(),
        }
        .into_shuttle(id)
    }

    #[tokio::test]
    async fn test_status_query_tracks_transitions() {
        let store = MemoryStore::new();
        store.upsert_shuttle(&shuttle("a")).await.unwrap();
        let mut live = store.watch_shuttles_with_status(ShuttleStatus::InProgress);

        assert!(live.next().await.unwrap().unwrap().is_empty());

        store
            .set_trip_state("a", ShuttleStatus::InProgress, 0)
            .await
            .unwrap();
        let active = live.next().await.unwrap().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].shuttle_id, "a");
    }

    #[tokio::test]
    async fn test_recent_alerts_are_newest_first_and_limited() {
        let store = MemoryStore::new();
        store.upsert_shuttle(&shuttle("a")).await.unwrap();
        for i in 0..7 {
            store
                .append_alert("a", &format!("alert {}", i), "Shuttle a")
                .await
                .unwrap();
        }

        let mut live = store.watch_recent_alerts("a", 5);
        let alerts = live.next().await.unwrap().unwrap();
        let messages: Vec<&str> = alerts.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, vec!["alert 6", "alert 5", "alert 4", "alert 3", "alert 2"]);
    }

    #[tokio::test]
    async fn test_unrelated_writes_do_not_repeat_snapshots() {
        let store = MemoryStore::new();
        store.upsert_shuttle(&shuttle("a")).await.unwrap();
        store.upsert_shuttle(&shuttle("b")).await.unwrap();
        let mut live = store.watch_shuttle("a");
        assert!(live.next().await.unwrap().unwrap().is_some());

        store.set_occupied("b", 2).await.unwrap();
        store.set_occupied("a", 3).await.unwrap();
        let next = live.next().await.unwrap().unwrap().unwrap();
        assert_eq!(next.occupied, 3);
    }

    #[tokio::test]
    async fn test_offline_store_rejects_writes() {
        let store = MemoryStore::new();
        store.upsert_shuttle(&shuttle("a")).await.unwrap();
        store.set_offline(true);
        let err = store.set_occupied("a", 1).await.unwrap_err();
        assert!(matches!(err, TrackerError::Remote(_)));
        store.set_offline(false);
        assert_eq!(store.get_shuttle("a").await.unwrap().unwrap().occupied, 0);
    }

    #[tokio::test]
    async fn test_offline_live_query_reports_once_then_recovers() {
        let store = MemoryStore::new();
        store.upsert_shuttle(&shuttle("a")).await.unwrap();
        store.set_offline(true);

        let mut live = store.watch_shuttle("a");
        assert!(live.next().await.unwrap().is_err());
        let quiet = tokio::time::timeout(std::time::Duration::from_millis(50), live.next()).await;
        assert!(quiet.is_err(), "failed query must wait for a change");

        store.set_offline(false);
        let recovered = live.next().await.unwrap().unwrap();
        assert_eq!(recovered.unwrap().shuttle_id, "a");
    }

    #[tokio::test]
    async fn test_writes_to_unknown_shuttle_fail() {
        let store = MemoryStore::new();
        let err = store
            .set_trip_state("ghost", ShuttleStatus::InProgress, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }
}
