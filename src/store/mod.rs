//! The document store the tracker reads and writes.
//!
//! Implementations push a full result set on every relevant change; a
//! consumer re-derives its view from each snapshot. Dropping a snapshot
//! stream cancels the live query.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::{Alert, Coordinates, PositionSample, Shuttle, ShuttleStatus, UserRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A cancellable live query.
pub type Snapshots<T> = BoxStream<'static, Result<T>>;

pub trait TrackerStore: Send + Sync {
    fn get_shuttle<'a>(&'a self, shuttle_id: &'a str) -> BoxFuture<'a, Result<Option<Shuttle>>>;

    /// Creates or replaces the record keyed by `shuttle.shuttle_id`.
    fn upsert_shuttle<'a>(&'a self, shuttle: &'a Shuttle) -> BoxFuture<'a, Result<()>>;

    /// Writes status and occupied as one update.
    fn set_trip_state<'a>(
        &'a self,
        shuttle_id: &'a str,
        status: ShuttleStatus,
        occupied: i32,
    ) -> BoxFuture<'a, Result<()>>;

    fn set_occupied<'a>(&'a self, shuttle_id: &'a str, occupied: i32) -> BoxFuture<'a, Result<()>>;

    /// Overwrites the current position of a shuttle whose trip is in
    /// progress and returns the server timestamp stamped onto the record.
    /// `None` when no such shuttle exists or its trip is not running.
    fn update_position<'a>(
        &'a self,
        shuttle_id: &'a str,
        at: Coordinates,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>>;

    fn append_position<'a>(
        &'a self,
        shuttle_id: &'a str,
        at: Coordinates,
        captured_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<PositionSample>>;

    /// Most recent samples first.
    fn latest_positions<'a>(
        &'a self,
        shuttle_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PositionSample>>>;

    /// Appends to the shuttle's alert log with a server-assigned timestamp.
    fn append_alert<'a>(
        &'a self,
        shuttle_id: &'a str,
        message: &'a str,
        shuttle_name: &'a str,
    ) -> BoxFuture<'a, Result<Alert>>;

    fn put_user<'a>(&'a self, user: &'a UserRecord) -> BoxFuture<'a, Result<()>>;

    fn get_user<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>>;

    fn watch_shuttles_with_status(&self, status: ShuttleStatus) -> Snapshots<Vec<Shuttle>>;

    /// Yields `None` while the record does not exist.
    fn watch_shuttle(&self, shuttle_id: &str) -> Snapshots<Option<Shuttle>>;

    /// The `limit` newest alerts of one shuttle, newest first.
    fn watch_recent_alerts(&self, shuttle_id: &str, limit: usize) -> Snapshots<Vec<Alert>>;
}
