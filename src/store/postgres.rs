use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use sqlx::postgres::PgListener;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::queries;
use crate::db::DbPool;
use crate::error::{Result, TrackerError};
use crate::models::{Alert, Coordinates, PositionSample, Shuttle, ShuttleStatus, UserRecord};
use crate::store::{Snapshots, TrackerStore};

/// Postgres-backed store. Live queries ride on `LISTEN/NOTIFY`: the
/// triggers installed by `db::ensure_schema` publish the shuttle id of every
/// changed row and the stream re-runs its query.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn live<T, F, Fut>(&self, channel: &'static str, key: Option<String>, fetch: F) -> Snapshots<T>
    where
        T: Send + 'static,
        F: Fn(DbPool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let state = LiveQuery {
            pool: self.pool.clone(),
            listener: None,
            key,
            fetch,
            failed: false,
        };

        stream::unfold(state, move |mut query| async move {
            if query.failed {
                return None;
            }

            match query.listener.as_mut() {
                None => {
                    // Listen before the first fetch so no change slips between them.
                    let listener = async {
                        let mut listener = PgListener::connect_with(&query.pool).await?;
                        listener.listen(channel).await?;
                        Ok::<_, sqlx::Error>(listener)
                    }
                    .await;
                    match listener {
                        Ok(listener) => query.listener = Some(listener),
                        Err(e) => {
                            query.failed = true;
                            return Some((Err(e.into()), query));
                        }
                    }
                }
                Some(listener) => loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            let relevant = query
                                .key
                                .as_deref()
                                .map_or(true, |key| key == notification.payload());
                            if relevant {
                                debug!("Change on {} for {}", channel, notification.payload());
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Live query on {} lost its listener: {}", channel, e);
                            query.failed = true;
                            return Some((Err(e.into()), query));
                        }
                    }
                },
            }

            let snapshot = (query.fetch)(query.pool.clone()).await;
            Some((snapshot, query))
        })
        .boxed()
    }
}

struct LiveQuery<F> {
    pool: DbPool,
    listener: Option<PgListener>,
    key: Option<String>,
    fetch: F,
    failed: bool,
}

fn ensure_updated(rows: u64, shuttle_id: &str) -> Result<()> {
    if rows == 0 {
        return Err(TrackerError::NotFound(format!("shuttle {}", shuttle_id)));
    }
    Ok(())
}

async fn fetch_shuttle(pool: &DbPool, shuttle_id: &str) -> Result<Option<Shuttle>> {
    let shuttle = sqlx::query_as::<_, Shuttle>(queries::SELECT_SHUTTLE)
        .bind(shuttle_id)
        .fetch_optional(pool)
        .await?;
    Ok(shuttle)
}

async fn fetch_shuttles_with_status(pool: &DbPool, status: ShuttleStatus) -> Result<Vec<Shuttle>> {
    let shuttles = sqlx::query_as::<_, Shuttle>(queries::SELECT_SHUTTLES_BY_STATUS)
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;
    Ok(shuttles)
}

async fn fetch_recent_alerts(pool: &DbPool, shuttle_id: &str, limit: usize) -> Result<Vec<Alert>> {
    let alerts = sqlx::query_as::<_, Alert>(queries::SELECT_RECENT_ALERTS)
        .bind(shuttle_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;
    Ok(alerts)
}

impl TrackerStore for PgStore {
    fn get_shuttle<'a>(&'a self, shuttle_id: &'a str) -> BoxFuture<'a, Result<Option<Shuttle>>> {
        fetch_shuttle(&self.pool, shuttle_id).boxed()
    }

    fn upsert_shuttle<'a>(&'a self, shuttle: &'a Shuttle) -> BoxFuture<'a, Result<()>> {
        async move {
            sqlx::query(queries::UPSERT_SHUTTLE)
                .bind(&shuttle.shuttle_id)
                .bind(&shuttle.code)
                .bind(&shuttle.name)
                .bind(&shuttle.driver_name)
                .bind(shuttle.capacity)
                .bind(shuttle.occupied)
                .bind(shuttle.status.as_str())
                .bind(shuttle.latitude)
                .bind(shuttle.longitude)
                .bind(shuttle.last_updated)
                .execute(&self.pool)
                .await?;
            Ok(())
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
            let result = sqlx::query(queries::UPDATE_TRIP_STATE)
                .bind(shuttle_id)
                .bind(status.as_str())
                .bind(occupied)
                .execute(&self.pool)
                .await?;
            ensure_updated(result.rows_affected(), shuttle_id)
        }
        .boxed()
    }

    fn set_occupied<'a>(&'a self, shuttle_id: &'a str, occupied: i32) -> BoxFuture<'a, Result<()>> {
        async move {
            let result = sqlx::query(queries::UPDATE_OCCUPIED)
                .bind(shuttle_id)
                .bind(occupied)
                .execute(&self.pool)
                .await?;
            ensure_updated(result.rows_affected(), shuttle_id)
        }
        .boxed()
    }

    fn update_position<'a>(
        &'a self,
        shuttle_id: &'a str,
        at: Coordinates,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>> {
        async move {
            let stamped: Option<DateTime<Utc>> = sqlx::query_scalar(queries::UPDATE_CURRENT_POSITION)
                .bind(shuttle_id)
                .bind(at.latitude)
                .bind(at.longitude)
                .fetch_optional(&self.pool)
                .await?;
            Ok(stamped)
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
            let sample = sqlx::query_as::<_, PositionSample>(queries::INSERT_POSITION)
                .bind(shuttle_id)
                .bind(at.latitude)
                .bind(at.longitude)
                .bind(captured_at)
                .fetch_one(&self.pool)
                .await?;
            Ok(sample)
        }
        .boxed()
    }

    fn latest_positions<'a>(
        &'a self,
        shuttle_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PositionSample>>> {
        async move {
            let samples = sqlx::query_as::<_, PositionSample>(queries::SELECT_LATEST_POSITIONS)
                .bind(shuttle_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
            Ok(samples)
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
            let alert = sqlx::query_as::<_, Alert>(queries::INSERT_ALERT)
                .bind(Uuid::new_v4())
                .bind(shuttle_id)
                .bind(message)
                .bind(shuttle_name)
                .fetch_one(&self.pool)
                .await?;
            Ok(alert)
        }
        .boxed()
    }

    fn put_user<'a>(&'a self, user: &'a UserRecord) -> BoxFuture<'a, Result<()>> {
        async move {
            sqlx::query(queries::UPSERT_USER)
                .bind(&user.uid)
                .bind(&user.name)
                .bind(&user.email)
                .bind(user.role.as_str())
                .bind(user.created_at)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn get_user<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>> {
        async move {
            let user = sqlx::query_as::<_, UserRecord>(queries::SELECT_USER)
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;
            Ok(user)
        }
        .boxed()
    }

    fn watch_shuttles_with_status(&self, status: ShuttleStatus) -> Snapshots<Vec<Shuttle>> {
        self.live(queries::SHUTTLE_CHANNEL, None, move |pool| async move {
            fetch_shuttles_with_status(&pool, status).await
        })
    }

    fn watch_shuttle(&self, shuttle_id: &str) -> Snapshots<Option<Shuttle>> {
        let key = shuttle_id.to_string();
        let shuttle_id = Arc::new(key.clone());
        self.live(queries::SHUTTLE_CHANNEL, Some(key), move |pool| {
            let shuttle_id = shuttle_id.clone();
            async move { fetch_shuttle(&pool, &shuttle_id).await }
        })
    }

    fn watch_recent_alerts(&self, shuttle_id: &str, limit: usize) -> Snapshots<Vec<Alert>> {
        let key = shuttle_id.to_string();
        let shuttle_id = Arc::new(key.clone());
        self.live(queries::ALERT_CHANNEL, Some(key), move |pool| {
            let shuttle_id = shuttle_id.clone();
            async move { fetch_recent_alerts(&pool, &shuttle_id, limit).await }
        })
    }
}
