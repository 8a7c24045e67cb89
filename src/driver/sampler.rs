use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::location::LocationProvider;
use crate::models::PositionSample;
use crate::store::TrackerStore;

/// Periodically records the driver's position while a trip runs.
pub struct PositionSampler {
    store: Arc<dyn TrackerStore>,
    location: Arc<dyn LocationProvider>,
    shuttle_id: String,
    period: Duration,
}

/// Owned handle to a running sampler. Stopping consumes it; dropping it
/// stops the sampler too.
pub struct SamplerHandle {
    shuttle_id: String,
    task: Option<JoinHandle<()>>,
}

impl PositionSampler {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        location: Arc<dyn LocationProvider>,
        shuttle_id: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            location,
            shuttle_id: shuttle_id.into(),
            period,
        }
    }

    /// First tick fires one period after start. Ticks never overlap: a timer
    /// that fires while a tick is still running is skipped.
    pub fn start(self) -> SamplerHandle {
        info!(
            "Starting location tracking for {} every {:?}",
            self.shuttle_id, self.period
        );
        let shuttle_id = self.shuttle_id.clone();
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + self.period, self.period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                if let Err(e) = sample_once(
                    self.store.as_ref(),
                    self.location.as_ref(),
                    &self.shuttle_id,
                )
                .await
                {
                    warn!("Location tracking error for {}: {}", self.shuttle_id, e);
                }
            }
        });

        SamplerHandle {
            shuttle_id,
            task: Some(task),
        }
    }
}

impl SamplerHandle {
    pub fn shuttle_id(&self) -> &str {
        &self.shuttle_id
    }

    /// Cancels the timer. No tick runs once this returns; a tick that was
    /// mid-flight is abandoned.
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        info!("Stopped location tracking for {}", self.shuttle_id);
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One tick: read the device position, overwrite the shuttle's current
/// position, then append the same fix to its history. Nothing is written
/// once the trip is no longer in progress.
pub async fn sample_once(
    store: &dyn TrackerStore,
    location: &dyn LocationProvider,
    shuttle_id: &str,
) -> Result<Option<PositionSample>> {
    let at = location.current_position().await?;
    let captured_at = match store.update_position(shuttle_id, at).await? {
        Some(captured_at) => captured_at,
        None => {
            debug!("Shuttle {} is not on a trip; position dropped", shuttle_id);
            return Ok(None);
        }
    };
    let sample = store.append_position(shuttle_id, at, captured_at).await?;
    debug!(
        "Recorded position {}, {} for {}",
        at.latitude, at.longitude, shuttle_id
    );
    Ok(Some(sample))
}
