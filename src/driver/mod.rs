//! The driver dashboard: trip lifecycle, position sampling, seat counting
//! and alerts for the signed-in driver's own shuttle.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::AuthProvider;
use crate::config::AppConfig;
use crate::error::{Result, TrackerError};
use crate::location::{LocationProvider, Permission};
use crate::models::{Account, Alert, Shuttle, ShuttleRegistration};
use crate::store::TrackerStore;

pub mod alerts;
pub mod lifecycle;
pub mod occupancy;
pub mod sampler;

pub use alerts::{publish_alert, AlertComposer};
pub use lifecycle::{LifecyclePolicy, SamplerAction, TripCommand};
pub use occupancy::OccupancyOutcome;
pub use sampler::{PositionSampler, SamplerHandle};

#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    pub sample_interval: Duration,
    pub lifecycle: LifecyclePolicy,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
            lifecycle: LifecyclePolicy::default(),
        }
    }
}

impl DriverSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sample_interval: config.sample_interval(),
            lifecycle: LifecyclePolicy {
                allow_restart_after_end: config.allow_restart_after_end,
            },
        }
    }
}

/// Where a driver goes after choosing the driver role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverLanding {
    Dashboard,
    Register,
}

pub async fn driver_landing(store: &dyn TrackerStore, account: &Account) -> Result<DriverLanding> {
    match store.get_shuttle(&account.uid).await? {
        Some(_) => Ok(DriverLanding::Dashboard),
        None => Ok(DriverLanding::Register),
    }
}

/// Creates or replaces the shuttle owned by `account`. A replaced shuttle
/// starts over as not started and empty.
pub async fn register_shuttle(
    store: &dyn TrackerStore,
    account: Option<&Account>,
    registration: ShuttleRegistration,
) -> Result<Shuttle> {
    registration.validate()?;
    let account = account.ok_or(TrackerError::Unauthenticated)?;

    let shuttle = registration.into_shuttle(&account.uid);
    store.upsert_shuttle(&shuttle).await?;
    info!("Registered shuttle {} ({}) for {}", shuttle.code, shuttle.name, account.uid);
    Ok(shuttle)
}

/// A driver's live dashboard over their own shuttle record.
///
/// Local state only changes after the store acknowledged the write, so a
/// failed command leaves the session exactly as it was.
pub struct DriverSession {
    account: Account,
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn TrackerStore>,
    location: Arc<dyn LocationProvider>,
    settings: DriverSettings,
    shuttle: Shuttle,
    permission: Permission,
    sampler: Option<SamplerHandle>,
    composer: AlertComposer,
}

impl DriverSession {
    /// Asks for location access, loads the signed-in driver's shuttle and
    /// resumes tracking if a trip is already running. A denied permission
    /// only disables tracking.
    pub async fn open(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn TrackerStore>,
        location: Arc<dyn LocationProvider>,
        settings: DriverSettings,
    ) -> Result<Self> {
        let account = auth.current_account().ok_or(TrackerError::Unauthenticated)?;

        let permission = match location.request_permission().await {
            Ok(permission) => permission,
            Err(e) => {
                warn!("Location permission request failed: {}", e);
                Permission::Denied
            }
        };
        if !permission.is_granted() {
            warn!("Location access denied for {}; tracking disabled", account.uid);
        }

        let shuttle = store.get_shuttle(&account.uid).await?.ok_or_else(|| {
            TrackerError::NotFound("No shuttle registered. Please register first.".to_string())
        })?;

        let mut session = Self {
            account,
            auth,
            store,
            location,
            settings,
            shuttle,
            permission,
            sampler: None,
            composer: AlertComposer::default(),
        };
        if session.shuttle.is_in_progress() {
            session.activate_sampler();
        }
        Ok(session)
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn shuttle(&self) -> &Shuttle {
        &self.shuttle
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn is_tracking(&self) -> bool {
        self.sampler.is_some()
    }

    pub async fn start_trip(&mut self) -> Result<()> {
        self.apply(TripCommand::Start).await
    }

    pub async fn end_trip(&mut self) -> Result<()> {
        self.apply(TripCommand::End).await
    }

    /// Every write goes through here: the driver must still be signed in as
    /// the shuttle's owner.
    fn authorize(&self) -> Result<()> {
        let current = self
            .auth
            .current_account()
            .ok_or(TrackerError::Unauthenticated)?;
        if current.uid != self.shuttle.shuttle_id {
            warn!(
                "{} tried to operate shuttle {}",
                current.uid, self.shuttle.shuttle_id
            );
            return Err(TrackerError::Permission(
                "Only the shuttle's driver can do that.".to_string(),
            ));
        }
        Ok(())
    }

    async fn apply(&mut self, command: TripCommand) -> Result<()> {
        self.authorize()?;
        let transition = self
            .settings
            .lifecycle
            .transition(self.shuttle.status, command)?;

        self.store
            .set_trip_state(&self.shuttle.shuttle_id, transition.to, transition.occupied)
            .await
            .map_err(|e| {
                error!("Failed to {:?} trip for {}: {}", command, self.shuttle.shuttle_id, e);
                e
            })?;

        self.shuttle.status = transition.to;
        self.shuttle.occupied = transition.occupied;
        info!(
            "Shuttle {} trip {} -> {}",
            self.shuttle.shuttle_id, transition.from, transition.to
        );

        match transition.sampler {
            SamplerAction::Activate => self.activate_sampler(),
            SamplerAction::Deactivate => self.deactivate_sampler().await,
        }
        Ok(())
    }

    /// Out-of-range changes are accepted as no-ops; changes outside a trip
    /// are rejected.
    pub async fn update_occupancy(&mut self, delta: i32) -> Result<OccupancyOutcome> {
        self.authorize()?;
        let next = match occupancy::next_occupied(&self.shuttle, delta)? {
            Some(next) => next,
            None => return Ok(OccupancyOutcome::Unchanged(self.shuttle.occupied)),
        };

        self.store
            .set_occupied(&self.shuttle.shuttle_id, next)
            .await
            .map_err(|e| {
                error!("Failed to update occupied count: {}", e);
                e
            })?;
        self.shuttle.occupied = next;
        Ok(OccupancyOutcome::Updated(next))
    }

    pub fn set_alert_draft(&mut self, text: impl Into<String>) {
        self.composer.set_draft(text);
    }

    pub fn alert_draft(&self) -> &str {
        self.composer.draft()
    }

    pub async fn send_alert(&mut self) -> Result<Alert> {
        self.authorize()?;
        self.composer
            .send(
                self.store.as_ref(),
                &self.shuttle.shuttle_id,
                self.shuttle.display_name(),
            )
            .await
    }

    /// Leaves the dashboard; tracking stops with it.
    pub async fn close(mut self) {
        self.deactivate_sampler().await;
    }

    fn activate_sampler(&mut self) {
        if !self.permission.is_granted() || self.sampler.is_some() {
            return;
        }
        let sampler = PositionSampler::new(
            self.store.clone(),
            self.location.clone(),
            self.shuttle.shuttle_id.clone(),
            self.settings.sample_interval,
        );
        self.sampler = Some(sampler.start());
    }

    async fn deactivate_sampler(&mut self) {
        if let Some(handle) = self.sampler.take() {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LocalAuth;
    use crate::location::StaticLocation;
    use crate::models::{Coordinates, ShuttleStatus};
    use crate::store::MemoryStore;

    const PERIOD: Duration = Duration::from_secs(5);

    fn driver() -> Account {
        Account {
            uid: "driver-1".to_string(),
            email: "driver@ug.edu.gh".to_string(),
            display_name: Some("Kwame".to_string()),
        }
    }

    fn signed_in() -> Arc<LocalAuth> {
        Arc::new(LocalAuth::signed_in(driver()))
    }

    fn registration(capacity: i32) -> ShuttleRegistration {
        ShuttleRegistration {
            code: "UG-10".to_string(),
            name: "Legon Loop".to_string(),
            capacity,
            driver_name: "Kwame".to_string(),
        }
    }

    fn gps() -> Arc<dyn LocationProvider> {
        Arc::new(StaticLocation::new(Coordinates {
            latitude: 5.6505,
            longitude: -0.1862,
        }))
    }

    async fn session_with(
        store: &MemoryStore,
        capacity: i32,
        location: Arc<dyn LocationProvider>,
        settings: DriverSettings,
    ) -> DriverSession {
        register_shuttle(store, Some(&driver()), registration(capacity))
            .await
            .unwrap();
        DriverSession::open(signed_in(), Arc::new(store.clone()), location, settings)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_requires_sign_in_and_fields() {
        let store = MemoryStore::new();
        let err = register_shuttle(&store, None, registration(4)).await.unwrap_err();
        assert!(matches!(err, TrackerError::Unauthenticated));

        let mut incomplete = registration(4);
        incomplete.code.clear();
        assert!(register_shuttle(&store, Some(&driver()), incomplete)
            .await
            .unwrap_err()
            .is_validation());
        assert!(store.get_shuttle("driver-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_landing_depends_on_registration() {
        let store = MemoryStore::new();
        assert_eq!(
            driver_landing(&store, &driver()).await.unwrap(),
            DriverLanding::Register
        );
        register_shuttle(&store, Some(&driver()), registration(4))
            .await
            .unwrap();
        assert_eq!(
            driver_landing(&store, &driver()).await.unwrap(),
            DriverLanding::Dashboard
        );
    }

    #[tokio::test]
    async fn test_open_without_shuttle_is_not_found() {
        let store = MemoryStore::new();
        let err = DriverSession::open(signed_in(), Arc::new(store), gps(), DriverSettings::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_occupancy_rejected_before_trip() {
        let store = MemoryStore::new();
        let mut session = session_with(&store, 4, gps(), DriverSettings::default()).await;

        for delta in [1, -1] {
            let err = session.update_occupancy(delta).await.unwrap_err();
            assert!(err.is_validation());
            assert_eq!(session.shuttle().occupied, 0);
        }
        session.close().await;
    }

    #[tokio::test]
    async fn test_start_trip_resets_occupied() {
        let store = MemoryStore::new();
        register_shuttle(&store, Some(&driver()), registration(8))
            .await
            .unwrap();
        let mut stale = store.get_shuttle("driver-1").await.unwrap().unwrap();
        stale.occupied = 5;
        store.upsert_shuttle(&stale).await.unwrap();

        let mut session =
            DriverSession::open(signed_in(), Arc::new(store.clone()), gps(), DriverSettings::default())
                .await
                .unwrap();
        assert_eq!(session.shuttle().occupied, 5);

        session.start_trip().await.unwrap();
        assert_eq!(session.shuttle().occupied, 0);
        assert_eq!(session.shuttle().status, ShuttleStatus::InProgress);
        let stored = store.get_shuttle("driver-1").await.unwrap().unwrap();
        assert_eq!(stored.occupied, 0);
        assert_eq!(stored.status, ShuttleStatus::InProgress);
        session.close().await;
    }

    #[tokio::test]
    async fn test_full_shuttle_ignores_extra_boarding() {
        let store = MemoryStore::new();
        let mut session = session_with(&store, 4, gps(), DriverSettings::default()).await;
        session.start_trip().await.unwrap();

        for expected in 1..=4 {
            assert_eq!(
                session.update_occupancy(1).await.unwrap(),
                OccupancyOutcome::Updated(expected)
            );
        }
        assert_eq!(
            session.update_occupancy(1).await.unwrap(),
            OccupancyOutcome::Unchanged(4)
        );
        assert_eq!(session.shuttle().occupied, 4);
        assert_eq!(store.get_shuttle("driver-1").await.unwrap().unwrap().occupied, 4);

        for _ in 0..4 {
            session.update_occupancy(-1).await.unwrap();
        }
        assert_eq!(
            session.update_occupancy(-1).await.unwrap(),
            OccupancyOutcome::Unchanged(0)
        );
        session.close().await;
    }

    #[tokio::test]
    async fn test_failed_write_leaves_session_unchanged() {
        let store = MemoryStore::new();
        let mut session = session_with(&store, 4, gps(), DriverSettings::default()).await;

        store.set_offline(true);
        let err = session.start_trip().await.unwrap_err();
        assert!(matches!(err, TrackerError::Remote(_)));
        assert_eq!(session.shuttle().status, ShuttleStatus::NotStarted);
        assert!(!session.is_tracking());

        store.set_offline(false);
        session.start_trip().await.unwrap();
        session.update_occupancy(1).await.unwrap();

        store.set_offline(true);
        assert!(session.update_occupancy(1).await.is_err());
        assert_eq!(session.shuttle().occupied, 1);
        assert!(session.end_trip().await.is_err());
        assert_eq!(session.shuttle().status, ShuttleStatus::InProgress);
        assert!(session.is_tracking());

        store.set_offline(false);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_trip_stops_position_writes() {
        let store = MemoryStore::new();
        let settings = DriverSettings {
            sample_interval: PERIOD,
            ..DriverSettings::default()
        };
        let mut session = session_with(&store, 4, gps(), settings).await;

        session.start_trip().await.unwrap();
        assert!(session.is_tracking());
        tokio::time::sleep(PERIOD * 2 + Duration::from_millis(100)).await;
        assert_eq!(store.position_count("driver-1"), 2);

        session.end_trip().await.unwrap();
        assert!(!session.is_tracking());
        assert_eq!(session.shuttle().status, ShuttleStatus::Ended);
        assert_eq!(session.shuttle().occupied, 0);

        let after_end = store.position_count("driver-1");
        tokio::time::sleep(PERIOD * 2).await;
        assert_eq!(store.position_count("driver-1"), after_end);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_permission_runs_trip_without_tracking() {
        let store = MemoryStore::new();
        let mut session = session_with(
            &store,
            4,
            Arc::new(StaticLocation::denied()),
            DriverSettings::default(),
        )
        .await;
        assert_eq!(session.permission(), Permission::Denied);

        session.start_trip().await.unwrap();
        assert!(!session.is_tracking());
        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(store.position_count("driver-1"), 0);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopening_resumes_running_trip() {
        let store = MemoryStore::new();
        let mut session = session_with(&store, 4, gps(), DriverSettings::default()).await;
        session.start_trip().await.unwrap();
        session.close().await;

        let session =
            DriverSession::open(signed_in(), Arc::new(store.clone()), gps(), DriverSettings::default())
                .await
                .unwrap();
        assert!(session.is_tracking());
        tokio::time::sleep(PERIOD + Duration::from_millis(100)).await;
        assert_eq!(store.position_count("driver-1"), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn test_ended_trip_needs_reregistration() {
        let store = MemoryStore::new();
        let mut session = session_with(&store, 4, gps(), DriverSettings::default()).await;
        session.start_trip().await.unwrap();
        session.end_trip().await.unwrap();
        assert!(session.start_trip().await.unwrap_err().is_validation());
        session.close().await;

        register_shuttle(&store, Some(&driver()), registration(4))
            .await
            .unwrap();
        let mut session =
            DriverSession::open(signed_in(), Arc::new(store.clone()), gps(), DriverSettings::default())
                .await
                .unwrap();
        assert_eq!(session.shuttle().status, ShuttleStatus::NotStarted);
        session.start_trip().await.unwrap();
        session.close().await;
    }

    #[tokio::test]
    async fn test_restart_after_end_when_allowed() {
        let store = MemoryStore::new();
        let settings = DriverSettings {
            lifecycle: LifecyclePolicy {
                allow_restart_after_end: true,
            },
            ..DriverSettings::default()
        };
        let mut session = session_with(&store, 4, gps(), settings).await;
        session.start_trip().await.unwrap();
        session.end_trip().await.unwrap();
        session.start_trip().await.unwrap();
        assert_eq!(session.shuttle().status, ShuttleStatus::InProgress);
        session.close().await;
    }

    #[tokio::test]
    async fn test_alert_carries_shuttle_name() {
        let store = MemoryStore::new();
        let mut session = session_with(&store, 4, gps(), DriverSettings::default()).await;
        session.set_alert_draft("Leaving Night Market in 2 minutes");
        let alert = session.send_alert().await.unwrap();
        assert_eq!(alert.shuttle_name, "Legon Loop");
        assert_eq!(alert.shuttle_id, "driver-1");
        assert!(session.alert_draft().is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn test_open_requires_sign_in() {
        let store = MemoryStore::new();
        register_shuttle(&store, Some(&driver()), registration(4))
            .await
            .unwrap();
        let err = DriverSession::open(
            Arc::new(LocalAuth::new()),
            Arc::new(store),
            gps(),
            DriverSettings::default(),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, TrackerError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_signed_out_driver_cannot_change_trip() {
        let store = MemoryStore::new();
        register_shuttle(&store, Some(&driver()), registration(4))
            .await
            .unwrap();
        let auth = signed_in();
        let mut session =
            DriverSession::open(auth.clone(), Arc::new(store.clone()), gps(), DriverSettings::default())
                .await
                .unwrap();
        session.start_trip().await.unwrap();

        auth.sign_out().await.unwrap();
        assert!(matches!(
            session.end_trip().await,
            Err(TrackerError::Unauthenticated)
        ));
        assert!(matches!(
            session.update_occupancy(1).await,
            Err(TrackerError::Unauthenticated)
        ));
        session.set_alert_draft("Running late");
        assert!(matches!(
            session.send_alert().await,
            Err(TrackerError::Unauthenticated)
        ));
        let stored = store.get_shuttle("driver-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ShuttleStatus::InProgress);
        assert_eq!(stored.occupied, 0);
        session.close().await;
    }

    #[tokio::test]
    async fn test_other_account_cannot_operate_shuttle() {
        let store = MemoryStore::new();
        register_shuttle(&store, Some(&driver()), registration(4))
            .await
            .unwrap();
        let auth = signed_in();
        let mut session =
            DriverSession::open(auth.clone(), Arc::new(store.clone()), gps(), DriverSettings::default())
                .await
                .unwrap();

        // Someone else signs in on the same device.
        auth.sign_up("kofi@ug.edu.gh", "pw").await.unwrap();

        assert!(matches!(
            session.start_trip().await,
            Err(TrackerError::Permission(_))
        ));
        assert_eq!(session.shuttle().status, ShuttleStatus::NotStarted);
        assert_eq!(
            store.get_shuttle("driver-1").await.unwrap().unwrap().status,
            ShuttleStatus::NotStarted
        );
        session.close().await;
    }
}
