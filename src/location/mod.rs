//! Device position sources for the driver's sampler.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{Result, TrackerError};
use crate::models::Coordinates;

pub mod kafka;

pub use kafka::KafkaLocationFeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

impl Permission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Permission::Granted)
    }
}

pub trait LocationProvider: Send + Sync {
    fn request_permission(&self) -> BoxFuture<'_, Result<Permission>>;

    /// May fail on revoked permission or lost signal.
    fn current_position(&self) -> BoxFuture<'_, Result<Coordinates>>;
}

/// A fixed position, for stationary test rigs and demos.
#[derive(Debug, Clone)]
pub struct StaticLocation {
    coordinates: Option<Coordinates>,
}

impl StaticLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
        }
    }

    /// A device that refuses location access.
    pub fn denied() -> Self {
        Self { coordinates: None }
    }
}

impl LocationProvider for StaticLocation {
    fn request_permission(&self) -> BoxFuture<'_, Result<Permission>> {
        let permission = if self.coordinates.is_some() {
            Permission::Granted
        } else {
            Permission::Denied
        };
        async move { Ok(permission) }.boxed()
    }

    fn current_position(&self) -> BoxFuture<'_, Result<Coordinates>> {
        let coordinates = self.coordinates;
        async move {
            coordinates.ok_or_else(|| TrackerError::Permission("location access denied".to_string()))
        }
        .boxed()
    }
}
