pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod location;
pub mod models;
pub mod profile_cache;
pub mod rider;
pub mod store;
pub mod weather;

pub use error::{Result, TrackerError};
