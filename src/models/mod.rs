pub mod account;
pub mod alert;
pub mod message;
pub mod position;
pub mod shuttle;

pub use account::{Account, Role, UserRecord};
pub use alert::Alert;
pub use position::{Coordinates, PositionSample};
pub use shuttle::{Shuttle, ShuttleRegistration, ShuttleStatus};
