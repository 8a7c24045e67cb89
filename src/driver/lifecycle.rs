use crate::error::{Result, TrackerError};
use crate::models::ShuttleStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripCommand {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerAction {
    /// Start sampling, if location permission was granted.
    Activate,
    Deactivate,
}

/// The write a driver command produces. Status and occupancy go to the
/// store together; occupancy always resets on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ShuttleStatus,
    pub to: ShuttleStatus,
    pub occupied: i32,
    pub sampler: SamplerAction,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LifecyclePolicy {
    /// Lets an ended trip be started again without re-registering.
    pub allow_restart_after_end: bool,
}

impl LifecyclePolicy {
    pub fn transition(&self, from: ShuttleStatus, command: TripCommand) -> Result<Transition> {
        let to = match (command, from) {
            (TripCommand::Start, ShuttleStatus::NotStarted) => ShuttleStatus::InProgress,
            (TripCommand::Start, ShuttleStatus::Ended) if self.allow_restart_after_end => {
                ShuttleStatus::InProgress
            }
            (TripCommand::Start, ShuttleStatus::Ended) => {
                return Err(TrackerError::validation(
                    "This trip has ended. Register the shuttle again to start a new trip.",
                ))
            }
            (TripCommand::Start, ShuttleStatus::InProgress) => {
                return Err(TrackerError::validation("A trip is already in progress."))
            }
            (TripCommand::End, ShuttleStatus::InProgress) => ShuttleStatus::Ended,
            (TripCommand::End, _) => {
                return Err(TrackerError::validation("There is no trip in progress to end."))
            }
        };

        let sampler = match to {
            ShuttleStatus::InProgress => SamplerAction::Activate,
            _ => SamplerAction::Deactivate,
        };

        Ok(Transition {
            from,
            to,
            occupied: 0,
            sampler,
        })
    }
}
