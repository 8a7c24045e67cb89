use crate::error::{Result, TrackerError};
use crate::models::Shuttle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyOutcome {
    Updated(i32),
    /// The change would leave `[0, capacity]`; nothing was written.
    Unchanged(i32),
}

impl OccupancyOutcome {
    pub fn occupied(&self) -> i32 {
        match self {
            OccupancyOutcome::Updated(n) | OccupancyOutcome::Unchanged(n) => *n,
        }
    }
}

/// The count `delta` would produce, or `None` when it falls out of range.
/// Counting is only allowed during a trip.
pub fn next_occupied(shuttle: &Shuttle, delta: i32) -> Result<Option<i32>> {
    if !shuttle.is_in_progress() {
        return Err(TrackerError::validation(
            "Cannot update occupied count. Please start a trip first.",
        ));
    }

    let next = match shuttle.occupied.checked_add(delta) {
        Some(n) => n,
        None => return Ok(None),
    };
    if next < 0 || next > shuttle.capacity {
        return Ok(None);
    }
    Ok(Some(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ShuttleRegistration, ShuttleStatus};

    fn shuttle(status: ShuttleStatus, occupied: i32, capacity: i32) -> Shuttle {
        let mut shuttle = ShuttleRegistration {
            code: "UG-02".to_string(),
            name: "Night Line".to_string(),
            capacity,
            driver_name: "Esi".to_string(),
        }
        .into_shuttle("d");
        shuttle.status = status;
        shuttle.occupied = occupied;
        shuttle
    }

    #[test]
    fn test_rejected_outside_trip() {
        for status in [ShuttleStatus::NotStarted, ShuttleStatus::Ended] {
            for delta in [1, -1] {
                assert!(next_occupied(&shuttle(status, 0, 4), delta)
                    .unwrap_err()
                    .is_validation());
            }
        }
    }

    #[test]
    fn test_bounds_are_no_ops() {
        assert_eq!(next_occupied(&shuttle(ShuttleStatus::InProgress, 4, 4), 1).unwrap(), None);
        assert_eq!(next_occupied(&shuttle(ShuttleStatus::InProgress, 0, 4), -1).unwrap(), None);
        assert_eq!(next_occupied(&shuttle(ShuttleStatus::InProgress, 3, 4), 1).unwrap(), Some(4));
        assert_eq!(next_occupied(&shuttle(ShuttleStatus::InProgress, 1, 4), -1).unwrap(), Some(0));
    }
}
