use crate::core::geo::Location;
use crate::core::in_flight::InFlight;
use crate::core::proximity::ProximityTracker;
use crate::storage::{ScooterRecord, UserRecord};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Lock,
    RequestPhoto,
    Unlock,
}

impl Decision {
    /// Reply body understood by the scooter firmware.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Decision::Lock => "lock*",
            Decision::RequestPhoto => "photo*",
            Decision::Unlock => "unlock*",
        }
    }
}

/// Observable scooter state. `AwaitingPhoto` is never persisted; it is what an
/// unassigned scooter with riders nearby and an idle classifier looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScooterState {
    Unassigned,
    AwaitingPhoto,
    Assigned,
}

pub struct ScooterStateMachine {
    tracker: Arc<ProximityTracker>,
    in_flight: Arc<InFlight>,
}

impl ScooterStateMachine {
    pub fn new(tracker: Arc<ProximityTracker>, in_flight: Arc<InFlight>) -> Self {
        Self { tracker, in_flight }
    }

    pub fn decide(&self, scooter: &ScooterRecord, location: Location, users: &[UserRecord]) -> Decision {
        let nearby = self.tracker.refresh_for_scooter(
            &scooter.scooter_id,
            location,
            users.iter().map(|u| (u.username.as_str(), u.location)),
        );

        let decision = if nearby.is_empty() {
            Decision::Lock
        } else if self.in_flight.is_set() {
            // A classification is pending somewhere; hold everything locked
            Decision::Lock
        } else if scooter.is_assigned() {
            Decision::Unlock
        } else {
            Decision::RequestPhoto
        };

        tracing::debug!(
            scooter = %scooter.scooter_id,
            nearby = nearby.len(),
            state = ?self.state_of(scooter, !nearby.is_empty()),
            ?decision,
            "scooter decision"
        );
        decision
    }

    pub fn state_of(&self, scooter: &ScooterRecord, anyone_near: bool) -> ScooterState {
        if scooter.is_assigned() {
            ScooterState::Assigned
        } else if anyone_near && !self.in_flight.is_set() {
            ScooterState::AwaitingPhoto
        } else {
            ScooterState::Unassigned
        }
    }
}
