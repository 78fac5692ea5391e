use crate::simulation_engine::intersections::Snapshot;
use crate::simulation_engine::lanes::LaneId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lane-state transition worth a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionEvent {
    SignalChanged { lane: LaneId, vehicles: u32 },
    EmergencyCleared { lane: LaneId },
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransitionEvent::SignalChanged { lane, vehicles } => write!(
                f,
                "Signal change: green for {} ({} cars).",
                lane.label(),
                vehicles
            ),
            TransitionEvent::EmergencyCleared { lane } => {
                write!(f, "Emergency cleared at {}.", lane.label())
            }
        }
    }
}

/// Diffs two consecutive snapshots. Signal changes come before emergency
/// clearances within one diff.
pub fn transitions(previous: &Snapshot, next: &Snapshot) -> Vec<TransitionEvent> {
    let mut events = Vec::new();

    let previous_green = previous.green_lane().map(|lane| lane.id);
    if let Some(green) = next.green_lane() {
        if previous_green != Some(green.id) {
            events.push(TransitionEvent::SignalChanged {
                lane: green.id,
                vehicles: green.vehicle_count,
            });
        }
    }

    if let Some(previous_emergency) = previous.emergency_lane() {
        let still_flagged = next
            .emergency_lane()
            .map(|lane| lane.id == previous_emergency.id)
            .unwrap_or(false);
        if !still_flagged {
            events.push(TransitionEvent::EmergencyCleared {
                lane: previous_emergency.id,
            });
        }
    }

    events
}
