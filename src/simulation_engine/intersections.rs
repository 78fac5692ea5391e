use crate::simulation_engine::lanes::{create_lanes, Lane, LaneId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contract violations found at a snapshot boundary. These indicate a bug in
/// whoever produced the snapshot and are never repaired silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("lane record at position {position} is {found}")]
    LaneOutOfOrder { position: usize, found: LaneId },
    #[error("more than one green lane: {0:?}")]
    MultipleGreen(Vec<LaneId>),
    #[error("no lane holds the green phase")]
    NoGreen,
    #[error("more than one emergency lane: {0:?}")]
    MultipleEmergency(Vec<LaneId>),
    #[error("{lane} holds {count} vehicles, above the cap of {cap}")]
    CountAboveCap { lane: LaneId, count: u32, cap: u32 },
}

/// State of all four lanes at one instant. Passed by value between ticks;
/// the scheduler owns the authoritative copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    lanes: [Lane; 4],
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::all_red()
    }
}

impl Snapshot {
    /// Every lane red and empty. The controller treats this as a cold start.
    pub fn all_red() -> Self {
        Self {
            lanes: create_lanes(),
        }
    }

    /// Start-up state: lane 1 green for `green_time` seconds, the rest red.
    pub fn initial(green_time: u32) -> Self {
        Self::all_red().with_green(LaneId::Lane1, green_time)
    }

    pub fn lanes(&self) -> &[Lane; 4] {
        &self.lanes
    }

    pub fn lane(&self, id: LaneId) -> &Lane {
        &self.lanes[id.index()]
    }

    pub fn lane_mut(&mut self, id: LaneId) -> &mut Lane {
        &mut self.lanes[id.index()]
    }

    pub fn green_lane(&self) -> Option<&Lane> {
        self.lanes.iter().find(|lane| lane.is_green())
    }

    pub fn emergency_lane(&self) -> Option<&Lane> {
        self.lanes.iter().find(|lane| lane.is_emergency)
    }

    pub fn total_vehicles(&self) -> u32 {
        self.lanes.iter().map(|lane| lane.vehicle_count).sum()
    }

    /// Grants `id` the green phase with `timer` seconds; every other lane
    /// goes red with a zero timer.
    pub fn with_green(mut self, id: LaneId, timer: u32) -> Self {
        for lane in self.lanes.iter_mut() {
            if lane.id == id {
                lane.set_green(timer);
            } else {
                lane.set_red();
            }
        }
        self
    }

    /// Lowers every timer by one second, flooring at zero. Signals unchanged.
    pub fn count_down(mut self) -> Self {
        for lane in self.lanes.iter_mut() {
            lane.timer = lane.timer.saturating_sub(1);
        }
        self
    }

    pub fn with_counts(mut self, counts: [u32; 4]) -> Self {
        for (lane, count) in self.lanes.iter_mut().zip(counts) {
            lane.vehicle_count = count;
        }
        self
    }

    /// Flags `id` as the emergency lane and clears the flag everywhere else.
    pub fn with_emergency(mut self, id: LaneId) -> Self {
        for lane in self.lanes.iter_mut() {
            lane.is_emergency = lane.id == id;
        }
        self
    }

    /// Checks the invariants that hold at every committed snapshot. Zero
    /// green lanes is allowed here; see [`Snapshot::validate_settled`].
    pub fn validate(&self, max_vehicle_count: u32) -> Result<(), SnapshotError> {
        for (position, lane) in self.lanes.iter().enumerate() {
            if lane.id != LaneId::ALL[position] {
                return Err(SnapshotError::LaneOutOfOrder {
                    position,
                    found: lane.id,
                });
            }
            if lane.vehicle_count > max_vehicle_count {
                return Err(SnapshotError::CountAboveCap {
                    lane: lane.id,
                    count: lane.vehicle_count,
                    cap: max_vehicle_count,
                });
            }
        }

        let greens: Vec<LaneId> = self
            .lanes
            .iter()
            .filter(|lane| lane.is_green())
            .map(|lane| lane.id)
            .collect();
        if greens.len() > 1 {
            return Err(SnapshotError::MultipleGreen(greens));
        }

        let emergencies: Vec<LaneId> = self
            .lanes
            .iter()
            .filter(|lane| lane.is_emergency)
            .map(|lane| lane.id)
            .collect();
        if emergencies.len() > 1 {
            return Err(SnapshotError::MultipleEmergency(emergencies));
        }
        Ok(())
    }

    /// Like [`Snapshot::validate`], and additionally requires exactly one
    /// green lane, as every controller output must have.
    pub fn validate_settled(&self, max_vehicle_count: u32) -> Result<(), SnapshotError> {
        self.validate(max_vehicle_count)?;
        if self.green_lane().is_none() {
            return Err(SnapshotError::NoGreen);
        }
        Ok(())
    }
}
