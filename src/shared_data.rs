// src/shared_data.rs

use crate::simulation_engine::intersections::Snapshot;
use crate::simulation_engine::lanes::{LaneId, LightState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// What the phase output sink sees for one lane after a controller tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanePhase {
    pub lane: LaneId,
    pub label: String,
    pub signal: LightState,
    pub timer: u32,
    pub vehicle_count: u32,
    pub is_emergency: bool,
}

/// Phase assignment published after every controller tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub tick: u64,
    pub timestamp: u64,
    pub lanes: Vec<LanePhase>,
}

impl PhaseReport {
    pub fn from_snapshot(tick: u64, timestamp: u64, snapshot: &Snapshot) -> Self {
        let lanes = snapshot
            .lanes()
            .iter()
            .map(|lane| LanePhase {
                lane: lane.id,
                label: lane.id.label().to_string(),
                signal: lane.light_state,
                timer: lane.timer,
                vehicle_count: lane.vehicle_count,
                is_emergency: lane.is_emergency,
            })
            .collect();
        Self {
            tick,
            timestamp,
            lanes,
        }
    }

    pub fn green(&self) -> Option<&LanePhase> {
        self.lanes
            .iter()
            .find(|lane| lane.signal == LightState::Green)
    }

    /// One flat CSV row per lane.
    pub fn records(&self) -> Vec<PhaseRecord> {
        self.lanes
            .iter()
            .map(|lane| PhaseRecord {
                tick: self.tick,
                timestamp: self.timestamp,
                lane: lane.lane,
                signal: lane.signal,
                timer: lane.timer,
                vehicle_count: lane.vehicle_count,
                is_emergency: lane.is_emergency,
            })
            .collect()
    }
}

/// Flattened [`PhaseReport`] row, the shape stored in phase CSV files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub tick: u64,
    pub timestamp: u64,
    pub lane: LaneId,
    pub signal: LightState,
    pub timer: u32,
    pub vehicle_count: u32,
    pub is_emergency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentKind {
    Accident,
    RoadWork,
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IncidentKind::Accident => f.write_str("Accident"),
            IncidentKind::RoadWork => f.write_str("Pothole / Road Work"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedBy {
    Citizen,
}

/// Incident filed by an operator. Logged only; the controller never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub timestamp: u64,
    pub kind: IncidentKind,
    pub lane: LaneId,
    pub lane_label: String,
    pub reported_by: ReportedBy,
}

impl fmt::Display for IncidentReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "USER REPORT: Citizen reported {} on {}.",
            self.kind, self.lane_label
        )
    }
}
