use crate::config::TrafficConfig;
use crate::simulation_engine::intersections::Snapshot;
use crate::simulation_engine::lanes::{Lane, LaneId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Suggested approach for drivers plus a congestion flag, derived from one
/// snapshot. Read-only: nothing here feeds back into the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAdvice {
    pub best_lane: LaneId,
    pub best_label: String,
    pub busiest_lane: LaneId,
    pub total_vehicles: u32,
    pub congested: bool,
}

/// Orders lanes by how attractive they are to join: lanes without an
/// emergency first, then the green lane, then the shortest queue. Lane order
/// breaks the remaining ties.
fn route_preference(a: &Lane, b: &Lane) -> Ordering {
    a.is_emergency
        .cmp(&b.is_emergency)
        .then_with(|| b.is_green().cmp(&a.is_green()))
        .then_with(|| a.vehicle_count.cmp(&b.vehicle_count))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn best_route(snapshot: &Snapshot) -> LaneId {
    snapshot
        .lanes()
        .iter()
        .min_by(|a, b| route_preference(a, b))
        .map(|lane| lane.id)
        .unwrap_or(LaneId::Lane1)
}

/// Rule-based advice used when no richer source is available.
pub fn analyze_traffic(snapshot: &Snapshot, config: &TrafficConfig) -> RouteAdvice {
    let best_lane = best_route(snapshot);
    let busiest_lane = snapshot
        .lanes()
        .iter()
        .fold(None::<&Lane>, |best, lane| match best {
            Some(current) if current.vehicle_count >= lane.vehicle_count => Some(current),
            _ => Some(lane),
        })
        .map(|lane| lane.id)
        .unwrap_or(LaneId::Lane1);
    let total_vehicles = snapshot.total_vehicles();

    RouteAdvice {
        best_lane,
        best_label: best_lane.label().to_string(),
        busiest_lane,
        total_vehicles,
        congested: total_vehicles > config.high_congestion_threshold,
    }
}
