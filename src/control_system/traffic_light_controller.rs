use crate::config::TrafficConfig;
use crate::simulation_engine::intersections::{Snapshot, SnapshotError};
use crate::simulation_engine::lanes::{Lane, LaneId};
use std::fmt;

/// Which rule produced a tick's snapshot. Returned alongside the snapshot so
/// callers can log the decision after releasing shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDecision {
    EmergencyPreempted { lane: LaneId },
    EmergencyRefreshed { lane: LaneId },
    ColdStart { lane: LaneId, green_time: u32 },
    WastedGreenTruncated { lane: LaneId },
    CountedDown,
    Extended { lane: LaneId },
    Switched { from: LaneId, to: LaneId, green_time: u32 },
}

impl fmt::Display for PhaseDecision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhaseDecision::EmergencyPreempted { lane } => {
                write!(f, "preempted current phase for emergency on {}", lane)
            }
            PhaseDecision::EmergencyRefreshed { lane } => {
                write!(f, "refreshed emergency green on {}", lane)
            }
            PhaseDecision::ColdStart { lane, green_time } => {
                write!(f, "cold start, granting {} for {}s", lane, green_time)
            }
            PhaseDecision::WastedGreenTruncated { lane } => {
                write!(f, "{} is empty, shortening its green", lane)
            }
            PhaseDecision::CountedDown => f.write_str("counting down"),
            PhaseDecision::Extended { lane } => write!(f, "extending green on {}", lane),
            PhaseDecision::Switched {
                from,
                to,
                green_time,
            } => write!(
                f,
                "phase expired on {}, granting {} for {}s",
                from, to, green_time
            ),
        }
    }
}

/// Adaptive signal controller for the four-way intersection.
///
/// The controller holds only configuration. Every decision is computed from
/// the snapshot it is handed, so the same snapshot always produces the same
/// next snapshot and any scheduler (or a test) can drive it.
#[derive(Debug, Clone)]
pub struct TrafficLightController {
    config: TrafficConfig,
}

impl TrafficLightController {
    pub fn new(config: TrafficConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    pub fn calculate_green_time(&self, vehicle_count: u32) -> u32 {
        self.config.calculate_green_time(vehicle_count)
    }

    /// One controller tick with the snapshot contract enforced on both
    /// sides: the input may have no green lane (cold start), the output must
    /// have exactly one.
    pub fn tick(&self, snapshot: &Snapshot) -> Result<Snapshot, SnapshotError> {
        self.decide_tick(snapshot).map(|(next, _)| next)
    }

    /// [`TrafficLightController::tick`] that also reports which rule fired.
    pub fn decide_tick(
        &self,
        snapshot: &Snapshot,
    ) -> Result<(Snapshot, PhaseDecision), SnapshotError> {
        snapshot.validate(self.config.max_vehicle_count)?;
        let (next, decision) = self.decide(snapshot);
        next.validate_settled(self.config.max_vehicle_count)?;
        Ok((next, decision))
    }

    /// Computes the next phase assignment.
    pub fn next_phase(&self, snapshot: &Snapshot) -> Snapshot {
        self.decide(snapshot).0
    }

    /// Rules are tried in order and the first match wins.
    pub fn decide(&self, snapshot: &Snapshot) -> (Snapshot, PhaseDecision) {
        let min_before_switch = self.config.min_timer_before_switch;

        // Emergency preemption
        if let Some(emergency) = snapshot.emergency_lane() {
            let lane = emergency.id;
            if !emergency.is_green() {
                return (
                    snapshot.with_green(lane, self.config.emergency_green_time),
                    PhaseDecision::EmergencyPreempted { lane },
                );
            }
            if emergency.timer < min_before_switch {
                let mut next = *snapshot;
                next.lane_mut(lane).timer = self.config.min_green_time;
                return (next, PhaseDecision::EmergencyRefreshed { lane });
            }
            return (snapshot.count_down(), PhaseDecision::CountedDown);
        }

        let current = match snapshot.green_lane() {
            Some(lane) => *lane,
            None => {
                // Cold start: busiest lane first, lane 1 when all are empty.
                let busiest = busiest(snapshot.lanes().iter())
                    .copied()
                    .unwrap_or(*snapshot.lane(LaneId::Lane1));
                let green_time = self.calculate_green_time(busiest.vehicle_count);
                return (
                    snapshot.with_green(busiest.id, green_time),
                    PhaseDecision::ColdStart {
                        lane: busiest.id,
                        green_time,
                    },
                );
            }
        };

        let others_waiting = snapshot
            .lanes()
            .iter()
            .any(|lane| lane.id != current.id && lane.vehicle_count > 0);

        // Wasted green: shorten it, but still count down through the floor.
        if current.vehicle_count == 0 && others_waiting && current.timer > min_before_switch {
            let mut next = *snapshot;
            next.lane_mut(current.id).timer = min_before_switch;
            return (next, PhaseDecision::WastedGreenTruncated { lane: current.id });
        }

        if current.timer > 1 {
            return (snapshot.count_down(), PhaseDecision::CountedDown);
        }

        // Phase expired
        let selected = if !others_waiting {
            if current.vehicle_count > 0 {
                let mut next = *snapshot;
                next.lane_mut(current.id).timer = self.config.default_extend_timer;
                return (next, PhaseDecision::Extended { lane: current.id });
            }
            // Empty intersection: round-robin.
            current.id.next()
        } else {
            let candidates = snapshot.lanes().iter().filter(|lane| lane.id != current.id);
            match busiest(candidates) {
                Some(lane) => lane.id,
                None => current.id.next(),
            }
        };

        let green_time = self.calculate_green_time(snapshot.lane(selected).vehicle_count);
        (
            snapshot.with_green(selected, green_time),
            PhaseDecision::Switched {
                from: current.id,
                to: selected,
                green_time,
            },
        )
    }

    /// Flags `lane` as carrying an emergency vehicle. The flag is cleared on
    /// every other lane and the arriving vehicle joins the queue.
    pub fn activate_emergency(&self, snapshot: &Snapshot, lane: LaneId) -> Snapshot {
        let mut next = snapshot.with_emergency(lane);
        next.lane_mut(lane)
            .add_vehicles(1, self.config.max_vehicle_count);
        next
    }

    /// Clears the emergency flag on `lane`. A green lane keeps a short
    /// clearance phase instead of being cut off.
    pub fn deactivate_emergency(&self, snapshot: &Snapshot, lane: LaneId) -> Snapshot {
        let mut next = *snapshot;
        let record = next.lane_mut(lane);
        if !record.is_emergency {
            return next;
        }
        record.is_emergency = false;
        if record.is_green() {
            record.timer = self.config.emergency_clearance_timer;
        }
        next
    }

    /// Activates the emergency on `lane` unless it is already flagged, in
    /// which case it is deactivated. Returns the new snapshot and whether the
    /// emergency is now active.
    pub fn toggle_emergency(&self, snapshot: &Snapshot, lane: LaneId) -> (Snapshot, bool) {
        if snapshot.lane(lane).is_emergency {
            (self.deactivate_emergency(snapshot, lane), false)
        } else {
            (self.activate_emergency(snapshot, lane), true)
        }
    }
}

/// Lane with the strictly highest vehicle count; the earliest lane wins ties.
fn busiest<'a, I>(lanes: I) -> Option<&'a Lane>
where
    I: Iterator<Item = &'a Lane>,
{
    lanes.fold(None, |best: Option<&Lane>, lane| match best {
        Some(current) if current.vehicle_count >= lane.vehicle_count => Some(current),
        _ => Some(lane),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::lanes::LightState;

    fn controller() -> TrafficLightController {
        TrafficLightController::new(TrafficConfig::default())
    }

    fn green_of(snapshot: &Snapshot) -> (LaneId, u32) {
        let lane = snapshot.green_lane().expect("a green lane");
        (lane.id, lane.timer)
    }

    fn assert_others_red(snapshot: &Snapshot, green: LaneId) {
        for lane in snapshot.lanes() {
            if lane.id != green {
                assert_eq!(lane.light_state, LightState::Red, "{} should be red", lane.id);
                assert_eq!(lane.timer, 0, "{} should carry a zero timer", lane.id);
            }
        }
    }

    #[test]
    fn decisions_name_the_rule_that_fired() {
        let controller = controller();
        let decision = |snapshot: Snapshot| controller.decide_tick(&snapshot).unwrap().1;

        assert_eq!(
            decision(Snapshot::initial(30).with_emergency(LaneId::Lane3)),
            PhaseDecision::EmergencyPreempted { lane: LaneId::Lane3 }
        );
        assert_eq!(
            decision(Snapshot::initial(2).with_emergency(LaneId::Lane1)),
            PhaseDecision::EmergencyRefreshed { lane: LaneId::Lane1 }
        );
        assert_eq!(
            decision(Snapshot::all_red().with_counts([1, 4, 0, 0])),
            PhaseDecision::ColdStart {
                lane: LaneId::Lane2,
                green_time: 17
            }
        );
        assert_eq!(
            decision(Snapshot::initial(20).with_counts([0, 2, 0, 0])),
            PhaseDecision::WastedGreenTruncated { lane: LaneId::Lane1 }
        );
        assert_eq!(decision(Snapshot::initial(20)), PhaseDecision::CountedDown);
        assert_eq!(
            decision(Snapshot::initial(1).with_counts([6, 0, 0, 0])),
            PhaseDecision::Extended { lane: LaneId::Lane1 }
        );
        let switched = PhaseDecision::Switched {
            from: LaneId::Lane1,
            to: LaneId::Lane4,
            green_time: 20,
        };
        assert_eq!(decision(Snapshot::initial(1).with_counts([0, 2, 0, 5])), switched);
        assert_eq!(
            switched.to_string(),
            "phase expired on lane_1, granting lane_4 for 20s"
        );
    }

    #[test]
    fn emergency_preempts_running_phase() {
        let snapshot = Snapshot::initial(10)
            .with_green(LaneId::Lane2, 40)
            .with_counts([3, 20, 7, 1])
            .with_emergency(LaneId::Lane4);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane4, 60));
        assert_others_red(&next, LaneId::Lane4);
    }

    #[test]
    fn emergency_green_is_refreshed_when_low() {
        let snapshot = Snapshot::all_red()
            .with_green(LaneId::Lane3, 2)
            .with_counts([0, 0, 4, 0])
            .with_emergency(LaneId::Lane3);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane3, 10));
    }

    #[test]
    fn emergency_green_counts_down_otherwise() {
        let snapshot = Snapshot::all_red()
            .with_green(LaneId::Lane3, 3)
            .with_counts([9, 0, 4, 0])
            .with_emergency(LaneId::Lane3);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane3, 2));
        assert!(next.lane(LaneId::Lane3).is_emergency);
    }

    #[test]
    fn cold_start_picks_busiest_lane() {
        let snapshot = Snapshot::all_red().with_counts([2, 9, 4, 0]);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane2, 32));
        assert_others_red(&next, LaneId::Lane2);
    }

    #[test]
    fn cold_start_with_empty_intersection_picks_lane_one() {
        let next = controller().tick(&Snapshot::all_red()).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane1, 10));
    }

    #[test]
    fn wasted_green_is_truncated_not_switched() {
        let snapshot = Snapshot::initial(25).with_counts([0, 0, 1, 0]);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane1, 3));
    }

    #[test]
    fn truncated_green_counts_down_before_switching() {
        let controller = controller();
        let mut snapshot = Snapshot::initial(25).with_counts([0, 0, 6, 0]);
        let mut timers = Vec::new();
        for _ in 0..4 {
            snapshot = controller.tick(&snapshot).unwrap();
            timers.push(green_of(&snapshot));
        }
        assert_eq!(
            timers,
            vec![
                (LaneId::Lane1, 3),
                (LaneId::Lane1, 2),
                (LaneId::Lane1, 1),
                (LaneId::Lane3, 23),
            ]
        );
    }

    #[test]
    fn running_timer_counts_down() {
        let snapshot = Snapshot::initial(12).with_counts([5, 2, 0, 0]);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane1, 11));
    }

    #[test]
    fn expired_phase_goes_to_busiest_candidate() {
        let snapshot = Snapshot::initial(1).with_counts([30, 4, 12, 11]);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane3, 41));
        assert_others_red(&next, LaneId::Lane3);
    }

    #[test]
    fn expired_phase_extends_when_only_current_lane_waits() {
        let snapshot = Snapshot::initial(1).with_counts([6, 0, 0, 0]);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next), (LaneId::Lane1, 15));
    }

    #[test]
    fn empty_intersection_cycles_round_robin() {
        let controller = controller();
        let mut order = Vec::new();
        let mut current = LaneId::Lane1;
        for _ in 0..4 {
            let expired = Snapshot::all_red().with_green(current, 1);
            current = green_of(&controller.tick(&expired).unwrap()).0;
            order.push(current);
        }
        assert_eq!(
            order,
            vec![LaneId::Lane2, LaneId::Lane3, LaneId::Lane4, LaneId::Lane1]
        );
    }

    #[test]
    fn ties_go_to_lower_indexed_lane() {
        let snapshot = Snapshot::initial(1).with_counts([0, 8, 0, 8]);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next).0, LaneId::Lane2);

        let snapshot = Snapshot::all_red().with_counts([0, 0, 5, 5]);
        let next = controller().tick(&snapshot).unwrap();
        assert_eq!(green_of(&next).0, LaneId::Lane3);
    }

    #[test]
    fn malformed_input_is_reported() {
        let mut snapshot = Snapshot::initial(10);
        snapshot.lane_mut(LaneId::Lane2).set_green(10);
        assert!(matches!(
            controller().tick(&snapshot),
            Err(SnapshotError::MultipleGreen(_))
        ));
    }

    #[test]
    fn activating_emergency_moves_the_flag() {
        let controller = controller();
        let snapshot = Snapshot::initial(10)
            .with_counts([1, 2, 3, 50])
            .with_emergency(LaneId::Lane2);
        let next = controller.activate_emergency(&snapshot, LaneId::Lane4);
        assert_eq!(next.emergency_lane().map(|l| l.id), Some(LaneId::Lane4));
        assert!(!next.lane(LaneId::Lane2).is_emergency);
        // Already at the cap, the ambulance does not push it over.
        assert_eq!(next.lane(LaneId::Lane4).vehicle_count, 50);

        let next = controller.activate_emergency(&snapshot, LaneId::Lane3);
        assert_eq!(next.lane(LaneId::Lane3).vehicle_count, 4);
    }

    #[test]
    fn deactivating_green_emergency_leaves_clearance_phase() {
        let controller = controller();
        let snapshot = Snapshot::all_red()
            .with_green(LaneId::Lane2, 44)
            .with_emergency(LaneId::Lane2);
        let next = controller.deactivate_emergency(&snapshot, LaneId::Lane2);
        assert_eq!(green_of(&next), (LaneId::Lane2, 5));
        assert!(next.emergency_lane().is_none());
    }

    #[test]
    fn deactivating_red_emergency_only_clears_flag() {
        let controller = controller();
        let snapshot = Snapshot::initial(8).with_emergency(LaneId::Lane3);
        let next = controller.deactivate_emergency(&snapshot, LaneId::Lane3);
        assert_eq!(green_of(&next), (LaneId::Lane1, 8));
        assert!(next.emergency_lane().is_none());
    }

    #[test]
    fn toggle_flips_between_states() {
        let controller = controller();
        let snapshot = Snapshot::initial(8);
        let (on, active) = controller.toggle_emergency(&snapshot, LaneId::Lane1);
        assert!(active);
        assert!(on.lane(LaneId::Lane1).is_emergency);
        let (off, active) = controller.toggle_emergency(&on, LaneId::Lane1);
        assert!(!active);
        assert_eq!(green_of(&off), (LaneId::Lane1, 5));
    }
}
