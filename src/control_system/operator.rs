use crate::control_system::traffic_light_controller::TrafficLightController;
use crate::shared_data::{current_timestamp, IncidentKind, IncidentReport, ReportedBy};
use crate::simulation_engine::intersections::Snapshot;
use crate::simulation_engine::lanes::LaneId;
use crate::simulation_engine::simulation::IntersectionHandle;
use std::io::{stdin, stdout, BufRead, Write};

/// Actions an operator (or a detection feed) can take on the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    AddVehicles { lane: LaneId, amount: u32 },
    ClearLane { lane: LaneId },
    ToggleEmergency { lane: LaneId },
    ReportIncident { lane: LaneId, kind: IncidentKind },
}

/// Result of applying a command: the new snapshot, the line to log, and the
/// incident when one was filed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub snapshot: Snapshot,
    pub notice: String,
    pub incident: Option<IncidentReport>,
}

impl OperatorCommand {
    pub fn lane(&self) -> LaneId {
        match *self {
            OperatorCommand::AddVehicles { lane, .. }
            | OperatorCommand::ClearLane { lane }
            | OperatorCommand::ToggleEmergency { lane }
            | OperatorCommand::ReportIncident { lane, .. } => lane,
        }
    }

    pub fn apply(&self, controller: &TrafficLightController, snapshot: &Snapshot) -> CommandOutcome {
        let cap = controller.config().max_vehicle_count;
        let label = self.lane().label();
        match *self {
            OperatorCommand::AddVehicles { lane, amount } => {
                let mut next = *snapshot;
                next.lane_mut(lane).add_vehicles(amount, cap);
                CommandOutcome {
                    snapshot: next,
                    notice: format!("Sensor: Detected +{} vehicles on {}.", amount, label),
                    incident: None,
                }
            }
            OperatorCommand::ClearLane { lane } => {
                let mut next = *snapshot;
                next.lane_mut(lane).vehicle_count = 0;
                CommandOutcome {
                    snapshot: next,
                    notice: format!("Admin: Reset queue for {}.", label),
                    incident: None,
                }
            }
            OperatorCommand::ToggleEmergency { lane } => {
                let (next, active) = controller.toggle_emergency(snapshot, lane);
                let notice = if active {
                    format!("AMBULANCE DETECTED: Priority corridor for {}.", label)
                } else {
                    format!("System: Emergency cleared for {}.", label)
                };
                CommandOutcome {
                    snapshot: next,
                    notice,
                    incident: None,
                }
            }
            OperatorCommand::ReportIncident { lane, kind } => {
                let report = IncidentReport {
                    timestamp: current_timestamp(),
                    kind,
                    lane,
                    lane_label: label.to_string(),
                    reported_by: ReportedBy::Citizen,
                };
                CommandOutcome {
                    snapshot: *snapshot,
                    notice: report.to_string(),
                    incident: Some(report),
                }
            }
        }
    }
}

fn prompt<R: BufRead>(input: &mut R, message: &str) -> Option<String> {
    print!("{}", message);
    stdout().flush().ok()?;
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn prompt_lane<R: BufRead>(input: &mut R) -> Option<LaneId> {
    let raw = prompt(input, "Lane (1-4 or N/E/S/W): ")?;
    match raw.parse::<LaneId>() {
        Ok(lane) => Some(lane),
        Err(e) => {
            println!("{}", e);
            None
        }
    }
}

/// Why the console stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleEnd {
    Exit,
    InputClosed,
}

/// Reads one menu choice and turns it into a command. `Ok(None)` asks for
/// the current phase to be shown.
fn read_command<R: BufRead>(input: &mut R) -> Result<Option<OperatorCommand>, ConsoleEnd> {
    println!("\nIntersection Operator Console");
    println!("1. Add vehicles to a lane");
    println!("2. Clear a lane");
    println!("3. Toggle emergency on a lane");
    println!("4. Report incident");
    println!("5. Show current phase");
    println!("6. Exit");
    let choice = prompt(input, "Enter your choice: ").ok_or(ConsoleEnd::InputClosed)?;
    let command = match choice.parse::<u32>().unwrap_or(0) {
        1 => prompt_lane(input).and_then(|lane| {
            let raw = prompt(input, "Vehicles to add: ")?;
            match raw.parse::<u32>() {
                Ok(amount) => Some(OperatorCommand::AddVehicles { lane, amount }),
                Err(e) => {
                    println!("Invalid vehicle count '{}': {}", raw, e);
                    None
                }
            }
        }),
        2 => prompt_lane(input).map(|lane| OperatorCommand::ClearLane { lane }),
        3 => prompt_lane(input).map(|lane| OperatorCommand::ToggleEmergency { lane }),
        4 => prompt_lane(input).map(|lane| {
            let kind = match prompt(input, "1. Accident  2. Pothole / Road Work: ").as_deref() {
                Some("2") => IncidentKind::RoadWork,
                _ => IncidentKind::Accident,
            };
            OperatorCommand::ReportIncident { lane, kind }
        }),
        5 => None,
        6 => return Err(ConsoleEnd::Exit),
        _ => {
            println!("Invalid choice. Try again.");
            None
        }
    };
    Ok(command)
}

fn snapshot_lines(snapshot: &Snapshot) -> Vec<String> {
    snapshot
        .lanes()
        .iter()
        .map(|lane| {
            format!(
                "{} ({}) {:<24} {:>5} {:>3}s {:>2} cars{}",
                lane.id,
                lane.id.direction(),
                lane.id.label(),
                lane.light_state,
                lane.timer,
                lane.vehicle_count,
                if lane.is_emergency { "  [EMERGENCY]" } else { "" }
            )
        })
        .collect()
}

fn print_snapshot(snapshot: &Snapshot) {
    for line in snapshot_lines(snapshot) {
        println!("{}", line);
    }
}

/// Blocking menu loop over `input`. Meant to run on its own thread; each
/// command is committed as one transaction on the shared intersection.
/// Returns `true` when the operator chose to exit, `false` when input ran out.
pub fn run_operator_cli<R: BufRead>(handle: &IntersectionHandle, mut input: R) -> bool {
    loop {
        match read_command(&mut input) {
            Ok(Some(command)) => {
                if let Err(e) = handle.apply_command(command) {
                    log::error!("Operator command {:?} rejected: {}", command, e);
                }
            }
            Ok(None) => print_snapshot(&handle.snapshot()),
            Err(ConsoleEnd::Exit) => {
                println!("Exiting operator console.");
                return true;
            }
            Err(ConsoleEnd::InputClosed) => {
                log::info!("Operator input closed, console disabled");
                return false;
            }
        }
    }
}

/// [`run_operator_cli`] over standard input.
pub fn run_stdin_cli(handle: &IntersectionHandle) -> bool {
    run_operator_cli(handle, stdin().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrafficConfig;
    use std::io::Cursor;

    fn controller() -> TrafficLightController {
        TrafficLightController::new(TrafficConfig::default())
    }

    #[test]
    fn add_vehicles_respects_cap() {
        let snapshot = Snapshot::initial(10).with_counts([0, 45, 0, 0]);
        let outcome = OperatorCommand::AddVehicles {
            lane: LaneId::Lane2,
            amount: 10,
        }
        .apply(&controller(), &snapshot);
        assert_eq!(outcome.snapshot.lane(LaneId::Lane2).vehicle_count, 50);
        assert_eq!(
            outcome.notice,
            "Sensor: Detected +10 vehicles on Gachibowli Flyover."
        );
    }

    #[test]
    fn clear_lane_empties_queue_only() {
        let snapshot = Snapshot::initial(10)
            .with_counts([9, 3, 0, 0])
            .with_emergency(LaneId::Lane1);
        let outcome = OperatorCommand::ClearLane { lane: LaneId::Lane1 }.apply(&controller(), &snapshot);
        let lane = outcome.snapshot.lane(LaneId::Lane1);
        assert_eq!(lane.vehicle_count, 0);
        assert!(lane.is_emergency);
        assert_eq!(lane.timer, 10);
    }

    #[test]
    fn toggle_emergency_reports_both_directions() {
        let controller = controller();
        let snapshot = Snapshot::initial(10);
        let on = OperatorCommand::ToggleEmergency { lane: LaneId::Lane4 }.apply(&controller, &snapshot);
        assert!(on.notice.starts_with("AMBULANCE DETECTED"));
        assert_eq!(on.snapshot.lane(LaneId::Lane4).vehicle_count, 1);

        let off = OperatorCommand::ToggleEmergency { lane: LaneId::Lane4 }.apply(&controller, &on.snapshot);
        assert_eq!(off.notice, "System: Emergency cleared for Raheja Mindspace.");
        assert!(off.snapshot.emergency_lane().is_none());
    }

    #[test]
    fn incident_leaves_state_untouched() {
        let snapshot = Snapshot::initial(10).with_counts([1, 2, 3, 4]);
        let outcome = OperatorCommand::ReportIncident {
            lane: LaneId::Lane3,
            kind: IncidentKind::RoadWork,
        }
        .apply(&controller(), &snapshot);
        assert_eq!(outcome.snapshot, snapshot);
        let incident = outcome.incident.unwrap();
        assert_eq!(incident.reported_by, ReportedBy::Citizen);
        assert_eq!(
            outcome.notice,
            "USER REPORT: Citizen reported Pothole / Road Work on Jubilee Hills Checkpost."
        );
    }

    #[test]
    fn menu_input_parses_into_commands() {
        let mut input = Cursor::new("1\n2\n7\n3\ns\n6\n");
        assert_eq!(
            read_command(&mut input),
            Ok(Some(OperatorCommand::AddVehicles {
                lane: LaneId::Lane2,
                amount: 7
            }))
        );
        assert_eq!(
            read_command(&mut input),
            Ok(Some(OperatorCommand::ToggleEmergency { lane: LaneId::Lane3 }))
        );
        assert_eq!(read_command(&mut input), Err(ConsoleEnd::Exit));
        assert_eq!(read_command(&mut input), Err(ConsoleEnd::InputClosed));
    }

    #[test]
    fn unparsable_vehicle_count_is_rejected() {
        let mut input = Cursor::new("1\n2\nabc\n1\ne\n3\n");
        assert_eq!(read_command(&mut input), Ok(None));
        assert_eq!(
            read_command(&mut input),
            Ok(Some(OperatorCommand::AddVehicles {
                lane: LaneId::Lane2,
                amount: 3
            }))
        );
    }

    #[test]
    fn snapshot_lines_show_direction_and_state() {
        let snapshot = Snapshot::initial(12)
            .with_counts([4, 0, 0, 9])
            .with_emergency(LaneId::Lane4);
        let lines = snapshot_lines(&snapshot);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("lane_1 (N) Hitech City Main Rd"));
        assert!(lines[0].contains("green  12s  4 cars"));
        assert!(lines[3].starts_with("lane_4 (W) Raheja Mindspace"));
        assert!(lines[3].ends_with("[EMERGENCY]"));
    }

    #[test]
    fn console_commits_commands_until_exit() {
        let controller = controller();
        let (handle, _rx) = IntersectionHandle::new(controller, Snapshot::initial(10));
        let input = Cursor::new("1\n4\n12\n2\n1\n6\n");
        assert!(run_operator_cli(&handle, input));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.lane(LaneId::Lane4).vehicle_count, 12);
        assert_eq!(snapshot.lane(LaneId::Lane1).vehicle_count, 0);

        assert!(!run_operator_cli(&handle, Cursor::new("")));
    }
}
