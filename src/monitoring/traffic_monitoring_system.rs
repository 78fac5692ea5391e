use crate::global_variables::{AMQP_URL, QUEUE_SIGNAL_PHASES, VEHICLE_COUNT_CHART_PNG};
use crate::monitoring::phase_sinks::log_to_csv;
use crate::shared_data::{PhaseRecord, PhaseReport};
use crate::simulation_engine::lanes::{LaneId, LightState};
use amiquip::{Connection, ConsumerMessage, ConsumerOptions, QueueDeclareOptions, Result as AmiquipResult};
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{stdin, stdout, Write};

/// Per-lane totals over a recorded run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneSummary {
    pub green_ticks: u64,
    pub emergency_ticks: u64,
    pub max_vehicles: u32,
    pub total_vehicles: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseSummary {
    pub ticks: u64,
    /// Number of times the green moved to a different lane.
    pub phase_changes: u64,
    pub lanes: BTreeMap<LaneId, LaneSummary>,
}

impl PhaseSummary {
    pub fn average_queue(&self, lane: LaneId) -> f64 {
        match self.lanes.get(&lane) {
            Some(summary) if self.ticks > 0 => summary.total_vehicles as f64 / self.ticks as f64,
            _ => 0.0,
        }
    }
}

/// Folds recorded rows into a summary. Rows must be in tick order, as the
/// recorder writes them.
pub fn summarize_phases(records: &[PhaseRecord]) -> PhaseSummary {
    let mut summary = PhaseSummary::default();
    let mut last_tick = None;
    let mut last_green: Option<LaneId> = None;

    for record in records {
        if last_tick != Some(record.tick) {
            summary.ticks += 1;
            last_tick = Some(record.tick);
        }
        let lane = summary.lanes.entry(record.lane).or_default();
        lane.total_vehicles += u64::from(record.vehicle_count);
        lane.max_vehicles = lane.max_vehicles.max(record.vehicle_count);
        if record.is_emergency {
            lane.emergency_ticks += 1;
        }
        if record.signal == LightState::Green {
            lane.green_ticks += 1;
            if last_green.is_some_and(|green| green != record.lane) {
                summary.phase_changes += 1;
            }
            last_green = Some(record.lane);
        }
    }
    summary
}

pub fn read_phase_records(path: &str) -> Result<Vec<PhaseRecord>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for result in rdr.deserialize::<PhaseRecord>() {
        records.push(result?);
    }
    Ok(records)
}

pub fn record_phase_report(path: &str, report: &PhaseReport) {
    for record in report.records() {
        if let Err(e) = log_to_csv(path, &record) {
            log::warn!("Error recording phase for tick {}: {}", report.tick, e);
            return;
        }
    }
}

/// Consumes published phases from RabbitMQ and appends them to `csv_path`.
/// Blocks until the consumer ends.
pub fn listen_signal_phases(csv_path: &str) -> AmiquipResult<()> {
    let mut connection = Connection::insecure_open(AMQP_URL)?;
    let channel = connection.open_channel(None)?;
    let queue = channel.queue_declare(QUEUE_SIGNAL_PHASES, QueueDeclareOptions::default())?;
    let consumer = queue.consume(ConsumerOptions::default())?;
    log::info!("Listening for signal phases on '{}'", QUEUE_SIGNAL_PHASES);

    for message in consumer.receiver().iter() {
        match message {
            ConsumerMessage::Delivery(delivery) => {
                match serde_json::from_slice::<PhaseReport>(&delivery.body) {
                    Ok(report) => {
                        log::debug!("Received phase report for tick {}", report.tick);
                        record_phase_report(csv_path, &report);
                    }
                    Err(e) => log::warn!("Discarding malformed phase report: {}", e),
                }
                consumer.ack(delivery)?;
            }
            other => {
                log::info!("Signal phase consumer ended: {:?}", other);
                break;
            }
        }
    }
    connection.close()
}

pub fn show_report_summary(csv_path: &str) -> Result<(), Box<dyn Error>> {
    let records = read_phase_records(csv_path)?;
    let summary = summarize_phases(&records);
    println!("Report Summary:");
    println!("Controller ticks recorded: {}", summary.ticks);
    println!("Phase changes: {}", summary.phase_changes);
    for (lane, stats) in &summary.lanes {
        println!(
            "{} ({}) {:<24} green {:>4} ticks | avg queue {:>5.1} | max {:>2} | emergency {} ticks",
            lane,
            lane.direction(),
            lane.label(),
            stats.green_ticks,
            summary.average_queue(*lane),
            stats.max_vehicles,
            stats.emergency_ticks
        );
    }
    Ok(())
}

/// Line chart of every lane's queue over the recorded ticks.
pub fn draw_vehicle_count_chart(records: &[PhaseRecord], output: &str) -> Result<(), Box<dyn Error>> {
    if records.is_empty() {
        return Err("no phase records to plot".into());
    }
    let min_tick = records.iter().map(|r| r.tick).min().unwrap_or(0);
    let max_tick = records
        .iter()
        .map(|r| r.tick)
        .max()
        .unwrap_or(0)
        .max(min_tick + 1);
    let max_count = records.iter().map(|r| r.vehicle_count).max().unwrap_or(0);

    let root = BitMapBackend::new(output, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Vehicles waiting per lane", ("sans-serif", 20))
        .margin(40)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(min_tick..max_tick, 0u32..max_count + 1)?;
    chart
        .configure_mesh()
        .x_desc("controller tick")
        .y_desc("vehicles")
        .draw()?;

    for (lane, color) in LaneId::ALL.into_iter().zip([RED, BLUE, GREEN, MAGENTA]) {
        let points: Vec<(u64, u32)> = records
            .iter()
            .filter(|r| r.lane == lane)
            .map(|r| (r.tick, r.vehicle_count))
            .collect();
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(lane.label())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    println!("Vehicle count chart saved to {}", output);
    Ok(())
}

pub fn show_latest_phase(csv_path: &str) -> Result<(), Box<dyn Error>> {
    let records = read_phase_records(csv_path)?;
    let Some(last_tick) = records.last().map(|r| r.tick) else {
        println!("No phases recorded yet.");
        return Ok(());
    };
    println!("Tick {}:", last_tick);
    for record in records.iter().filter(|r| r.tick == last_tick) {
        println!(
            "{} ({}) {:>5} {:>3}s {:>2} cars{}",
            record.lane,
            record.lane.direction(),
            record.signal,
            record.timer,
            record.vehicle_count,
            if record.is_emergency { "  [EMERGENCY]" } else { "" }
        );
    }
    Ok(())
}

fn read_choice() -> Option<u32> {
    print!("Enter your choice: ");
    stdout().flush().ok()?;
    let mut input = String::new();
    match stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().parse::<u32>().unwrap_or(0)),
    }
}

/// Blocking admin menu over the recorded phases.
pub fn run_cli(csv_path: &str) {
    loop {
        println!("\nTraffic Monitoring System Admin CLI");
        println!("1. Display Report Summary");
        println!("2. Generate Vehicle Count Chart");
        println!("3. Display Latest Phase");
        println!("4. Exit");
        let Some(choice) = read_choice() else {
            println!("Input closed, exiting CLI.");
            break;
        };
        match choice {
            1 => {
                if let Err(e) = show_report_summary(csv_path) {
                    eprintln!("Error generating report summary: {}", e);
                }
            }
            2 => {
                let result = read_phase_records(csv_path)
                    .and_then(|records| draw_vehicle_count_chart(&records, VEHICLE_COUNT_CHART_PNG));
                if let Err(e) = result {
                    eprintln!("Error generating vehicle count chart: {}", e);
                }
            }
            3 => {
                if let Err(e) = show_latest_phase(csv_path) {
                    eprintln!("Error displaying latest phase: {}", e);
                }
            }
            4 => {
                println!("Exiting CLI.");
                break;
            }
            _ => println!("Invalid choice. Try again."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::intersections::Snapshot;

    fn recorded_run() -> Vec<PhaseRecord> {
        let mut records = Vec::new();
        let snapshots = [
            Snapshot::initial(2).with_counts([4, 0, 6, 0]),
            Snapshot::initial(1).with_counts([2, 0, 8, 0]),
            Snapshot::all_red()
                .with_green(LaneId::Lane3, 29)
                .with_counts([2, 1, 8, 0])
                .with_emergency(LaneId::Lane2),
        ];
        for (i, snapshot) in snapshots.iter().enumerate() {
            records.extend(PhaseReport::from_snapshot(i as u64 + 1, 0, snapshot).records());
        }
        records
    }

    #[test]
    fn summary_counts_ticks_and_switches() {
        let summary = summarize_phases(&recorded_run());
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.phase_changes, 1);
        assert_eq!(summary.lanes[&LaneId::Lane1].green_ticks, 2);
        assert_eq!(summary.lanes[&LaneId::Lane3].green_ticks, 1);
        assert_eq!(summary.lanes[&LaneId::Lane3].max_vehicles, 8);
        assert_eq!(summary.lanes[&LaneId::Lane2].emergency_ticks, 1);
        assert!((summary.average_queue(LaneId::Lane1) - 8.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let summary = summarize_phases(&[]);
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.average_queue(LaneId::Lane4), 0.0);
    }

    #[test]
    fn recorded_reports_round_trip_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.csv");
        let path = path.to_str().unwrap();
        let report = PhaseReport::from_snapshot(7, 42, &Snapshot::initial(10).with_counts([1, 2, 3, 4]));
        record_phase_report(path, &report);
        record_phase_report(path, &report);
        let records = read_phase_records(path).unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(records[3].vehicle_count, 4);
        assert_eq!(records[3].tick, 7);
    }

    #[test]
    fn chart_refuses_empty_input() {
        assert!(draw_vehicle_count_chart(&[], "unused.png").is_err());
    }
}
