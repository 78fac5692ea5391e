use crate::global_variables::QUEUE_SIGNAL_PHASES;
use crate::shared_data::PhaseReport;
use amiquip::{Channel, Connection, Exchange, Publish, QueueDeclareOptions, Result as AmiquipResult};
use serde::Serialize;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Consumer of the controller's output, one report per tick.
pub trait PhaseSink {
    fn name(&self) -> &'static str;
    fn publish(&mut self, report: &PhaseReport) -> Result<(), Box<dyn Error>>;

    /// Called once after the last report. Sinks holding connections close
    /// them here.
    fn finish(self: Box<Self>) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}

/// Appends a record to a CSV file, writing the header only when the file is new.
pub fn log_to_csv<T: Serialize, P: AsRef<Path>>(path: P, record: &T) -> Result<(), Box<dyn Error>> {
    let file_exists = path.as_ref().exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

/// Writes a one-line summary of every phase to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl PhaseSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish(&mut self, report: &PhaseReport) -> Result<(), Box<dyn Error>> {
        let queues: Vec<String> = report
            .lanes
            .iter()
            .map(|lane| {
                let flag = if lane.is_emergency { "!" } else { "" };
                format!("{}={}{}", lane.lane, lane.vehicle_count, flag)
            })
            .collect();
        match report.green() {
            Some(green) => log::info!(
                "Tick {}: {} green ({}s) | {}",
                report.tick,
                green.lane,
                green.timer,
                queues.join(" ")
            ),
            None => log::info!("Tick {}: all red | {}", report.tick, queues.join(" ")),
        }
        Ok(())
    }
}

/// Appends one CSV row per lane per tick.
#[derive(Debug)]
pub struct CsvPhaseRecorder {
    path: PathBuf,
}

impl CsvPhaseRecorder {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl PhaseSink for CsvPhaseRecorder {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn publish(&mut self, report: &PhaseReport) -> Result<(), Box<dyn Error>> {
        for record in report.records() {
            log_to_csv(&self.path, &record)?;
        }
        Ok(())
    }
}

/// Publishes each report as JSON to the signal phase queue.
pub struct AmqpPhasePublisher {
    connection: Connection,
    channel: Channel,
}

impl AmqpPhasePublisher {
    pub fn connect(url: &str) -> AmiquipResult<Self> {
        let mut connection = Connection::insecure_open(url)?;
        let channel = connection.open_channel(None)?;
        channel.queue_declare(QUEUE_SIGNAL_PHASES, QueueDeclareOptions::default())?;
        Ok(Self {
            connection,
            channel,
        })
    }

    pub fn close(self) -> AmiquipResult<()> {
        self.channel.close()?;
        self.connection.close()
    }
}

impl PhaseSink for AmqpPhasePublisher {
    fn name(&self) -> &'static str {
        "amqp"
    }

    fn publish(&mut self, report: &PhaseReport) -> Result<(), Box<dyn Error>> {
        let payload = serde_json::to_vec(report)?;
        let exchange = Exchange::direct(&self.channel);
        exchange.publish(Publish::new(&payload, QUEUE_SIGNAL_PHASES))?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), Box<dyn Error>> {
        (*self).close()?;
        Ok(())
    }
}
