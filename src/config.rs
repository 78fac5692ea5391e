use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// Simulation timing (milliseconds)
pub const MIN_SIMULATION_DELAY: u64 = 500;
pub const MAX_SIMULATION_DELAY: u64 = 1500;
pub const INITIAL_SIMULATION_DELAY: u64 = 1000;

// Vehicle count limits
pub const MAX_VEHICLE_COUNT: u32 = 50;

// Flow rates
pub const OUTFLOW_MIN: u32 = 1;
pub const OUTFLOW_MAX: u32 = 4;
pub const INFLOW_PROBABILITY: f64 = 0.4;
pub const BURST_PROBABILITY: f64 = 0.9;
pub const ADDITIONAL_VEHICLE_PROBABILITY: f64 = 0.8;

// Signal timing (seconds)
pub const MIN_GREEN_TIME: u32 = 10;
pub const MAX_GREEN_TIME: u32 = 60;
pub const EMERGENCY_GREEN_TIME: u32 = 60;
pub const EMERGENCY_CLEARANCE_TIMER: u32 = 5;
pub const DEFAULT_EMPTY_TIMER: u32 = 10;
pub const MIN_TIMER_BEFORE_SWITCH: u32 = 3;
pub const DEFAULT_EXTEND_TIMER: u32 = 15;

// Route advice
pub const ROUTE_UPDATE_INTERVAL: u64 = 3000;
pub const HIGH_CONGESTION_THRESHOLD: u32 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Every tunable of the intersection. Missing fields in a config file fall
/// back to the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub min_simulation_delay_ms: u64,
    pub max_simulation_delay_ms: u64,
    pub initial_simulation_delay_ms: u64,
    pub max_vehicle_count: u32,
    pub outflow_min: u32,
    pub outflow_max: u32,
    pub inflow_probability: f64,
    pub burst_probability: f64,
    pub additional_vehicle_probability: f64,
    pub min_green_time: u32,
    pub max_green_time: u32,
    pub emergency_green_time: u32,
    pub emergency_clearance_timer: u32,
    /// Timer lane 1 starts with before the first controller tick.
    pub initial_green_time: u32,
    pub min_timer_before_switch: u32,
    pub default_extend_timer: u32,
    pub route_update_interval_ms: u64,
    pub high_congestion_threshold: u32,
    /// Fixed seed for the flow simulator. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Where the phase recorder appends rows. `None` disables the recorder.
    pub phase_csv_path: Option<String>,
    pub publish_to_amqp: bool,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            min_simulation_delay_ms: MIN_SIMULATION_DELAY,
            max_simulation_delay_ms: MAX_SIMULATION_DELAY,
            initial_simulation_delay_ms: INITIAL_SIMULATION_DELAY,
            max_vehicle_count: MAX_VEHICLE_COUNT,
            outflow_min: OUTFLOW_MIN,
            outflow_max: OUTFLOW_MAX,
            inflow_probability: INFLOW_PROBABILITY,
            burst_probability: BURST_PROBABILITY,
            additional_vehicle_probability: ADDITIONAL_VEHICLE_PROBABILITY,
            min_green_time: MIN_GREEN_TIME,
            max_green_time: MAX_GREEN_TIME,
            emergency_green_time: EMERGENCY_GREEN_TIME,
            emergency_clearance_timer: EMERGENCY_CLEARANCE_TIMER,
            initial_green_time: DEFAULT_EMPTY_TIMER,
            min_timer_before_switch: MIN_TIMER_BEFORE_SWITCH,
            default_extend_timer: DEFAULT_EXTEND_TIMER,
            route_update_interval_ms: ROUTE_UPDATE_INTERVAL,
            high_congestion_threshold: HIGH_CONGESTION_THRESHOLD,
            seed: None,
            phase_csv_path: None,
            publish_to_amqp: false,
        }
    }
}

impl TrafficConfig {
    /// Loads a JSON config file and validates it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: TrafficConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_simulation_delay_ms > self.max_simulation_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "min_simulation_delay_ms ({}) exceeds max_simulation_delay_ms ({})",
                self.min_simulation_delay_ms, self.max_simulation_delay_ms
            )));
        }
        if self.outflow_min > self.outflow_max {
            return Err(ConfigError::Invalid(format!(
                "outflow_min ({}) exceeds outflow_max ({})",
                self.outflow_min, self.outflow_max
            )));
        }
        if self.min_green_time > self.max_green_time {
            return Err(ConfigError::Invalid(format!(
                "min_green_time ({}) exceeds max_green_time ({})",
                self.min_green_time, self.max_green_time
            )));
        }
        for (name, p) in [
            ("inflow_probability", self.inflow_probability),
            ("burst_probability", self.burst_probability),
            ("additional_vehicle_probability", self.additional_vehicle_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "{} must lie in [0, 1], got {}",
                    name, p
                )));
            }
        }
        if self.initial_green_time == 0 {
            return Err(ConfigError::Invalid(
                "initial_green_time must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Density-proportional dwell time: `3n + 5`, clamped to the green bounds.
    pub fn calculate_green_time(&self, vehicle_count: u32) -> u32 {
        vehicle_count
            .saturating_mul(3)
            .saturating_add(5)
            .clamp(self.min_green_time, self.max_green_time)
    }

    pub fn initial_simulation_delay(&self) -> Duration {
        Duration::from_millis(self.initial_simulation_delay_ms)
    }

    pub fn route_update_interval(&self) -> Duration {
        Duration::from_millis(self.route_update_interval_ms)
    }
}
