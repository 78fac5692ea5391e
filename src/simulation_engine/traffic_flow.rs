use crate::config::TrafficConfig;
use crate::simulation_engine::intersections::Snapshot;
use crate::simulation_engine::lanes::LaneId;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of the random draws behind inflow and outflow. Production uses
/// [`RandomFlow`]; tests script exact sequences.
pub trait FlowSampler {
    /// Uniform integer in `[min, max]`.
    fn outflow(&mut self, min: u32, max: u32) -> u32;
    /// `true` with the given probability.
    fn chance(&mut self, probability: f64) -> bool;
    /// Uniform delay in `[min_ms, max_ms]` milliseconds.
    fn delay_ms(&mut self, min_ms: u64, max_ms: u64) -> u64;
}

/// [`FlowSampler`] backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct RandomFlow<R> {
    rng: R,
}

impl<R: Rng> RandomFlow<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomFlow<SmallRng> {
    /// Seeded when `seed` is set so a run can be replayed.
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::new(SmallRng::seed_from_u64(seed)),
            None => Self::new(SmallRng::from_os_rng()),
        }
    }
}

impl<R: Rng> FlowSampler for RandomFlow<R> {
    fn outflow(&mut self, min: u32, max: u32) -> u32 {
        self.rng.random_range(min..=max)
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.rng.random_bool(probability.clamp(0.0, 1.0))
    }

    fn delay_ms(&mut self, min_ms: u64, max_ms: u64) -> u64 {
        self.rng.random_range(min_ms..=max_ms)
    }
}

/// Synthetic stand-in for the vehicle sensing feed. Green lanes discharge,
/// red lanes accumulate arrivals, and a red emergency lane holds its queue
/// until it is served.
pub struct FlowSimulator<S> {
    config: TrafficConfig,
    sampler: S,
}

impl<S: FlowSampler> FlowSimulator<S> {
    pub fn new(config: TrafficConfig, sampler: S) -> Self {
        Self { config, sampler }
    }

    /// Applies one round of inflow and outflow to every lane.
    pub fn step(&mut self, snapshot: &Snapshot) -> Snapshot {
        let cfg = &self.config;
        let mut next = *snapshot;

        for id in LaneId::ALL {
            let lane = next.lane_mut(id);
            if lane.is_green() {
                let outflow = self.sampler.outflow(cfg.outflow_min, cfg.outflow_max);
                // The ambulance is considered through once the queue moves.
                if lane.is_emergency && lane.vehicle_count > 0 && outflow > 0 {
                    lane.is_emergency = false;
                    lane.timer = cfg.emergency_clearance_timer;
                }
                lane.discharge(outflow);
                if !lane.is_emergency
                    && self
                        .sampler
                        .chance(1.0 - cfg.additional_vehicle_probability)
                {
                    lane.add_vehicles(1, cfg.max_vehicle_count);
                }
            } else if !lane.is_emergency {
                let inflow = self.sampler.chance(1.0 - cfg.inflow_probability) as u32;
                let burst = self.sampler.chance(1.0 - cfg.burst_probability) as u32;
                lane.add_vehicles(inflow + burst, cfg.max_vehicle_count);
            }
        }
        next
    }

    /// Delay before the next step, re-sampled on every call.
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.sampler.delay_ms(
            self.config.min_simulation_delay_ms,
            self.config.max_simulation_delay_ms,
        ))
    }

    pub fn initial_delay(&self) -> Duration {
        self.config.initial_simulation_delay()
    }
}
