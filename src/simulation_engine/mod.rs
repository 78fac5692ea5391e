// simulation_engine/mod.rs
pub mod intersections;
pub mod lanes;
pub mod simulation;
pub mod traffic_flow;
