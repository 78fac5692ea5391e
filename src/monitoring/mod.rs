pub mod event_log;
pub mod phase_sinks;
pub mod traffic_monitoring_system;
