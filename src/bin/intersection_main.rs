// intersection_main.rs
use intersection_sync::config::TrafficConfig;
use intersection_sync::simulation_engine::simulation::run_simulation;
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    // Optional JSON config path as the first argument.
    let config = match env::args().nth(1) {
        Some(path) => match TrafficConfig::load(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                log::error!("Could not load configuration from {}: {}", path, e);
                process::exit(1);
            }
        },
        None => TrafficConfig::default(),
    };

    run_simulation(config).await;
}
