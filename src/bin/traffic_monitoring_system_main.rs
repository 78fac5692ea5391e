use intersection_sync::global_variables::MONITOR_PHASES_CSV;
use intersection_sync::monitoring::traffic_monitoring_system::{listen_signal_phases, run_cli};
use std::thread;

#[tokio::main]
async fn main() {
    env_logger::init();

    // Plain thread so shutting down the runtime does not wait on the consumer.
    thread::spawn(|| {
        if let Err(e) = listen_signal_phases(MONITOR_PHASES_CSV) {
            log::error!("Error in signal phase listener: {}", e);
        }
    });

    let cli_handle = tokio::task::spawn_blocking(|| run_cli(MONITOR_PHASES_CSV));
    if let Err(e) = cli_handle.await {
        log::error!("Admin CLI stopped unexpectedly: {}", e);
    }
}
