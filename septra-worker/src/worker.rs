use septra_procurement::ProcurementEngine;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Periodic housekeeping: closes RFQs past their deadline and re-derives
/// anything a crash may have left half done.
pub async fn run_sweeper(engine: Arc<ProcurementEngine>, every_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(every_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Sweeper started, running every {}s", every_seconds.max(1));

    loop {
        ticker.tick().await;
        match engine.sweep().await {
            Ok(outcome) => {
                let report = outcome.value;
                if !report.closed_rfqs.is_empty() || !outcome.events.is_empty() {
                    info!(
                        "Sweep closed {} RFQs, reconciled {} awarded RFQs, {} events",
                        report.closed_rfqs.len(),
                        report.reconciled_rfqs,
                        outcome.events.len()
                    );
                }
            }
            Err(e) => error!("Sweep failed: {}", e),
        }
    }
}
