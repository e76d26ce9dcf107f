//! Periodic relay until shutdown.

use super::{relay_once, AppContext};
use courier_outbox::RelayReport;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Relay every `interval` until Ctrl-C.
pub async fn relay_forever(
    ctx: &AppContext,
    stream: Option<&str>,
    interval: Duration,
) -> anyhow::Result<()> {
    info!(
        interval_ms = interval.as_millis() as u64,
        stream,
        "Relaying events in loop"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C, stopping relay loop");
        }
    };

    let sweeps = run_relay_loop(interval, shutdown, || relay_once(ctx, stream)).await;
    info!(sweeps, "Relay loop stopped");
    Ok(())
}

/// Call `sweep` every `interval` until `shutdown` resolves. Returns the
/// number of sweeps run. A failed sweep is logged and retried next tick.
pub async fn run_relay_loop<F, S>(interval: Duration, shutdown: S, mut sweep: F) -> u64
where
    F: FnMut() -> anyhow::Result<RelayReport>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut sweeps = 0u64;

    loop {
        match sweep() {
            Ok(report) => debug!(
                attempted = report.attempted,
                delivered = report.delivered.len(),
                "Sweep complete"
            ),
            Err(e) => error!(error = %e, "Relay sweep failed"),
        }
        sweeps += 1;

        tokio::select! {
            _ = &mut shutdown => {
                info!("Relay loop received shutdown signal");
                break;
            }
            _ = sleep(interval) => {}
        }
    }

    sweeps
}
