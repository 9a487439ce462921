//! Polling driver
//!
//! Calls `advance` on a fixed cadence until the dispatcher reports that
//! every queue is empty and nothing is in flight.

use std::time::{Duration, Instant};

use eyre::{Result, eyre};
use tracing::{debug, info};

use crate::dispatcher::{AdvanceOutcome, DispatcherHandle, millis};

/// What a driver run dispatched
#[derive(Debug, Clone, Default)]
pub struct DriveReport {
    /// Queue names in dispatch order
    pub dispatched: Vec<String>,
    /// Number of `advance` calls made
    pub polls: u64,
    pub elapsed: Duration,
}

/// Drive the dispatcher until it goes idle with all queues empty
///
/// Fails if `limit` elapses first.
pub async fn drive_until_idle(
    handle: &DispatcherHandle,
    poll_interval: Duration,
    limit: Option<Duration>,
) -> Result<DriveReport> {
    debug!(?poll_interval, ?limit, "drive_until_idle: called");
    let start = Instant::now();
    let mut report = DriveReport::default();

    loop {
        report.polls += 1;
        match handle.advance().await? {
            AdvanceOutcome::Dispatched { queue, token } => {
                debug!(%queue, %token, "drive_until_idle: dispatched");
                report.dispatched.push(queue);
            }
            AdvanceOutcome::AllEmpty { .. } => break,
            AdvanceOutcome::Busy | AdvanceOutcome::SelectedEmpty { .. } => {}
        }

        if let Some(limit) = limit
            && start.elapsed() >= limit
        {
            return Err(eyre!(
                "Dispatcher still busy after {:?} ({} items dispatched)",
                limit,
                report.dispatched.len()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    report.elapsed = start.elapsed();
    info!(
        dispatched = report.dispatched.len(),
        polls = report.polls,
        elapsed_ms = millis(report.elapsed),
        "Driver finished"
    );
    Ok(report)
}
