use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use tokio::time::sleep;

use crate::state::AppState;

/// Spawn the background scheduler that runs periodic jobs.
///
/// The daily job runs in its own `tokio::spawn` so a failure never crashes
/// the scheduler loop.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    let mut last_daily_run: Option<u32> = None;

    loop {
        sleep(Duration::from_secs(15)).await;

        let now_utc = Utc::now();
        let today = now_utc.date_naive();

        // --- Daily jobs (run once per calendar day) ---
        let today_ordinal = today.ordinal();
        if last_daily_run == Some(today_ordinal) {
            continue;
        }
        if now_utc.hour() < state.config.billing_daily_hour_utc {
            continue;
        }

        last_daily_run = Some(today_ordinal);
        tracing::info!("Scheduler: running daily jobs for {today}");

        // Daily bill generation: same orchestration the login and
        // tenant-assignment triggers use.
        {
            let pool = state.db_pool.clone();
            tokio::spawn(async move {
                let summary = crate::services::billing::generate_bills_up_to(&pool, today).await;
                tracing::info!(
                    tenancies = summary.tenancies,
                    created = summary.bills_created,
                    skipped = summary.skipped_missing_room,
                    errors = summary.errors,
                    "Scheduler: daily bill generation completed"
                );
            });
        }
    }
}
