//! Daily free-quota rollover.
//!
//! Keyless providers carry daily ceilings, so a scheduled job resets their
//! usage counters once a day at the configured UTC time. This is an explicit
//! reset: between rollovers the counters only ever grow.

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::broker::TranslationBroker;

/// Initialize and start the scheduler with the daily reset job.
pub async fn start_scheduler(
    broker: Arc<TranslationBroker>,
    reset_time: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let cron_expr = time_to_cron(reset_time)?;
    info!(
        "Scheduling daily usage reset at {} UTC (cron: {})",
        reset_time, cron_expr
    );

    let job = Job::new_async(cron_expr.as_str(), move |_uuid, _l| {
        let broker = Arc::clone(&broker);

        Box::pin(async move {
            match broker.reset_free_quotas() {
                Ok(reset) => info!("Daily usage reset done for {:?}", reset),
                Err(e) => error!("Daily usage reset failed: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("✓ Scheduler started");

    Ok(scheduler)
}

/// Convert a UTC time string (HH:MM) to a six-field cron expression.
fn time_to_cron(time: &str) -> Result<String> {
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() != 2 {
        anyhow::bail!("Invalid time format: {}. Expected HH:MM", time);
    }

    let hour: u8 = parts[0].parse()?;
    let minute: u8 = parts[1].parse()?;
    if hour > 23 || minute > 59 {
        anyhow::bail!("Invalid time value: {}", time);
    }

    // Cron format: "second minute hour day month day_of_week"
    Ok(format!("0 {} {} * * *", minute, hour))
}
