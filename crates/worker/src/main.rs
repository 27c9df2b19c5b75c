//! Freeze Alert Background Worker
//!
//! Handles scheduled jobs:
//! - Freeze alert dispatch (hourly, for every time zone currently at 8pm)
//! - Heartbeat (every 5 minutes)

mod dispatch;
mod weather;

use std::sync::Arc;
use std::time::Duration;

use freezealert_shared::{
    config, create_pool, PgSubscriptionStore, TwilioClient, TwilioConfig, ZipDirectory,
};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::dispatch::AlertDispatcher;
use crate::weather::{NwsClient, NwsConfig};

const DEFAULT_ZIP_DATA_PATH: &str = "data/zip-timezones.json";
const DEFAULT_DISPATCH_CRON: &str = "0 0 * * * *";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Freeze Alert Worker");

    let database_url = config::required("DATABASE_URL")?;
    let pool = create_pool(&database_url).await?;

    let zips = Arc::new(ZipDirectory::load(config::or_default(
        "ZIP_DATA_PATH",
        DEFAULT_ZIP_DATA_PATH,
    ))?);
    let sms = Arc::new(TwilioClient::new(TwilioConfig::from_env()?)?);
    let weather = Arc::new(NwsClient::new(NwsConfig::from_env())?);
    let store = Arc::new(PgSubscriptionStore::new(pool));

    let dispatcher = Arc::new(AlertDispatcher::new(store, weather, sms, zips));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Freeze alert dispatch
    // Cron: top of every hour; the dispatcher itself decides which zones are at 8pm
    let dispatch_cron = config::or_default("DISPATCH_CRON", DEFAULT_DISPATCH_CRON);
    let dispatch_job = dispatcher.clone();
    scheduler
        .add(Job::new_async(dispatch_cron.as_str(), move |_uuid, _l| {
            let dispatcher = dispatch_job.clone();
            Box::pin(async move {
                info!("Running scheduled freeze alert dispatch");
                dispatcher.run(chrono::Utc::now()).await;
            })
        })?)
        .await?;
    info!(cron = %dispatch_cron, "Scheduled: Freeze alert dispatch");

    // Job 2: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Freeze Alert Worker started successfully with 2 scheduled jobs");

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
