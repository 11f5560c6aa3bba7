//! Daily collection trigger.
//!
//! Runs are spawned without waiting for the previous one; overlapping runs
//! rely on the per-row upsert, last writer wins.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::service::CatalogService;

/// The next `hour:00` UTC strictly after `now`.
pub fn next_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

pub fn spawn_daily(service: Arc<CatalogService>, hour: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let at = next_run(now, hour);
            info!(next_run = %at, "next scheduled collection");
            let wait = (at - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let service = service.clone();
            tokio::spawn(async move {
                let report = service.collect(false, None).await;
                info!(run_id = %report.run_id, "scheduled collection done");
            });
        }
    })
}
