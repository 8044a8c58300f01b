use anyhow::{Context, Result};
use sculpt::{Tracker, models::Mesocycle, store::mesocycles};

pub mod calendar;
pub mod config;
pub mod day;
pub mod exercise;
pub mod mesocycle;
pub mod plan;

/// The mesocycle named by `key`, or the active one.
pub async fn mesocycle_or_active(tracker: &Tracker, key: Option<&str>) -> Result<Mesocycle> {
    match key {
        Some(key) => Ok(tracker.mesocycle(key).await?),
        None => mesocycles::active(tracker.pool(), tracker.user())
            .await?
            .context("no active mesocycle; pass one or start one with `sculpt m start`"),
    }
}
