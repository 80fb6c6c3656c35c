/// Refresh Scheduler
/// Runs the periodic background refresh of registered collections using cron expressions
use crate::collection::{Facet, SyncItem, SyncedCollection};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Background refresh cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCadence {
    Seconds(u32),
    Minutes(u32),
    Hours(u32),
}

impl RefreshCadence {
    /// Convert cadence to a six-field cron expression (seconds first)
    pub fn to_cron(self) -> String {
        match self {
            RefreshCadence::Seconds(1) => "* * * * * *".to_string(),
            RefreshCadence::Seconds(s) => format!("*/{} * * * * *", s),
            RefreshCadence::Minutes(1) => "0 * * * * *".to_string(),
            RefreshCadence::Minutes(m) => format!("0 */{} * * * *", m),
            RefreshCadence::Hours(1) => "0 0 * * * *".to_string(),
            RefreshCadence::Hours(h) => format!("0 0 */{} * * *", h),
        }
    }
}

impl FromStr for RefreshCadence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Format: <number><unit>, e.g. "30s", "5m", "1h"
        let s = s.trim().to_lowercase();

        let Some(unit) = s.chars().last() else {
            return Err("Empty cadence string".to_string());
        };
        let number_part = &s[..s.len() - unit.len_utf8()];

        let value: u32 = number_part
            .parse()
            .map_err(|_| format!("Invalid number in cadence: {}", s))?;

        if value == 0 {
            return Err("Cadence value must be greater than 0".to_string());
        }

        let (cadence, limit) = match unit {
            's' => (RefreshCadence::Seconds(value), 60),
            'm' => (RefreshCadence::Minutes(value), 60),
            'h' => (RefreshCadence::Hours(value), 24),
            _ => {
                return Err(format!(
                    "Invalid cadence unit '{}'. Use 's' (seconds), 'm' (minutes), or 'h' (hours)",
                    unit
                ))
            }
        };

        if value >= limit {
            return Err(format!("Cadence '{}' is out of range; use a larger unit", s));
        }

        Ok(cadence)
    }
}

/// Something the scheduler can refresh in the background
#[async_trait]
pub trait Refreshable: Send + Sync {
    fn name(&self) -> &str;

    /// Refresh unless the data is still fresh; `Ok(true)` when a refresh ran
    async fn refresh_if_stale(&self) -> Result<bool>;
}

#[async_trait]
impl<T: SyncItem, F: Facet> Refreshable for SyncedCollection<T, F> {
    fn name(&self) -> &str {
        SyncedCollection::name(self)
    }

    async fn refresh_if_stale(&self) -> Result<bool> {
        SyncedCollection::refresh_if_stale(self).await
    }
}

/// Scheduler for periodic collection refresh
pub struct RefreshScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    current_job_id: Arc<RwLock<Option<Uuid>>>,
}

impl RefreshScheduler {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            current_job_id: Arc::new(RwLock::new(None)),
        })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Refresh scheduler started");
        Ok(())
    }

    /// Schedule a refresh of every target at `cadence`, replacing any previous schedule
    pub async fn schedule_refresh(
        &self,
        cadence: RefreshCadence,
        targets: Vec<Arc<dyn Refreshable>>,
    ) -> Result<()> {
        self.cancel_refresh().await?;

        if targets.is_empty() {
            tracing::info!("No collections to refresh; background refresh not scheduled");
            return Ok(());
        }

        let cron_expr = cadence.to_cron();
        let targets = Arc::new(targets);

        let job = Job::new_async(cron_expr.clone(), move |_uuid, _l| {
            let targets = Arc::clone(&targets);
            Box::pin(async move {
                for target in targets.iter() {
                    match target.refresh_if_stale().await {
                        Ok(true) => tracing::debug!("Scheduled refresh of '{}' completed", target.name()),
                        Ok(false) => tracing::debug!("Scheduled refresh of '{}' skipped", target.name()),
                        Err(e) => tracing::warn!("Scheduled refresh of '{}' failed: {}", target.name(), e),
                    }
                }
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create refresh job: {}", e)))?;

        let job_id = job.guid();

        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;

        let mut current_job = self.current_job_id.write().await;
        *current_job = Some(job_id);

        tracing::info!("Background refresh scheduled: {:?} ({})", cadence, cron_expr);
        Ok(())
    }

    /// Cancel the scheduled refresh
    pub async fn cancel_refresh(&self) -> Result<()> {
        let mut current_job = self.current_job_id.write().await;

        if let Some(job_id) = *current_job {
            let scheduler = self.scheduler.write().await;
            scheduler
                .remove(&job_id)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to remove job: {}", e)))?;

            *current_job = None;
            tracing::info!("Background refresh cancelled");
        }

        Ok(())
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Refresh scheduler shutdown");
        Ok(())
    }
}
