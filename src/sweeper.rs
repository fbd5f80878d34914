//! Retention sweeper.
//!
//! Expired entries are already invisible to reads; the sweeper only
//! reclaims their space. It runs once at startup, then on every tick,
//! until the shutdown signal flips.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::cache::AuditCache;
use crate::store::CacheResult;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SWEEP_BATCH: usize = 512;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Entries purged per engine transaction.
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            batch_size: DEFAULT_SWEEP_BATCH,
        }
    }
}

impl SweeperConfig {
    /// Set the time between sweeps. Clamped to at least one second.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Purge transactions that removed something.
    pub passes: u32,
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    cache: AuditCache,
    config: SweeperConfig,
}

impl RetentionSweeper {
    pub fn new(cache: AuditCache, config: SweeperConfig) -> Self {
        Self { cache, config }
    }

    /// Purge batch after batch until nothing expired is left.
    pub async fn sweep_once(&self) -> CacheResult<SweepReport> {
        let mut report = SweepReport::default();
        loop {
            let removed = self.cache.purge_expired(self.config.batch_size).await?;
            if removed == 0 {
                return Ok(report);
            }
            report.passes += 1;
            report.removed += removed;
        }
    }

    /// Sweep on every tick until `shutdown` becomes `true` or its sender drops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Retention sweeper started (every {:?}, batch {})",
            self.config.interval, self.config.batch_size
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.removed > 0 => info!(
                            "Sweep reclaimed {} expired entries in {} pass(es)",
                            report.removed, report.passes
                        ),
                        Ok(_) => debug!("Sweep found nothing to reclaim"),
                        Err(e) => error!("Sweep failed, retrying next tick: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Retention sweeper stopped");
    }
}
