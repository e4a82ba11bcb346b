//! Periodic renewal check

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::coordinator::{RenewalCoordinator, Trigger};

/// Timer that asks the coordinator to re-evaluate on every tick
#[derive(Debug)]
pub struct ExpiryClock {
    coordinator: Arc<RenewalCoordinator>,
    period: Duration,
}

impl ExpiryClock {
    pub fn new(coordinator: Arc<RenewalCoordinator>, period: Duration) -> Self {
        Self {
            coordinator,
            period,
        }
    }

    /// Clock ticking every `check_interval_secs`; `0` means disabled
    pub fn from_secs(coordinator: Arc<RenewalCoordinator>, check_interval_secs: u64) -> Self {
        Self::new(coordinator, Duration::from_secs(check_interval_secs))
    }

    pub fn is_enabled(&self) -> bool {
        !self.period.is_zero()
    }

    /// Spawn the timer loop, or return `None` when the clock is disabled
    pub fn spawn(self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.is_enabled() {
            info!("Periodic certificate check disabled");
            return None;
        }
        Some(tokio::spawn(self.run()))
    }

    /// Tick forever. The first immediate tick is skipped since startup already evaluated.
    async fn run(self) {
        if !self.is_enabled() {
            return;
        }
        info!(
            "Starting periodic certificate check (interval: {}s)",
            self.period.as_secs_f64()
        );

        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await;

        loop {
            timer.tick().await;
            debug!("Running periodic certificate check");
            self.coordinator.evaluate(Trigger::Timer).await;
        }
    }
}
