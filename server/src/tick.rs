//! Fixed-timestep tick driver shared by the simulation (`sim_tick_rate`) and network
//! (`net_tick_rate`) loops.
//!
//! The reference design runs both loops off the same monotonic clock rather than two independent
//! `sleep` timers, to keep simulation ticks and network ticks from drifting apart over a long
//! session.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct TickConfig {
    pub period: Duration,
}

pub fn tick_cfg(rate_hz: u8) -> TickConfig {
    assert!(rate_hz > 0, "tick rate must be positive");
    TickConfig { period: Duration::from_secs_f64(1.0 / rate_hz as f64) }
}

/// Drives a fixed-rate loop, accumulating catch-up ticks if the caller falls behind rather than
/// spiraling (a single slow iteration costs one long sleep, not a burst of N simulation steps).
pub struct TickDriver {
    cfg: TickConfig,
    next_due: Instant,
}

impl TickDriver {
    pub fn new(cfg: TickConfig) -> TickDriver {
        TickDriver { cfg, next_due: Instant::now() + cfg.period }
    }

    /// Sleep until the next tick is due, then advance the schedule by exactly one period. Returns
    /// the number of periods that have actually elapsed (1 in the common case; more if the caller
    /// was too slow and ticks were skipped rather than simulated).
    pub async fn wait(&mut self) -> u32 {
        let now = Instant::now();
        if self.next_due > now {
            tokio::time::sleep(self.next_due - now).await;
        }
        let mut elapsed_periods = 1;
        self.next_due += self.cfg.period;
        while self.next_due <= Instant::now() {
            self.next_due += self.cfg.period;
            elapsed_periods += 1;
        }
        elapsed_periods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_cfg_computes_expected_period() {
        let cfg = tick_cfg(20);
        assert!((cfg.period.as_secs_f64() - 0.05).abs() < 1e-9);
    }

    #[test]
    #[should_panic]
    fn tick_cfg_rejects_zero_rate() {
        tick_cfg(0);
    }

    #[tokio::test]
    async fn wait_reports_one_period_under_no_load() {
        let mut driver = TickDriver::new(tick_cfg(200));
        let elapsed = driver.wait().await;
        assert_eq!(elapsed, 1);
    }

    #[tokio::test]
    async fn wait_reports_catch_up_periods_when_behind_schedule() {
        let mut driver = TickDriver::new(tick_cfg(1000));
        tokio::time::sleep(Duration::from_millis(25)).await;
        let elapsed = driver.wait().await;
        assert!(elapsed >= 2);
    }
}
