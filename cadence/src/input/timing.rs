//! Randomized timing gates for input dispatch.
//!
//! Thresholds are drawn fresh on every query; nothing here is cached.

use std::time::Instant;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::config::TimingConfig;

/// Millisecond clock used by the dispatch queue.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock measured from construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Switch-delay and click-interval policy.
pub struct TimingPolicy {
    config: TimingConfig,
    rng: Mutex<StdRng>,
}

impl TimingPolicy {
    pub fn new(config: TimingConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    fn jitter(&self, max_ms: u64) -> u64 {
        if max_ms == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..max_ms)
    }

    /// Delay that must be exceeded before switching input kinds.
    pub fn switch_threshold_ms(&self) -> u64 {
        self.config.task_switch_delay_ms + self.jitter(self.config.task_switch_jitter_ms)
    }

    /// Minimum spacing between pointer attempts. Faster mouse speed shortens it.
    pub fn min_click_ms(&self) -> u64 {
        let base = self.config.min_click_ms + self.jitter(self.config.min_click_jitter_ms);
        (base as f64 / self.config.mouse_speed) as u64
    }

    /// Smallest possible [`Self::min_click_ms`] draw.
    pub fn min_click_floor_ms(&self) -> u64 {
        (self.config.min_click_ms as f64 / self.config.mouse_speed) as u64
    }

    /// No [`Self::min_click_ms`] draw exceeds this.
    pub fn min_click_ceiling_ms(&self) -> u64 {
        let base = self.config.min_click_ms + self.config.min_click_jitter_ms;
        (base as f64 / self.config.mouse_speed) as u64
    }

    /// No [`Self::switch_threshold_ms`] draw exceeds this.
    pub fn switch_ceiling_ms(&self) -> u64 {
        self.config.task_switch_delay_ms + self.config.task_switch_jitter_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(config: TimingConfig) -> TimingPolicy {
        TimingPolicy::new(TimingConfig {
            seed: Some(7),
            ..config
        })
    }

    #[test]
    fn switch_threshold_stays_within_jitter_window() {
        let policy = seeded(TimingConfig::default());
        let cfg = policy.config().clone();
        for _ in 0..200 {
            let t = policy.switch_threshold_ms();
            assert!(t >= cfg.task_switch_delay_ms);
            assert!(t < cfg.task_switch_delay_ms + cfg.task_switch_jitter_ms);
            assert!(t <= policy.switch_ceiling_ms());
        }
    }

    #[test]
    fn min_click_draws_stay_between_floor_and_ceiling() {
        let policy = seeded(TimingConfig {
            min_click_ms: 100,
            min_click_jitter_ms: 60,
            mouse_speed: 1.5,
            ..TimingConfig::default()
        });
        assert_eq!(policy.min_click_floor_ms(), 66);
        assert_eq!(policy.min_click_ceiling_ms(), 106);
        for _ in 0..200 {
            let t = policy.min_click_ms();
            assert!(t >= policy.min_click_floor_ms());
            assert!(t <= policy.min_click_ceiling_ms());
        }
    }

    #[test]
    fn faster_mouse_shortens_min_click() {
        let slow = seeded(TimingConfig {
            min_click_jitter_ms: 0,
            mouse_speed: 0.5,
            ..TimingConfig::default()
        });
        let fast = seeded(TimingConfig {
            min_click_jitter_ms: 0,
            mouse_speed: 2.0,
            ..TimingConfig::default()
        });
        assert_eq!(slow.min_click_ms(), 200);
        assert_eq!(fast.min_click_ms(), 50);
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = TimingPolicy::new(TimingConfig {
            task_switch_jitter_ms: 0,
            ..TimingConfig::default()
        });
        assert_eq!(policy.switch_threshold_ms(), policy.config().task_switch_delay_ms);
    }
}
