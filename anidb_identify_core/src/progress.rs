//! Rate limiting for per-file progress notifications

use std::time::{Duration, Instant};

/// Default spacing between two progress notifications of one worker
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Decides which `parts done` updates of one file get published
///
/// At most one update passes per interval. The update that reaches the
/// total always passes, exactly once.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
    finished: bool,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            finished: false,
        }
    }

    pub fn should_emit(&mut self, now: Instant, done: u64, total: u64) -> bool {
        if self.finished {
            return false;
        }
        if done >= total {
            self.finished = true;
            self.last = Some(now);
            return true;
        }
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bursts_collapse_to_one_per_interval() {
        let mut throttle = ProgressThrottle::default();
        let start = Instant::now();
        let emitted = (1..=50)
            .filter(|done| {
                let now = start + Duration::from_millis(*done * 5);
                throttle.should_emit(now, *done, 100)
            })
            .count();
        // 5ms apart over 250ms: the first update, then one per 100ms
        assert_eq!(emitted, 3);
    }

    #[test]
    fn test_completion_always_passes_once() {
        let mut throttle = ProgressThrottle::default();
        let now = Instant::now();
        assert!(throttle.should_emit(now, 1, 3));
        assert!(!throttle.should_emit(now, 2, 3));
        assert!(throttle.should_emit(now, 3, 3));
        assert!(!throttle.should_emit(now + Duration::from_secs(1), 3, 3));
    }
}
