//! Scheduler configuration.

use std::time::Duration;

/// Budgets and threading options for a [`Scheduler`](crate::Scheduler).
///
/// Budgets below 1 are raised to 1 when the scheduler is built, so a
/// zero budget can never stall the queues.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Maximum tasks started from the scheduled queue per `update()`.
    /// Default: 100.
    pub max_tasks_per_update: usize,
    /// Maximum finishing tasks whose `end()` runs per `update()`.
    /// Default: 100.
    pub max_finish_per_update: usize,
    /// How long `cancel_all()` waits for threaded tasks to observe
    /// cancellation before giving up. Default: 1000 ms.
    pub max_wait: Duration,
    /// Number of worker threads. `None` = auto-detect
    /// (`available_parallelism / 2`, clamped to `[2, 16]`).
    pub worker_count: Option<usize>,
    /// Run threaded tasks synchronously on the updating thread.
    /// Default: false.
    pub disable_multithreading: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_update: 100,
            max_finish_per_update: 100,
            max_wait: Duration::from_millis(1000),
            worker_count: None,
            disable_multithreading: false,
        }
    }
}

impl SchedulerConfig {
    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                (cpus / 2).clamp(2, 16)
            }
        }
    }

    /// Copy with both per-update budgets raised to at least 1.
    pub fn normalized(&self) -> Self {
        Self {
            max_tasks_per_update: self.max_tasks_per_update.max(1),
            max_finish_per_update: self.max_finish_per_update.max(1),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.max_tasks_per_update, 100);
        assert_eq!(cfg.max_finish_per_update, 100);
        assert_eq!(cfg.max_wait, Duration::from_millis(1000));
        assert!(!cfg.disable_multithreading);
    }

    #[test]
    fn zero_budgets_are_raised() {
        let cfg = SchedulerConfig {
            max_tasks_per_update: 0,
            max_finish_per_update: 0,
            ..SchedulerConfig::default()
        }
        .normalized();
        assert_eq!(cfg.max_tasks_per_update, 1);
        assert_eq!(cfg.max_finish_per_update, 1);
    }

    #[test]
    fn resolved_worker_count_clamps() {
        let zero = SchedulerConfig {
            worker_count: Some(0),
            ..SchedulerConfig::default()
        };
        assert_eq!(zero.resolved_worker_count(), 1);
        let huge = SchedulerConfig {
            worker_count: Some(500),
            ..SchedulerConfig::default()
        };
        assert_eq!(huge.resolved_worker_count(), 64);
        let auto = SchedulerConfig::default().resolved_worker_count();
        assert!((2..=16).contains(&auto), "auto count {auto} out of [2,16]");
    }
}
