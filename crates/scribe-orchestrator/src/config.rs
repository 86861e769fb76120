//! Engine and dispatch configuration.

use std::time::Duration;

/// Configuration for one fan-out batch of section tasks.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum tasks running at once; `None` runs the whole batch in parallel.
    pub max_parallel: Option<usize>,
    /// Per-task timeout. A task that exceeds it resolves to its fallback value
    /// so the barrier always completes.
    pub task_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { max_parallel: None, task_timeout: Duration::from_secs(120) }
    }
}

/// Configuration for the decision loop.
///
/// The hard cap and the retry budget are independent constants: the cap bounds
/// decision-loop turns for the whole run, the budget bounds write/review
/// round-trips per section.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum decision-loop turns before the engine forces a finish,
    /// regardless of what the decision policy wants.
    pub hard_cap: u32,
    /// Review rejections allowed per section before it is force-accepted.
    pub retry_budget: u32,
    /// Fan-out settings shared by write and review batches.
    pub dispatch: DispatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { hard_cap: 15, retry_budget: 3, dispatch: DispatchConfig::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_cap_above_budget() {
        let config = EngineConfig::default();
        assert!(config.hard_cap > config.retry_budget);
        assert_eq!(config.retry_budget, 3);
    }
}
