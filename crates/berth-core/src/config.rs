//! berth.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the placement engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fail a pending request after this many recoverable scheduling
    /// refusals. `None` retries forever: a request that never fits simply
    /// waits for a batch that satisfies it.
    pub max_schedule_failures: Option<u32>,
}

impl SchedulerConfig {
    /// Bound the number of recoverable scheduling refusals per request.
    pub fn with_max_schedule_failures(mut self, limit: u32) -> Self {
        self.max_schedule_failures = Some(limit);
        self
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_schedule_failures, None);
    }

    #[test]
    fn builder_sets_limit() {
        let config = SchedulerConfig::default().with_max_schedule_failures(3);
        assert_eq!(config.max_schedule_failures, Some(3));
    }

    #[test]
    fn parses_from_toml() {
        let config: SchedulerConfig = toml::from_str("max_schedule_failures = 5").unwrap();
        assert_eq!(config.max_schedule_failures, Some(5));
    }

    #[test]
    fn parses_empty_toml_to_defaults() {
        let config: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_schedule_failures, None);
    }
}
