//! Scheduler configuration.

/// Tuning knobs for the replication scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Maximum entities a single viewer may be introduced to per tick.
    /// Entities over the budget are deferred to the next tick.
    pub new_entity_budget: usize,
    /// Hard cap on entities visited by one dirty-propagation fan-out.
    /// A legitimate subtree never reaches it.
    pub dirty_fanout_limit: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            new_entity_budget: 64,
            dirty_fanout_limit: 65_536,
        }
    }
}

impl ReplicationConfig {
    /// Creates a config with a tiny entry budget, handy in tests.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            new_entity_budget: 4,
            dirty_fanout_limit: 256,
        }
    }

    /// Returns `true` if the budgets allow forward progress.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.new_entity_budget > 0 && self.dirty_fanout_limit > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ReplicationConfig::default().is_valid());
    }

    #[test]
    fn zero_budget_is_invalid() {
        let config = ReplicationConfig {
            new_entity_budget: 0,
            ..ReplicationConfig::default()
        };
        assert!(!config.is_valid());
    }

    #[test]
    fn testing_budget_smaller() {
        let testing = ReplicationConfig::for_testing();
        assert!(testing.new_entity_budget < ReplicationConfig::default().new_entity_budget);
    }
}
