//! Pipeline configuration.

use crate::error::{Error, Result};

/// Document migration configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Maximum changes per batch.
    pub max_docs_per_batch: usize,
    /// Maximum summed change size per batch, in bytes.
    pub max_bytes_per_batch: u64,
    /// Shards of one index migrated at the same time.
    pub max_concurrent_shards: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_docs_per_batch: 1000,
            max_bytes_per_batch: 10 * 1024 * 1024,
            max_concurrent_shards: 1,
        }
    }
}

impl MigrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_docs_per_batch(mut self, max_docs: usize) -> Self {
        self.max_docs_per_batch = max_docs;
        self
    }

    pub fn with_max_bytes_per_batch(mut self, max_bytes: u64) -> Self {
        self.max_bytes_per_batch = max_bytes;
        self
    }

    pub fn with_max_concurrent_shards(mut self, shards: usize) -> Self {
        self.max_concurrent_shards = shards;
        self
    }

    /// Reject zero limits.
    pub fn validate(&self) -> Result<()> {
        if self.max_docs_per_batch == 0 {
            return Err(Error::Config("max_docs_per_batch must be at least 1".into()));
        }
        if self.max_bytes_per_batch == 0 {
            return Err(Error::Config("max_bytes_per_batch must be at least 1".into()));
        }
        if self.max_concurrent_shards == 0 {
            return Err(Error::Config(
                "max_concurrent_shards must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Selects which source indices are migrated.
///
/// Indices whose name starts with `.` are system indices and are skipped
/// unless named in the allowlist or `include_system_indices` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFilter {
    pub allowlist: Option<Vec<String>>,
    pub include_system_indices: bool,
}

impl IndexFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only migrate the named indices.
    pub fn with_allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_system_indices(mut self, include: bool) -> Self {
        self.include_system_indices = include;
        self
    }

    pub fn accepts(&self, index: &str) -> bool {
        match &self.allowlist {
            Some(names) => names.iter().any(|name| name == index),
            None => self.include_system_indices || !index.starts_with('.'),
        }
    }

    /// Keep accepted indices, preserving order.
    pub fn apply(&self, indices: Vec<String>) -> Vec<String> {
        indices.into_iter().filter(|i| self.accepts(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MigrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_shards, 1);
    }

    #[test]
    fn test_zero_limits_rejected() {
        for config in [
            MigrationConfig::new().with_max_docs_per_batch(0),
            MigrationConfig::new().with_max_bytes_per_batch(0),
            MigrationConfig::new().with_max_concurrent_shards(0),
        ] {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_filter_skips_system_indices() {
        let filter = IndexFilter::new();
        let indices = vec![".kibana".to_string(), "logs".to_string(), ".tasks".to_string()];
        assert_eq!(filter.apply(indices.clone()), vec!["logs"]);

        let all = IndexFilter::new().with_system_indices(true);
        assert_eq!(all.apply(indices).len(), 3);
    }

    #[test]
    fn test_allowlist_overrides_system_rule() {
        let filter = IndexFilter::new().with_allowlist([".kibana", "users"]);
        let indices = vec![".kibana".to_string(), "logs".to_string(), "users".to_string()];
        assert_eq!(filter.apply(indices), vec![".kibana", "users"]);
    }
}
