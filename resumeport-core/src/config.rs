//! Centralized configuration for resumeport.
//!
//! Tunables that are not worth a command-line flag live here, with
//! environment variable overrides for runtime customization.

/// Libtorrent version written into every record.
pub const DEFAULT_LIBTORRENT_VERSION: &str = "2.0.9.0";

/// Central configuration for a migration run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub concurrency: ConcurrencyConfig,
    pub record: RecordConfig,
}

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Fixed number of concurrent entry tasks (None = derive from CPU count)
    pub max_tasks: Option<usize>,
    /// Tasks per CPU when `max_tasks` is not set
    pub per_cpu_factor: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_tasks: None,
            per_cpu_factor: 2,
        }
    }
}

impl ConcurrencyConfig {
    /// Number of entries processed at once, never zero.
    pub fn effective_limit(&self) -> usize {
        self.max_tasks
            .unwrap_or_else(|| num_cpus::get() * self.per_cpu_factor)
            .max(1)
    }
}

/// Values stamped into destination records.
#[derive(Debug, Clone)]
pub struct RecordConfig {
    pub libtorrent_version: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            libtorrent_version: DEFAULT_LIBTORRENT_VERSION.to_string(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyConfig::default(),
            record: RecordConfig::default(),
        }
    }
}

impl MigrationConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("RESUMEPORT_CONCURRENCY")
            && let Ok(count) = value.parse::<usize>()
        {
            config.concurrency.max_tasks = Some(count);
        }

        if let Ok(value) = std::env::var("RESUMEPORT_CONCURRENCY_FACTOR")
            && let Ok(factor) = value.parse::<usize>()
        {
            config.concurrency.per_cpu_factor = factor;
        }

        if let Ok(version) = std::env::var("RESUMEPORT_LIBTORRENT_VERSION")
            && !version.trim().is_empty()
        {
            config.record.libtorrent_version = version.trim().to_string();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = MigrationConfig::default();

        assert_eq!(config.concurrency.max_tasks, None);
        assert_eq!(config.concurrency.per_cpu_factor, 2);
        assert_eq!(config.record.libtorrent_version, "2.0.9.0");
        assert_eq!(
            config.concurrency.effective_limit(),
            num_cpus::get() * 2
        );
    }

    #[test]
    fn test_effective_limit_is_never_zero() {
        let concurrency = ConcurrencyConfig {
            max_tasks: Some(0),
            per_cpu_factor: 2,
        };
        assert_eq!(concurrency.effective_limit(), 1);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("RESUMEPORT_CONCURRENCY", "3");
            std::env::set_var("RESUMEPORT_CONCURRENCY_FACTOR", "4");
            std::env::set_var("RESUMEPORT_LIBTORRENT_VERSION", "1.2.19.0");
        }

        let config = MigrationConfig::from_env();

        assert_eq!(config.concurrency.max_tasks, Some(3));
        assert_eq!(config.concurrency.per_cpu_factor, 4);
        assert_eq!(config.concurrency.effective_limit(), 3);
        assert_eq!(config.record.libtorrent_version, "1.2.19.0");

        // Cleanup
        unsafe {
            std::env::remove_var("RESUMEPORT_CONCURRENCY");
            std::env::remove_var("RESUMEPORT_CONCURRENCY_FACTOR");
            std::env::remove_var("RESUMEPORT_LIBTORRENT_VERSION");
        }
    }
}
