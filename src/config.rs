use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub cache: CacheConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the timeout watcher re-evaluates the session (milliseconds)
    pub check_interval_ms: u64,
    /// Fixed session window granted on login
    pub session_duration_seconds: u64,
    /// Minutes before expiry at which the warning begins
    pub warning_threshold_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How often the GC sweeper runs (seconds)
    pub gc_interval_seconds: u64,
    /// Idle time after which an entry is eligible for eviction (milliseconds)
    pub gc_time_ms: u64,
    /// Age after which an entry is refetched on next access (milliseconds)
    pub stale_time_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            session_duration_seconds: 28800, // 8 hours
            warning_threshold_minutes: 15,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            gc_interval_seconds: 60,
            gc_time_ms: 300_000,
            stale_time_ms: 60_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let session_duration_seconds = std::env::var("SESSION_DURATION_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(28800);

        let warning_threshold_minutes = std::env::var("SESSION_WARNING_THRESHOLD_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        let check_interval_ms = std::env::var("SESSION_CHECK_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let stale_time_ms = std::env::var("CACHE_STALE_TIME_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60_000);

        let gc_time_ms = std::env::var("CACHE_GC_TIME_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300_000);

        let gc_interval_seconds = std::env::var("CACHE_GC_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let config = Config {
            cache: CacheConfig {
                gc_interval_seconds,
                gc_time_ms,
                stale_time_ms,
            },
            session: SessionConfig {
                check_interval_ms,
                session_duration_seconds,
                warning_threshold_minutes,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.check_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "SESSION_CHECK_INTERVAL_MS cannot be zero".to_string(),
            ));
        }

        let warning_seconds = u64::from(self.session.warning_threshold_minutes) * 60;
        if warning_seconds >= self.session.session_duration_seconds {
            return Err(ConfigError::ValidationError(format!(
                "warning threshold ({warning_seconds}s) must be shorter than the session duration ({}s)",
                self.session.session_duration_seconds
            )));
        }

        if self.cache.gc_time_ms < self.cache.stale_time_ms {
            tracing::warn!(
                gc_time_ms = self.cache.gc_time_ms,
                stale_time_ms = self.cache.stale_time_ms,
                "gc window is shorter than the stale window; entries may be evicted while still fresh"
            );
        }

        Ok(())
    }
}
