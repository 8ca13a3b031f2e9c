//! Worker configuration.
//!
//! `SyncSettings` names the two stores and carries the engine's `SyncOptions`.
//! Values come from `TABLESYNC_*` environment variables; hosts may supply
//! overrides for individual variables (the CLI does so from its flags).

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default pause between two cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
/// Default candidate count at which the bulk path takes over
pub const DEFAULT_BULK_THRESHOLD: usize = 1000;
/// Default rows written per bulk-load statement
pub const DEFAULT_BULK_BATCH_SIZE: usize = 2000;
/// Default deadline for one bulk load
pub const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default deadline for ad-hoc statements (staging DDL, merge)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where a store lives
#[derive(Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Local database file, created when missing
    Local(PathBuf),
    /// Private in-memory database
    Memory,
    /// Remote libSQL database
    Remote { url: String, auth_token: String },
}

impl StoreLocation {
    /// Parse a store location from a path or URL
    ///
    /// `libsql://`, `http://` and `https://` URLs are remote and require an
    /// auth token; `:memory:` is an in-memory store; anything else is a path.
    pub fn parse(raw: &str, auth_token: Option<String>) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::Invalid(
                "store location must not be empty".to_string(),
            ));
        }
        if raw == ":memory:" {
            return Ok(Self::Memory);
        }
        if is_remote_url(raw) {
            let auth_token = auth_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!("remote store {raw} requires an auth token"))
                })?;
            return Ok(Self::Remote {
                url: raw.trim_end_matches('/').to_string(),
                auth_token,
            });
        }
        Ok(Self::Local(PathBuf::from(raw)))
    }
}

impl fmt::Debug for StoreLocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => formatter.debug_tuple("Local").field(path).finish(),
            Self::Memory => formatter.write_str("Memory"),
            Self::Remote { url, .. } => formatter
                .debug_struct("Remote")
                .field("url", url)
                .field("auth_token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(formatter, "{}", path.display()),
            Self::Memory => formatter.write_str(":memory:"),
            Self::Remote { url, .. } => formatter.write_str(url),
        }
    }
}

/// Tuning knobs of the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Pause between two cycles
    pub interval: Duration,
    /// Candidate count at or above which the bulk path is used
    pub bulk_threshold: usize,
    /// Rows per bulk-load statement
    pub bulk_batch_size: usize,
    /// Deadline for one bulk load
    pub bulk_timeout: Duration,
    /// Deadline for staging DDL and merge statements
    pub command_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            bulk_threshold: DEFAULT_BULK_THRESHOLD,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            bulk_timeout: DEFAULT_BULK_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl SyncOptions {
    /// Set the pause between cycles
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the bulk path threshold
    #[must_use]
    pub const fn with_bulk_threshold(mut self, threshold: usize) -> Self {
        self.bulk_threshold = threshold;
        self
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk_threshold == 0 {
            return Err(ConfigError::Invalid(
                "bulk threshold must be at least 1".to_string(),
            ));
        }
        if self.bulk_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "bulk batch size must be at least 1".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sync interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a worker host needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub source: StoreLocation,
    pub target: StoreLocation,
    pub options: SyncOptions,
}

impl SyncSettings {
    /// Read the process environment, preferring `overrides` where it has a value
    pub fn from_env_with(
        overrides: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| overrides(name).or_else(|| values.get(name).cloned()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let source = StoreLocation::parse(
            &required_trimmed(&lookup, "TABLESYNC_SOURCE_URL")?,
            optional_trimmed(&lookup, "TABLESYNC_SOURCE_AUTH_TOKEN"),
        )?;
        let target = StoreLocation::parse(
            &required_trimmed(&lookup, "TABLESYNC_TARGET_URL")?,
            optional_trimmed(&lookup, "TABLESYNC_TARGET_AUTH_TOKEN"),
        )?;
        if source == target && source != StoreLocation::Memory {
            return Err(ConfigError::Invalid(
                "TABLESYNC_SOURCE_URL and TABLESYNC_TARGET_URL must name different stores"
                    .to_string(),
            ));
        }

        let options = SyncOptions {
            interval: Duration::from_secs(bounded(
                &lookup,
                "TABLESYNC_INTERVAL_SECS",
                DEFAULT_INTERVAL.as_secs(),
                1..=86_400,
            )?),
            bulk_threshold: bounded_usize(
                &lookup,
                "TABLESYNC_BULK_THRESHOLD",
                DEFAULT_BULK_THRESHOLD,
                1..=1_000_000,
            )?,
            bulk_batch_size: bounded_usize(
                &lookup,
                "TABLESYNC_BULK_BATCH_SIZE",
                DEFAULT_BULK_BATCH_SIZE,
                1..=100_000,
            )?,
            bulk_timeout: Duration::from_secs(bounded(
                &lookup,
                "TABLESYNC_BULK_TIMEOUT_SECS",
                DEFAULT_BULK_TIMEOUT.as_secs(),
                1..=3_600,
            )?),
            command_timeout: Duration::from_secs(bounded(
                &lookup,
                "TABLESYNC_COMMAND_TIMEOUT_SECS",
                DEFAULT_COMMAND_TIMEOUT.as_secs(),
                1..=3_600,
            )?),
        };

        Ok(Self {
            source,
            target,
            options,
        })
    }
}

fn bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn bounded_usize(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: usize,
    range: RangeInclusive<usize>,
) -> Result<usize, ConfigError> {
    let to_u64 = |value: usize| u64::try_from(value).unwrap_or(u64::MAX);
    let value = bounded(
        lookup,
        name,
        to_u64(default),
        to_u64(*range.start())..=to_u64(*range.end()),
    )?;
    usize::try_from(value).map_err(|_| ConfigError::Invalid(format!("{name} is too large")))
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn is_remote_url(value: &str) -> bool {
    value.starts_with("libsql://") || value.starts_with("http://") || value.starts_with("https://")
}
