//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, GetArgs, GlobalOverrides, InspectIdArgs, InvalidateArgs, NextIdArgs,
    WarmArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampede";
const ENV_PREFIX: &str = "STAMPEDE";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_NULL_TTL_SECS: u64 = 2 * 60;
const DEFAULT_LOCK_TTL_SECS: u64 = 10;
const DEFAULT_ENTRY_TTL_SECS: u64 = 30 * 60;
const DEFAULT_REBUILD_WORKERS: u64 = 10;
const DEFAULT_REBUILD_QUEUE_CAPACITY: u64 = 1024;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub rebuild: RebuildSettings,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// `None` selects the process-local in-memory store.
    pub url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub null_ttl: Duration,
    pub lock_ttl: Duration,
    pub default_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct RebuildSettings {
    pub workers: NonZeroUsize,
    pub queue_capacity: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    store: RawStoreSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    rebuild: RawRebuildSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.store_url.as_ref() {
            self.store.url = Some(url.clone());
        }
        if let Some(timeout) = overrides.store_timeout_ms {
            self.store.timeout_ms = Some(timeout);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            store,
            logging,
            cache,
            rebuild,
        } = raw;

        Ok(Self {
            store: build_store_settings(store)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            rebuild: build_rebuild_settings(rebuild)?,
        })
    }
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let url = store.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let timeout_ms = store.timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "store.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(StoreSettings {
        url,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let null_ttl = seconds(
        cache.null_ttl_seconds.unwrap_or(DEFAULT_NULL_TTL_SECS),
        "cache.null_ttl_seconds",
    )?;
    let lock_ttl = seconds(
        cache.lock_ttl_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECS),
        "cache.lock_ttl_seconds",
    )?;
    let default_ttl = seconds(
        cache.default_ttl_seconds.unwrap_or(DEFAULT_ENTRY_TTL_SECS),
        "cache.default_ttl_seconds",
    )?;

    if null_ttl >= default_ttl {
        return Err(LoadError::invalid(
            "cache.null_ttl_seconds",
            "must be shorter than cache.default_ttl_seconds",
        ));
    }

    Ok(CacheSettings {
        null_ttl,
        lock_ttl,
        default_ttl,
    })
}

fn build_rebuild_settings(rebuild: RawRebuildSettings) -> Result<RebuildSettings, LoadError> {
    let workers = non_zero_usize(
        rebuild.workers.unwrap_or(DEFAULT_REBUILD_WORKERS),
        "rebuild.workers",
    )?;
    let queue_capacity = non_zero_usize(
        rebuild
            .queue_capacity
            .unwrap_or(DEFAULT_REBUILD_QUEUE_CAPACITY),
        "rebuild.queue_capacity",
    )?;

    Ok(RebuildSettings {
        workers,
        queue_capacity,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    null_ttl_seconds: Option<u64>,
    lock_ttl_seconds: Option<u64>,
    default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRebuildSettings {
    workers: Option<u64>,
    queue_capacity: Option<u64>,
}

fn seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
