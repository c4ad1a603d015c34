use std::num::NonZeroU32;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the stampede binary.
#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    version,
    about = "Cache-aside toolkit: inspect and seed cache entries, mint ids"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "STAMPEDE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the store URL (e.g. redis://127.0.0.1:6379/0).
    #[arg(long = "store-url", value_name = "URL", global = true)]
    pub store_url: Option<String>,

    /// Override the per-operation store timeout.
    #[arg(long = "store-timeout-ms", value_name = "MILLIS", global = true)]
    pub store_timeout_ms: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Generate ids from the per-day counter of PREFIX.
    #[command(name = "next-id")]
    NextId(NextIdArgs),
    /// Split an id into its timestamp and sequence parts.
    #[command(name = "inspect-id")]
    InspectId(InspectIdArgs),
    /// Print the raw stored value at KEY.
    Get(GetArgs),
    /// Seed one logical-expiration entry.
    Warm(WarmArgs),
    /// Delete the cache entry for PREFIX + ID.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct NextIdArgs {
    /// Business prefix namespacing the counter (no `:`).
    #[arg(value_name = "PREFIX")]
    pub prefix: String,

    /// Number of ids to generate.
    #[arg(long, default_value = "1", value_name = "N")]
    pub count: NonZeroU32,
}

#[derive(Debug, Args, Clone)]
pub struct InspectIdArgs {
    #[arg(value_name = "ID", allow_negative_numbers = true)]
    pub id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    #[arg(value_name = "KEY")]
    pub key: String,
}

#[derive(Debug, Args, Clone)]
pub struct WarmArgs {
    /// Cache key prefix, ending in `:`.
    #[arg(value_name = "PREFIX")]
    pub prefix: String,

    #[arg(value_name = "ID")]
    pub id: String,

    /// JSON document to store as the entry's data.
    #[arg(value_name = "JSON")]
    pub json: String,

    /// Logical TTL; defaults to `cache.default_ttl_seconds`.
    #[arg(long = "logical-ttl-seconds", value_name = "SECONDS")]
    pub logical_ttl_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    /// Cache key prefix, ending in `:`.
    #[arg(value_name = "PREFIX")]
    pub prefix: String,

    #[arg(value_name = "ID")]
    pub id: String,
}
