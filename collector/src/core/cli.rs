use clap::{Parser, Subcommand};

use std::path::PathBuf;

use crate::domain::types::{Consistency, Precision};

use super::constants::{
    ENV_BATCH_SIZE, ENV_CHANNEL_CAPACITY, ENV_CONFIG, ENV_CONSISTENCY, ENV_DATABASE,
    ENV_FLUSH_INTERVAL_MS, ENV_INFLUX_PASSWORD, ENV_INFLUX_URL, ENV_INFLUX_USERNAME,
    ENV_PRECISION, ENV_RETENTION_POLICY, ENV_USE_EVENT_TIME, ENV_WRITE_BASE_DELAY_MS,
    ENV_WRITE_MAX_ATTEMPTS,
};

#[derive(Parser)]
#[command(name = "statewatch")]
#[command(version, about = "Forward systemd unit state changes to InfluxDB", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// InfluxDB base URL
    #[arg(long, global = true, env = ENV_INFLUX_URL)]
    pub influx_url: Option<String>,

    /// InfluxDB username
    #[arg(long, global = true, env = ENV_INFLUX_USERNAME)]
    pub influx_username: Option<String>,

    /// InfluxDB password
    #[arg(long, global = true, env = ENV_INFLUX_PASSWORD, hide_env_values = true)]
    pub influx_password: Option<String>,

    /// Target database
    #[arg(long, global = true, env = ENV_DATABASE)]
    pub database: Option<String>,

    /// Retention policy (empty uses the database default)
    #[arg(long, global = true, env = ENV_RETENTION_POLICY)]
    pub retention_policy: Option<String>,

    /// Timestamp precision (ns, u, ms, s)
    #[arg(long, global = true, env = ENV_PRECISION, value_parser = parse_precision)]
    pub precision: Option<Precision>,

    /// Write consistency (any, one, quorum, all)
    #[arg(long, global = true, env = ENV_CONSISTENCY, value_parser = parse_consistency)]
    pub consistency: Option<Consistency>,

    /// Capacity of the notification and error channels
    #[arg(long, global = true, env = ENV_CHANNEL_CAPACITY)]
    pub channel_capacity: Option<usize>,

    /// Points per write (1 = one write per state change)
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// Flush interval for partially filled batches, in milliseconds
    #[arg(long, global = true, env = ENV_FLUSH_INTERVAL_MS)]
    pub flush_interval_ms: Option<u64>,

    /// Write attempts per batch before it is dropped
    #[arg(long, global = true, env = ENV_WRITE_MAX_ATTEMPTS)]
    pub write_max_attempts: Option<u32>,

    /// Base delay of the write backoff, in milliseconds
    #[arg(long, global = true, env = ENV_WRITE_BASE_DELAY_MS)]
    pub write_base_delay_ms: Option<u64>,

    /// Timestamp points with the unit's state change time instead of processing time
    #[arg(long, global = true, env = ENV_USE_EVENT_TIME)]
    pub use_event_time: Option<bool>,
}

/// Parse precision from CLI/env string
fn parse_precision(s: &str) -> Result<Precision, String> {
    match s.to_lowercase().as_str() {
        "ns" | "n" => Ok(Precision::Nanoseconds),
        "u" | "us" => Ok(Precision::Microseconds),
        "ms" => Ok(Precision::Milliseconds),
        "s" => Ok(Precision::Seconds),
        _ => Err(format!(
            "Invalid precision '{}'. Valid options: ns, u, ms, s",
            s
        )),
    }
}

/// Parse consistency level from CLI/env string
fn parse_consistency(s: &str) -> Result<Consistency, String> {
    match s.to_lowercase().as_str() {
        "any" => Ok(Consistency::Any),
        "one" => Ok(Consistency::One),
        "quorum" => Ok(Consistency::Quorum),
        "all" => Ok(Consistency::All),
        _ => Err(format!(
            "Invalid consistency '{}'. Valid options: any, one, quorum, all",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Collect unit state changes until stopped (default command)
    Run,
    /// Verify the store and the system bus are reachable, then exit
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub influx_url: Option<String>,
    pub influx_username: Option<String>,
    pub influx_password: Option<String>,
    pub database: Option<String>,
    pub retention_policy: Option<String>,
    pub precision: Option<Precision>,
    pub consistency: Option<Consistency>,
    pub channel_capacity: Option<usize>,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub write_max_attempts: Option<u32>,
    pub write_base_delay_ms: Option<u64>,
    pub use_event_time: Option<bool>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            influx_url: cli.influx_url,
            influx_username: cli.influx_username,
            influx_password: cli.influx_password,
            database: cli.database,
            retention_policy: cli.retention_policy,
            precision: cli.precision,
            consistency: cli.consistency,
            channel_capacity: cli.channel_capacity,
            batch_size: cli.batch_size,
            flush_interval_ms: cli.flush_interval_ms,
            write_max_attempts: cli.write_max_attempts,
            write_base_delay_ms: cli.write_base_delay_ms,
            use_event_time: cli.use_event_time,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let mut cli = Cli::parse();
    let command = cli.command.take();
    (CliConfig::from(cli), command)
}
