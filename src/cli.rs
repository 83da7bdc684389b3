//! CLI for this application
//!
use std::path::PathBuf;

use crate::error::Result;
use crate::settings::{self, BucketSettings};

#[derive(Clone, Debug, clap::Parser)]
#[command(name = "leaky", version = settings::APP_VERSION)]
#[command(about = "Inspect and exercise persisted leaky buckets")]
pub struct Cli {
    // Amount drained per interval
    #[clap(
        long,
        default_value = settings::DEFAULT_DRAIN_BY,
        env("LEAKY_DRAIN_BY"),
        help = "Amount drained every interval"
    )]
    pub drain_by: i64,

    // Drain interval in milliseconds
    #[clap(
        long,
        default_value = settings::DEFAULT_DRAIN_INTERVAL_MS,
        env("LEAKY_DRAIN_INTERVAL_MS"),
        help = "Drain interval in milliseconds"
    )]
    pub drain_interval_ms: i64,

    // Maximum value
    #[clap(
        long,
        default_value = settings::DEFAULT_CAPACITY,
        env("LEAKY_CAPACITY"),
        help = "Bucket capacity"
    )]
    pub capacity: i64,

    // JSON settings file; overrides the flags above
    #[clap(
        long,
        env("LEAKY_CONFIG"),
        help = "Path to a JSON settings file (overrides drain/capacity flags)"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Walk through add, inspect, set and reconfigure on a fresh bucket
    Basic,
    /// Encode a bucket, decode it again and compare
    Serialize {
        /// Also persist the encoded bucket here
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
    /// Print a persisted bucket
    Inspect {
        #[arg(long)]
        state_file: PathBuf,
    },
    /// Restore (or create) a persisted bucket, add to it and persist it again
    Add {
        #[arg(long)]
        state_file: PathBuf,
        #[arg(allow_hyphen_values = true)]
        amount: i64,
    },
}

impl Cli {
    pub fn bucket_settings(&self) -> Result<BucketSettings> {
        let settings = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    crate::settings_error!("unable to read {}: {}", path.display(), e)
                })?;
                BucketSettings::from_json(&raw)?
            }
            None => BucketSettings {
                drain_by: self.drain_by,
                drain_interval_ns: self.drain_interval_ns()?,
                capacity: self.capacity,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    fn drain_interval_ns(&self) -> Result<i64> {
        self.drain_interval_ms.checked_mul(1_000_000).ok_or_else(|| {
            crate::settings_error!("drain interval of {}ms is out of range", self.drain_interval_ms)
        })
    }
}
