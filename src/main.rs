use std::fs;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use chrono::Duration;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaky::cli::{self, Command};
use leaky::settings::{APP_NAME, APP_VERSION};
use leaky::{Bucket, BucketSettings};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leaky=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse args and env vars
    let args = cli::Cli::parse();
    info!("{} {}", APP_NAME, APP_VERSION);
    run(&args)
}

/// Settings flags only matter to commands that create a bucket
fn run(args: &cli::Cli) -> anyhow::Result<()> {
    match &args.command {
        Command::Basic => basic(&args.bucket_settings()?),
        Command::Serialize { state_file } => {
            serialize(&args.bucket_settings()?, state_file.as_deref())
        }
        Command::Inspect { state_file } => {
            let bucket = load(state_file)?;
            print!("{}", describe_bucket(&bucket));
            Ok(())
        }
        Command::Add { state_file, amount } => add(args, state_file, *amount),
    }
}

fn basic(settings: &BucketSettings) -> anyhow::Result<()> {
    let bucket = Bucket::from_settings(settings)?;

    match bucket.add(50) {
        Err(e) if e.is_full() => warn!("bucket is full"),
        Err(e) => return Err(e.into()),
        Ok(()) => println!("Size after add: {}", bucket.value()),
    }

    // These drain before answering
    println!("Remaining capacity: {}", bucket.remaining());
    println!("Size: {}", bucket.value());
    // This one doesn't
    println!("Undrained size: {}", bucket.peek());

    bucket.set(42_i64.min(bucket.capacity()), true)?;
    println!("Size after set: {}", bucket.value());

    bucket.set_capacity(700)?;
    bucket.set_drain_by(40)?;
    bucket.set_drain_interval(Duration::hours(1))?;
    println!("Remaining capacity after expansion: {}", bucket.remaining());
    println!("Size after expansion: {}", bucket.value());
    Ok(())
}

fn serialize(settings: &BucketSettings, state_file: Option<&Path>) -> anyhow::Result<()> {
    let bucket = Bucket::from_settings(settings)?;
    bucket.set(42_i64.min(bucket.capacity()), true)?;

    println!("Bucket before serialization:");
    print!("{}", describe_bucket(&bucket));

    let bytes = bucket.to_bytes()?;
    if let Some(path) = state_file {
        fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {} bytes to {}", bytes.len(), path.display());
    }

    let restored = Bucket::from_bytes(&bytes)?;
    println!("Bucket after deserialization:");
    print!("{}", describe_bucket(&restored));
    Ok(())
}

fn add(args: &cli::Cli, state_file: &Path, amount: i64) -> anyhow::Result<()> {
    let bucket = if state_file.exists() {
        let bucket = load(state_file)?;
        // Persisted configuration wins over flags
        match args.bucket_settings() {
            Ok(settings) if settings != bucket.settings() => warn!(
                "ignoring {:?}, {} is configured with {:?}",
                settings,
                state_file.display(),
                bucket.settings()
            ),
            Ok(_) => {}
            Err(e) => warn!("ignoring settings flags for {}: {}", state_file.display(), e),
        }
        bucket
    } else {
        info!("no state at {}, starting empty", state_file.display());
        Bucket::from_settings(&args.bucket_settings()?)?
    };

    let result = bucket.add(amount);
    // Persist even on Full: the drain that ran is still progress
    fs::write(state_file, bucket.to_bytes()?)
        .with_context(|| format!("writing {}", state_file.display()))?;
    result?;

    println!("Size: {}", bucket.peek());
    println!("Remaining capacity: {}", bucket.remaining());
    Ok(())
}

fn load(path: &Path) -> anyhow::Result<Bucket> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Bucket::decode(BufReader::new(file)).with_context(|| format!("decoding {}", path.display()))
}

/// Stored state first, read before anything drains, then the value as of now
fn describe_bucket(bucket: &Bucket) -> String {
    let stored = bucket.peek();
    let last_drain = bucket.last_drain();
    format!(
        "  Size (stored): {}\n  LastDrain (stored): {}\n  Capacity: {}\n  DrainBy: {}\n  DrainInterval: {}\n  Size (drained now): {}\n",
        stored,
        last_drain.to_rfc3339(),
        bucket.capacity(),
        bucket.drain_by(),
        bucket.drain_interval(),
        bucket.value(),
    )
}
