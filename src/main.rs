use anyhow::{Context, Result};
use bounded_buffer::config::{CONSUME_INTERVAL_MS, PRODUCE_INTERVAL_MS};
use bounded_buffer::{trace, Config, Driver};
use clap::Parser;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;
use tracing::info;

/// One producer and one consumer handing integers through a bounded buffer.
#[derive(Parser)]
struct Cli {
    /// Maximum number of values the buffer holds.
    #[arg(long, default_value_t = Config::default().capacity)]
    capacity: NonZeroUsize,
    /// Pause after each produced value, in milliseconds.
    #[arg(long, default_value_t = PRODUCE_INTERVAL_MS)]
    produce_ms: u64,
    /// Pause after each consumed value, in milliseconds.
    #[arg(long, default_value_t = CONSUME_INTERVAL_MS)]
    consume_ms: u64,
    /// Stop after this many seconds. Runs until killed when unset.
    #[arg(long)]
    run_for: Option<u64>,
}

fn main() -> Result<()> {
    trace::init_tracing();
    let cli = Cli::parse();

    let config = Config {
        capacity: cli.capacity,
        produce_interval: Duration::from_millis(cli.produce_ms),
        consume_interval: Duration::from_millis(cli.consume_ms),
    };

    let driver = Driver::start(&config, |event| println!("{event}"))
        .context("failed to start producer and consumer")?;

    let report = match cli.run_for {
        Some(secs) => {
            thread::sleep(Duration::from_secs(secs));
            driver.shutdown()?
        }
        // Nothing cancels the token here, so this blocks until the process is killed.
        None => driver.join()?,
    };

    info!(
        produced = report.produced,
        consumed = report.totals.consumed,
        sum = report.totals.sum,
        "done"
    );
    Ok(())
}
