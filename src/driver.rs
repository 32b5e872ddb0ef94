//! Wires one buffer, one producer thread and one consumer thread together.
//!
//! [`Driver::start`] returns as soon as both threads run. The caller then
//! picks how the run ends: [`Driver::shutdown`] cancels and joins, while
//! [`Driver::join`] waits for someone else to cancel the token, which for
//! the plain demo means forever.

use crate::buffer::BoundedBuffer;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::consumer::{Consumer, Tally, Totals};
use crate::error::DriverError;
use crate::event::Event;
use crate::producer::Producer;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Final numbers from a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub produced: u64,
    pub totals: Totals,
}

pub struct Driver {
    cancel: CancelToken,
    tally: Tally,
    producer: JoinHandle<u64>,
    consumer: JoinHandle<Totals>,
}

impl Driver {
    /// Builds the buffer and spawns both tasks. Every event goes to `sink`,
    /// from whichever thread emitted it.
    pub fn start<F>(config: &Config, sink: F) -> Result<Self, DriverError>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let cancel = CancelToken::new();
        let buffer = BoundedBuffer::with_cancel(config.capacity.get(), &cancel);
        let sink = Arc::new(sink);

        let producer = {
            let buffer = buffer.clone();
            let sink = sink.clone();
            let pace = config.produce_interval;
            thread::Builder::new()
                .name("producer".into())
                .spawn(move || {
                    // thread_rng is not Send, so the producer is built on its own thread.
                    Producer::new(buffer, rand::thread_rng(), pace).run(&*sink)
                })?
        };

        let consumer = Consumer::new(buffer, config.consume_interval);
        let tally = consumer.tally();
        let consumer = thread::Builder::new()
            .name("consumer".into())
            .spawn(move || consumer.run(&*sink));

        let consumer = match consumer {
            Ok(handle) => handle,
            Err(err) => {
                // Don't leave the producer running with nobody to drain it.
                cancel.cancel();
                let _ = producer.join();
                return Err(err.into());
            }
        };

        info!(
            capacity = config.capacity.get(),
            produce_ms = config.produce_interval.as_millis() as u64,
            consume_ms = config.consume_interval.as_millis() as u64,
            "producer and consumer started"
        );

        Ok(Self {
            cancel,
            tally,
            producer,
            consumer,
        })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The consumer's totals as of its last consumed value.
    pub fn totals(&self) -> Totals {
        self.tally.snapshot()
    }

    /// Cancels both tasks and waits for them to exit.
    pub fn shutdown(self) -> Result<Report, DriverError> {
        debug!("shutting down");
        self.cancel.cancel();
        self.join()
    }

    /// Waits for both tasks without cancelling them. Returns only once the
    /// token has been cancelled through [`Driver::cancel_token`].
    pub fn join(self) -> Result<Report, DriverError> {
        let produced = self.producer.join();
        let totals = self.consumer.join();

        let report = Report {
            produced: produced.map_err(|_| DriverError::Panicked("producer"))?,
            totals: totals.map_err(|_| DriverError::Panicked("consumer"))?,
        };
        info!(
            produced = report.produced,
            consumed = report.totals.consumed,
            sum = report.totals.sum,
            "producer and consumer stopped"
        );
        Ok(report)
    }
}

#[test]
fn shutdown_joins_and_reports_consistent_totals() {
    use crate::locks::Mutex;
    use std::num::NonZeroUsize;
    use std::time::{Duration, Instant};

    let config = Config {
        capacity: NonZeroUsize::new(3).unwrap(),
        produce_interval: Duration::from_millis(1),
        consume_interval: Duration::from_millis(2),
    };

    let events = Arc::new(Mutex::new(Vec::new()));
    let driver = {
        let events = events.clone();
        Driver::start(&config, move |event| events.lock().push(event)).unwrap()
    };

    let start = Instant::now();
    while driver.totals().consumed < 20 {
        assert!(start.elapsed() < Duration::from_secs(30), "consumer made no progress");
        thread::sleep(Duration::from_millis(5));
    }
    let report = driver.shutdown().unwrap();

    let events = events.lock();
    let produced: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            Event::Produced { value } => Some(*value),
            _ => None,
        })
        .collect();
    let consumed: Vec<(u32, u64)> = events
        .iter()
        .filter_map(|event| match event {
            Event::Consumed { value, sum } => Some((*value, *sum)),
            _ => None,
        })
        .collect();

    assert_eq!(report.produced, produced.len() as u64);
    assert_eq!(report.totals.consumed, consumed.len() as u64);
    assert!(report.totals.consumed >= 20);

    // Consumed values are the produced values, in order.
    let consumed_values: Vec<u32> = consumed.iter().map(|(value, _)| *value).collect();
    assert_eq!(&produced[..consumed_values.len()], &consumed_values[..]);

    let sum: u64 = consumed_values.iter().map(|&v| u64::from(v)).sum();
    assert_eq!(report.totals.sum, sum);
    assert_eq!(consumed.last().map(|(_, sum)| *sum), Some(sum));
}

#[test]
fn shutdown_interrupts_long_pacing() {
    use std::time::{Duration, Instant};

    let config = Config {
        produce_interval: Duration::from_secs(60),
        consume_interval: Duration::from_secs(60),
        ..Config::default()
    };

    let driver = Driver::start(&config, |_| {}).unwrap();
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    let report = driver.shutdown().unwrap();
    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(report.produced <= 1);
    assert!(report.totals.consumed <= 1);
}
