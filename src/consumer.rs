use crate::buffer::BoundedBuffer;
use crate::event::Event;
use crate::locks::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What the consumer has taken out of the buffer so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub consumed: u64,
    pub sum: u64,
}

/// Read side of the consumer's running totals.
///
/// The consumer owns the sum and publishes a copy after every item.
/// Readers only ever see whole snapshots.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    totals: Arc<Mutex<Totals>>,
}

impl Tally {
    pub fn snapshot(&self) -> Totals {
        *self.totals.lock()
    }

    fn publish(&self, totals: Totals) {
        *self.totals.lock() = totals;
    }
}

/// Drains the buffer, one value per `pace`, keeping a running sum.
pub struct Consumer {
    buffer: BoundedBuffer<u32>,
    pace: Duration,
    tally: Tally,
}

impl Consumer {
    pub fn new(buffer: BoundedBuffer<u32>, pace: Duration) -> Self {
        Self {
            buffer,
            pace,
            tally: Tally::default(),
        }
    }

    pub fn tally(&self) -> Tally {
        self.tally.clone()
    }

    /// Runs until the buffer's token is cancelled and returns the final totals.
    pub fn run(self, mut emit: impl FnMut(Event)) -> Totals {
        let cancel = self.buffer.cancel_token().clone();
        let mut totals = Totals::default();

        loop {
            let value = match self.buffer.remove() {
                Ok(value) => value,
                Err(reason) => {
                    debug!(consumed = totals.consumed, "consumer stopping: {reason}");
                    break;
                }
            };
            totals.consumed += 1;
            totals.sum += u64::from(value);
            self.tally.publish(totals);
            emit(Event::Consumed {
                value,
                sum: totals.sum,
            });

            if let Err(reason) = cancel.sleep(self.pace) {
                debug!(consumed = totals.consumed, "consumer stopping: {reason}");
                break;
            }
        }

        totals
    }
}

#[test]
fn running_sum_matches_consumed_values() {
    use std::thread;

    let buffer = BoundedBuffer::new(4);
    let consumer = Consumer::new(buffer.clone(), Duration::ZERO);
    let tally = consumer.tally();
    let inputs = [3u32, 99, 0, 41, 12, 7, 58];

    let (totals, events) = thread::scope(|s| {
        let worker = s.spawn(|| {
            let mut events = Vec::new();
            let totals = consumer.run(|event| events.push(event));
            (totals, events)
        });

        for value in inputs {
            buffer.add(value).unwrap();
        }
        while tally.snapshot().consumed < inputs.len() as u64 {
            thread::yield_now();
        }
        buffer.cancel_token().cancel();
        worker.join().unwrap()
    });

    let expected: u64 = inputs.iter().map(|&v| u64::from(v)).sum();
    assert_eq!(totals, Totals { consumed: 7, sum: expected });
    assert_eq!(tally.snapshot(), totals);

    // Each event carries the prefix sum up to that value.
    let mut running = 0;
    for (event, value) in events.iter().zip(inputs) {
        running += u64::from(value);
        assert_eq!(*event, Event::Consumed { value, sum: running });
    }
}

#[test]
fn cancel_while_waiting_on_empty_buffer() {
    use std::thread;

    let buffer = BoundedBuffer::<u32>::new(1);
    let consumer = Consumer::new(buffer.clone(), Duration::from_secs(60));

    thread::scope(|s| {
        let worker = s.spawn(|| consumer.run(|_| {}));
        thread::sleep(Duration::from_millis(50));
        buffer.cancel_token().cancel();
        assert_eq!(worker.join().unwrap(), Totals::default());
    });
}
