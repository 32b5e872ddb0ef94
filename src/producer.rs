use crate::buffer::BoundedBuffer;
use crate::config::VALUE_BOUND;
use crate::event::Event;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Fills the buffer with random values in `0..VALUE_BOUND`, one per `pace`.
pub struct Producer<R> {
    buffer: BoundedBuffer<u32>,
    rng: R,
    pace: Duration,
}

impl<R: Rng> Producer<R> {
    pub fn new(buffer: BoundedBuffer<u32>, rng: R, pace: Duration) -> Self {
        Self { buffer, rng, pace }
    }

    /// Runs until the buffer's token is cancelled. Returns how many values
    /// made it into the buffer.
    pub fn run(mut self, mut emit: impl FnMut(Event)) -> u64 {
        let cancel = self.buffer.cancel_token().clone();
        let mut produced = 0;

        loop {
            let value = self.rng.gen_range(0..VALUE_BOUND);
            if let Err(err) = self.buffer.add(value) {
                debug!(produced, value = err.value, "producer stopping: {}", err.reason);
                break;
            }
            produced += 1;
            emit(Event::Produced { value });

            if let Err(reason) = cancel.sleep(self.pace) {
                debug!(produced, "producer stopping: {reason}");
                break;
            }
        }

        produced
    }
}

#[test]
fn produces_values_in_range_until_cancelled() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::thread;

    let buffer = BoundedBuffer::new(8);
    let producer = Producer::new(buffer.clone(), StdRng::seed_from_u64(7), Duration::ZERO);

    let (produced, events) = thread::scope(|s| {
        let worker = s.spawn(|| {
            let mut events = Vec::new();
            let produced = producer.run(|event| events.push(event));
            (produced, events)
        });

        let values: Vec<u32> = (0..100).map(|_| buffer.remove().unwrap()).collect();
        buffer.cancel_token().cancel();

        let (produced, events) = worker.join().unwrap();
        assert!(values.iter().all(|v| *v < VALUE_BOUND));

        // Every event we drained was reported, in the same order.
        let reported: Vec<u32> = events
            .iter()
            .map(|event| match event {
                Event::Produced { value } => *value,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(&reported[..100], &values[..]);
        (produced, events)
    });

    assert_eq!(produced, events.len() as u64);
    assert!(produced >= 100);
}

#[test]
fn cancelled_pacing_sleep_stops_the_loop() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::thread;
    use std::time::Instant;

    let buffer = BoundedBuffer::new(4);
    let producer = Producer::new(
        buffer.clone(),
        StdRng::seed_from_u64(1),
        Duration::from_secs(60),
    );

    let start = Instant::now();
    thread::scope(|s| {
        let worker = s.spawn(|| producer.run(|_| {}));

        thread::sleep(Duration::from_millis(50));
        buffer.cancel_token().cancel();
        assert_eq!(worker.join().unwrap(), 1);
    });

    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(buffer.len(), 1);
}
