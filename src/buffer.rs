//! A fixed-capacity FIFO shared between producer and consumer threads.
//!
//! One mutex guards the queue and one condition variable carries every
//! state change. Producers blocked on "full" and consumers blocked on
//! "empty" share that condvar, so each change is broadcast and every
//! waiter re-checks its own predicate.

use crate::cancel::{CancelToken, Wake};
use crate::error::{AddError, BufferError};
use crate::locks::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

pub struct BoundedBuffer<T> {
    shared: Arc<Shared<T>>,
    cancel: CancelToken,
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    changed: Condvar,
    capacity: usize,
}

impl<T: Send + 'static> BoundedBuffer<T> {
    /// Creates a buffer with its own cancellation token.
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_cancel(capacity, &CancelToken::new())
    }

    /// Creates a buffer whose blocked callers give up once `cancel` fires.
    ///
    /// Panics if `capacity` is zero.
    pub fn with_cancel(capacity: usize, cancel: &CancelToken) -> Self {
        assert!(capacity > 0, "buffer capacity must be at least 1");

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            changed: Condvar::new(),
            capacity,
        });

        let wake: Weak<dyn Wake> = Arc::downgrade(&shared) as Weak<Shared<T>>;
        cancel.on_cancel(wake);

        Self {
            shared,
            cancel: cancel.clone(),
        }
    }
}

impl<T> BoundedBuffer<T> {
    /// Appends `value`, blocking while the buffer is full.
    pub fn add(&self, value: T) -> Result<(), AddError<T>> {
        self.add_until(value, None)
    }

    /// Like [`BoundedBuffer::add`], but fails with
    /// [`BufferError::TimedOut`] if no slot frees up within `timeout`.
    ///
    /// A timeout too large to represent as an `Instant` waits without a deadline.
    pub fn add_timeout(&self, value: T, timeout: Duration) -> Result<(), AddError<T>> {
        self.add_until(value, deadline_after(timeout))
    }

    /// Removes the oldest value, blocking while the buffer is empty.
    pub fn remove(&self) -> Result<T, BufferError> {
        self.remove_until(None)
    }

    /// Like [`BoundedBuffer::remove`], but fails with
    /// [`BufferError::TimedOut`] if nothing arrives within `timeout`.
    ///
    /// A timeout too large to represent as an `Instant` waits without a deadline.
    pub fn remove_timeout(&self, timeout: Duration) -> Result<T, BufferError> {
        self.remove_until(deadline_after(timeout))
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn add_until(
        &self,
        value: T,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(), AddError<T>> {
        let mut queue = self.shared.queue.lock();
        loop {
            if let Err(reason) = self.cancel.check() {
                return Err(AddError { reason, value });
            }
            if queue.len() < self.shared.capacity {
                break;
            }
            trace!(len = queue.len(), "buffer full, waiting");
            queue = match self.wait(queue, deadline) {
                Ok(queue) => queue,
                Err(reason) => return Err(AddError { reason, value }),
            };
        }

        queue.push_back(value);
        drop(queue);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn remove_until(&self, deadline: Option<(Instant, Duration)>) -> Result<T, BufferError> {
        let mut queue = self.shared.queue.lock();
        let value = loop {
            self.cancel.check()?;
            if let Some(value) = queue.pop_front() {
                break value;
            }
            trace!("buffer empty, waiting");
            queue = self.wait(queue, deadline)?;
        };

        drop(queue);
        self.shared.changed.notify_all();
        Ok(value)
    }

    /// One round of waiting on the shared condvar, bounded by `deadline`.
    fn wait<'a>(
        &self,
        queue: MutexGuard<'a, VecDeque<T>>,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<MutexGuard<'a, VecDeque<T>>, BufferError> {
        match deadline {
            None => Ok(self.shared.changed.wait(queue)),
            Some((at, timeout)) => {
                let remaining = at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(BufferError::TimedOut(timeout));
                }
                Ok(self.shared.changed.wait_timeout(queue, remaining))
            }
        }
    }
}

fn deadline_after(timeout: Duration) -> Option<(Instant, Duration)> {
    Instant::now()
        .checked_add(timeout)
        .map(|deadline| (deadline, timeout))
}

impl<T: Send> Wake for Shared<T> {
    fn wake(&self) {
        // Passing through the lock orders the wakeup after any waiter that
        // already checked the flag and is about to sleep.
        drop(self.queue.lock());
        self.changed.notify_all();
    }
}

impl<T> Clone for BoundedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> std::fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("BoundedBuffer");
        match self.shared.queue.try_lock() {
            Some(queue) => d.field("len", &queue.len()),
            None => d.field("len", &format_args!("<locked>")),
        };
        d.field("capacity", &self.shared.capacity)
            .field("cancel", &self.cancel)
            .finish()
    }
}

#[test]
fn third_add_blocks_until_a_remove() {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering::{Acquire, Release};
    use std::thread;

    let buffer = BoundedBuffer::new(2);
    buffer.add(5).unwrap();
    buffer.add(7).unwrap();
    assert_eq!(buffer.len(), 2);

    let added = AtomicBool::new(false);

    thread::scope(|s| {
        let adder = s.spawn(|| {
            buffer.add(9).unwrap();
            added.store(true, Release);
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!added.load(Acquire), "add returned while the buffer was full");

        assert_eq!(buffer.remove().unwrap(), 5);
        adder.join().unwrap();
    });

    assert!(added.load(Acquire));
    assert_eq!(buffer.remove().unwrap(), 7);
    assert_eq!(buffer.remove().unwrap(), 9);
    assert!(buffer.is_empty());
}

#[test]
fn remove_on_empty_waits_for_add() {
    use std::thread;

    let buffer = BoundedBuffer::new(1);

    thread::scope(|s| {
        let remover = s.spawn(|| buffer.remove().unwrap());

        thread::sleep(Duration::from_millis(100));
        assert!(!remover.is_finished(), "remove returned on an empty buffer");

        buffer.add(42).unwrap();
        assert_eq!(remover.join().unwrap(), 42);
    });
}

#[test]
fn single_producer_single_consumer_is_fifo() {
    use std::thread;

    const N: u32 = 10_000;
    let buffer = BoundedBuffer::new(3);

    let received = thread::scope(|s| {
        s.spawn(|| {
            for i in 0..N {
                buffer.add(i).unwrap();
            }
        });

        let mut received = Vec::with_capacity(N as usize);
        for _ in 0..N {
            let value = buffer.remove().unwrap();
            assert!(buffer.len() <= buffer.capacity());
            received.push(value);
        }
        received
    });

    // In order, nothing lost, nothing duplicated.
    assert_eq!(received, (0..N).collect::<Vec<_>>());
    assert!(buffer.is_empty());
}

#[test]
fn length_never_exceeds_capacity() {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering::Relaxed;
    use std::thread;

    let buffer = BoundedBuffer::new(4);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        // Several producers and consumers sharing one condvar.
        for p in 0..3u32 {
            let buffer = &buffer;
            s.spawn(move || {
                for i in 0..2_000 {
                    buffer.add(p * 10_000 + i).unwrap();
                }
            });
        }
        let consumers: Vec<_> = (0..2)
            .map(|_| s.spawn(|| (0..3_000).map(|_| buffer.remove().unwrap()).count()))
            .collect();

        s.spawn(|| {
            while !done.load(Relaxed) {
                let len = buffer.len();
                assert!(len <= buffer.capacity(), "len = {}", len);
            }
        });

        let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        done.store(true, Relaxed);
        assert_eq!(total, 6_000);
    });

    assert!(buffer.is_empty());
}

#[test]
fn cancel_unblocks_add_and_returns_the_value() {
    use std::thread;

    let token = CancelToken::new();
    let buffer = BoundedBuffer::with_cancel(1, &token);
    buffer.add("first").unwrap();

    thread::scope(|s| {
        let adder = s.spawn(|| buffer.add("second"));

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let err = adder.join().unwrap().unwrap_err();
        assert_eq!(err.reason, BufferError::Cancelled);
        assert_eq!(err.into_inner(), "second");
    });

    // The cancelled attempt left the queue untouched.
    assert_eq!(buffer.len(), 1);
}

#[test]
fn cancel_unblocks_remove() {
    use std::thread;

    let buffer = BoundedBuffer::<u32>::new(2);

    thread::scope(|s| {
        let remover = s.spawn(|| buffer.remove());

        thread::sleep(Duration::from_millis(50));
        buffer.cancel_token().cancel();

        assert_eq!(remover.join().unwrap(), Err(BufferError::Cancelled));
    });

    // A cancelled buffer refuses further work.
    assert_eq!(buffer.add(1).unwrap_err().reason, BufferError::Cancelled);
}

#[test]
fn timeouts_fire_when_nothing_changes() {
    let buffer = BoundedBuffer::new(1);
    let timeout = Duration::from_millis(30);

    let start = Instant::now();
    assert_eq!(buffer.remove_timeout(timeout), Err(BufferError::TimedOut(timeout)));
    assert!(start.elapsed() >= timeout);

    buffer.add_timeout(1, timeout).unwrap();
    let err = buffer.add_timeout(2, timeout).unwrap_err();
    assert_eq!(err.reason, BufferError::TimedOut(timeout));
    assert_eq!(err.value, 2);

    assert_eq!(buffer.remove_timeout(timeout), Ok(1));
}

#[test]
fn timed_remove_is_woken_by_add() {
    use std::thread;

    let buffer = BoundedBuffer::new(1);
    let start = Instant::now();

    thread::scope(|s| {
        let remover = s.spawn(|| buffer.remove_timeout(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(50));
        buffer.add(3).unwrap();

        assert_eq!(remover.join().unwrap(), Ok(3));
    });

    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn timed_add_is_woken_by_remove() {
    use std::thread;

    let buffer = BoundedBuffer::new(1);
    buffer.add(1).unwrap();
    let start = Instant::now();

    thread::scope(|s| {
        let adder = s.spawn(|| buffer.add_timeout(2, Duration::from_secs(5)).is_ok());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(buffer.remove(), Ok(1));

        assert!(adder.join().unwrap());
    });

    assert!(start.elapsed() < Duration::from_secs(4));
    assert_eq!(buffer.remove(), Ok(2));
}

#[test]
fn unrepresentable_timeout_means_no_deadline() {
    use std::thread;

    let buffer = BoundedBuffer::new(1);
    buffer.add_timeout(1u32, Duration::MAX).unwrap();
    assert_eq!(buffer.remove_timeout(Duration::MAX), Ok(1));

    // A blocked call with no deadline still answers to cancellation.
    thread::scope(|s| {
        let remover = s.spawn(|| buffer.remove_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(50));
        buffer.cancel_token().cancel();
        assert_eq!(remover.join().unwrap(), Err(BufferError::Cancelled));
    });
}

#[test]
fn debug_does_not_block_while_locked() {
    let buffer = BoundedBuffer::new(2);
    buffer.add(1u32).unwrap();
    assert!(format!("{buffer:?}").contains("len: 1"));

    let held = buffer.shared.queue.lock();
    assert!(format!("{buffer:?}").contains("<locked>"));
    drop(held);
}

#[test]
#[should_panic(expected = "capacity")]
fn zero_capacity_is_rejected() {
    let _ = BoundedBuffer::<u32>::new(0);
}
