use super::futex::{self, wait, wake_all, wake_one};
use super::mutex::MutexGuard;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;
use std::time::Duration;

pub struct Condvar {
    /// Bumped on every notification. Waiters sleep until it moves.
    counter: AtomicU32,
    /// Lets notify skip the wake syscall when nobody is waiting.
    num_waiters: AtomicUsize,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            num_waiters: AtomicUsize::new(0),
        }
    }

    // Relaxed is enough for num_waiters: waiters increment it while still
    // holding the mutex and decrement it before relocking, and notifiers
    // are expected to have touched the same mutex. The mutex's
    // acquire/release orders these against each other.
    pub fn notify_one(&self) {
        if self.num_waiters.load(Relaxed) > 0 {
            self.counter.fetch_add(1, Relaxed);
            wake_one(&self.counter);
        }
    }

    pub fn notify_all(&self) {
        if self.num_waiters.load(Relaxed) > 0 {
            self.counter.fetch_add(1, Relaxed);
            wake_all(&self.counter);
        }
    }

    /// Unlocks the guard, sleeps until notified, and returns the relocked guard.
    ///
    /// Wakeups can be spurious. Always call this in a loop over the predicate.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        // Both of these are Relaxed and that is fine because we still hold
        // the mutex. A notifier is expected to change the protected state
        // under the same mutex before it calls notify. Its lock acquire
        // happens after our unlock below, and our unlock is a Release. So
        // by the time it loads num_waiters it sees our increment, and it
        // cannot skip the wake while we are about to sleep.
        self.num_waiters.fetch_add(1, Relaxed);
        let counter_value = self.counter.load(Relaxed);

        // Unlock by dropping the guard, but keep the mutex reference so we
        // can lock again. This is why the guard's field is visible to the
        // locks module.
        let mutex = guard.mutex;
        drop(guard);

        // The futex only sleeps if the counter still holds the value we read
        // before unlocking. A notification that landed between the unlock
        // and this call has already bumped it, so we return right away
        // instead of missing it.
        //
        // The counter can wrap after 2^32 notifications. If exactly that
        // many arrive between our load and the wait, we sleep through them.
        // That is practically impossible, and a timed wait would recover
        // from it anyway.
        wait(&self.counter, counter_value);

        // The decrement happens before we relock. A notifier that takes the
        // mutex after us will see it, so it can skip the syscall when
        // nobody is left waiting.
        self.num_waiters.fetch_sub(1, Relaxed);
        mutex.lock()
    }

    /// Like [`Condvar::wait`], but sleeps for at most `timeout`.
    ///
    /// The caller tracks its own deadline; a return tells it nothing about
    /// whether it was notified or timed out.
    pub fn wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> MutexGuard<'a, T> {
        self.num_waiters.fetch_add(1, Relaxed);
        let counter_value = self.counter.load(Relaxed);

        let mutex = guard.mutex;
        drop(guard);

        futex::wait_timeout(&self.counter, counter_value, timeout);

        self.num_waiters.fetch_sub(1, Relaxed);
        mutex.lock()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[test]
fn wait_is_woken_by_notify() {
    use super::mutex::Mutex;
    use std::thread;

    let mutex = Mutex::new(0);
    let condvar = Condvar::new();

    let mut wakeups = 0;

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(200));
            *mutex.lock() = 123;
            condvar.notify_one();
        });

        let mut m = mutex.lock();
        while *m < 100 {
            m = condvar.wait(m);
            wakeups += 1;
        }

        assert_eq!(*m, 123);
    });

    // The main thread slept instead of busy-looping, give or take a few
    // spurious wakeups.
    assert!(wakeups < 10);
}

#[test]
fn notify_all_wakes_every_waiter() {
    use super::mutex::Mutex;
    use std::thread;

    let mutex = Mutex::new(false);
    let condvar = Condvar::new();

    thread::scope(|s| {
        for _ in 0..3 {
            s.spawn(|| {
                let mut ready = mutex.lock();
                while !*ready {
                    ready = condvar.wait(ready);
                }
            });
        }

        thread::sleep(Duration::from_millis(50));
        *mutex.lock() = true;
        condvar.notify_all();
    });
}

#[test]
fn wait_timeout_returns_without_notification() {
    use super::mutex::Mutex;
    use std::time::Instant;

    let mutex = Mutex::new(());
    let condvar = Condvar::new();

    let start = Instant::now();
    let deadline = start + Duration::from_millis(30);
    let mut guard = mutex.lock();
    while Instant::now() < deadline {
        guard = condvar.wait_timeout(guard, deadline - Instant::now());
    }
    drop(guard);

    assert!(start.elapsed() >= Duration::from_millis(30));
}
