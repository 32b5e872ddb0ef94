//! Cooperative cancellation.
//!
//! A [`CancelToken`] is shared by everything that should stop together.
//! Tasks check it at each suspension point: blocking buffer waits and the
//! pacing sleep. Cancelling wakes all of them so they can unwind.

use crate::error::BufferError;
use crate::locks::futex::{self, wait, wake_all};
use crate::locks::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

/// Something parked on its own futex that must be kicked on cancel.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    /// 0: active, 1: cancelled. Also the futex word sleepers wait on.
    state: AtomicU32,
    /// Woken once on cancel. Held weakly so a dropped buffer does not
    /// outlive its owners here.
    hooks: Mutex<Vec<Weak<dyn Wake>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Calling it again does nothing.
    pub fn cancel(&self) {
        if self.inner.state.swap(1, Release) == 1 {
            return;
        }
        debug!("cancellation requested");
        wake_all(&self.inner.state);

        // The flag is already set, so a waiter that misses this pass will
        // see it when it next takes its lock.
        for hook in self.inner.hooks.lock().iter() {
            if let Some(target) = hook.upgrade() {
                target.wake();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Acquire) == 1
    }

    pub fn check(&self) -> Result<(), BufferError> {
        if self.is_cancelled() {
            Err(BufferError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// A duration too large to represent as an `Instant` sleeps until cancelled.
    pub fn sleep(&self, duration: Duration) -> Result<(), BufferError> {
        let Some(deadline) = Instant::now().checked_add(duration) else {
            loop {
                self.check()?;
                wait(&self.inner.state, 0);
            }
        };
        loop {
            self.check()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            futex::wait_timeout(&self.inner.state, 0, remaining);
        }
    }

    /// Registers `target` to be woken when the token is cancelled.
    /// Targets that have since been dropped are pruned here.
    ///
    /// Must not be called while holding a lock `wake` itself takes.
    pub(crate) fn on_cancel(&self, target: Weak<dyn Wake>) {
        let mut hooks = self.inner.hooks.lock();
        // Past cancel(): waiters check the flag before they sleep.
        if self.is_cancelled() {
            return;
        }
        hooks.retain(|hook| hook.strong_count() > 0);
        hooks.push(target);
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[test]
fn sleep_runs_to_completion() {
    let token = CancelToken::new();
    let start = Instant::now();
    assert_eq!(token.sleep(Duration::from_millis(30)), Ok(()));
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn cancel_interrupts_sleep() {
    use std::thread;

    let token = CancelToken::new();
    let start = Instant::now();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        assert_eq!(
            token.sleep(Duration::from_secs(30)),
            Err(BufferError::Cancelled)
        );
    });

    assert!(start.elapsed() < Duration::from_secs(10));
}

#[cfg(test)]
struct CountWakes(std::sync::atomic::AtomicUsize);

#[cfg(test)]
impl Wake for CountWakes {
    fn wake(&self) {
        self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[test]
fn cancel_is_idempotent_and_wakes_hooks_once() {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::Relaxed;

    let token = CancelToken::new();
    let calls = Arc::new(CountWakes(AtomicUsize::new(0)));
    let target: Weak<dyn Wake> = Arc::downgrade(&calls) as Weak<CountWakes>;
    token.on_cancel(target);

    let clone = token.clone();
    clone.cancel();
    token.cancel();

    assert!(token.is_cancelled());
    assert_eq!(calls.0.load(Relaxed), 1);
    assert_eq!(token.check(), Err(BufferError::Cancelled));
    assert_eq!(token.sleep(Duration::ZERO), Err(BufferError::Cancelled));
}

#[test]
fn dropped_hooks_are_pruned_on_registration() {
    use std::sync::atomic::AtomicUsize;

    let token = CancelToken::new();
    for _ in 0..100 {
        let gone = Arc::new(CountWakes(AtomicUsize::new(0)));
        let target: Weak<dyn Wake> = Arc::downgrade(&gone) as Weak<CountWakes>;
        token.on_cancel(target);
    }

    let live = Arc::new(CountWakes(AtomicUsize::new(0)));
    let target: Weak<dyn Wake> = Arc::downgrade(&live) as Weak<CountWakes>;
    token.on_cancel(target);

    assert_eq!(token.inner.hooks.lock().len(), 1);
}

#[test]
fn unrepresentable_sleep_waits_for_cancel() {
    use std::thread;

    let cancelled = CancelToken::new();
    cancelled.cancel();
    assert_eq!(cancelled.sleep(Duration::MAX), Err(BufferError::Cancelled));

    let token = CancelToken::new();
    thread::scope(|s| {
        let sleeper = s.spawn(|| token.sleep(Duration::MAX));
        thread::sleep(Duration::from_millis(50));
        assert!(!sleeper.is_finished());
        token.cancel();
        assert_eq!(sleeper.join().unwrap(), Err(BufferError::Cancelled));
    });
}
