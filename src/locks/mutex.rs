use super::futex::{wait, wake_one};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

/// A futex mutex. There is no poisoning: a panic while holding the
/// guard simply unlocks it on unwind.
pub struct Mutex<T> {
    /// 0: unlocked
    /// 1: locked, no other threads waiting
    /// 2: locked, other threads waiting
    state: AtomicU32,
    value: UnsafeCell<T>,
}

unsafe impl<T> Sync for Mutex<T> where T: Send {}

pub struct MutexGuard<'a, T> {
    // The condvar needs to unlock and relock the mutex behind a guard,
    // so it is visible to the rest of the locks module.
    pub(super) mutex: &'a Mutex<T>,
}

unsafe impl<T> Sync for MutexGuard<'_, T> where T: Sync {}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicU32::new(0),
            value: UnsafeCell::new(value),
        }
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        if self.state.compare_exchange(0, 1, Acquire, Relaxed).is_err() {
            lock_contended(&self.state);
        }
        MutexGuard { mutex: self }
    }

    /// Takes the lock only if nobody holds it. Never spins or sleeps.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.state
            .compare_exchange(0, 1, Acquire, Relaxed)
            .ok()
            .map(|_| MutexGuard { mutex: self })
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Locking here would deadlock a thread that formats a mutex it holds.
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(guard) => d.field("value", &*guard),
            None => d.field("value", &format_args!("<locked>")),
        };
        d.finish()
    }
}

#[cold]
fn lock_contended(state: &AtomicU32) {
    let mut spin_count = 0;

    // We spin on a plain load first instead of retrying compare_exchange.
    // A compare_exchange needs the cache line exclusively and steals it from
    // the core that holds the lock, while a load can share it. So we watch
    // the state cheaply and only try to grab it once it looks free.
    //
    // We only spin while the state is 1 (locked, nobody sleeping). If it is
    // already 2 then some other thread already spun, gave up and went to
    // the kernel, so spinning again is unlikely to help and we go straight
    // to the syscall.
    //
    // 100 iterations is not a magic number. It depends on the platform and
    // the OS, and it is roughly what std used on Linux. The bet is that most
    // critical sections are short, like the buffer's push/pop, and the holder
    // is about to let go.
    while state.load(Relaxed) == 1 && spin_count < 100 {
        spin_count += 1;
        std::hint::spin_loop();
    }

    if state.compare_exchange(0, 1, Acquire, Relaxed).is_ok() {
        return;
    }

    // From here on we take the lock in the contended state (2), even if we
    // end up being the only waiter. The price is one possibly useless
    // wake_one on unlock. The alternative is that the unlocking side sees 1,
    // skips the wake, and we sleep forever.
    //
    // Acquire on the swap pairs with the Release swap in the guard's drop,
    // so everything the previous holder wrote to the value is visible once
    // we get out of this loop.
    while state.swap(2, Acquire) != 0 {
        wait(state, 2);
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if self.mutex.state.swap(0, Release) == 2 {
            wake_one(&self.mutex.state);
        }
    }
}

#[test]
fn uncontended_lock_unlock() {
    let m = Mutex::new(0);
    std::hint::black_box(&m);

    for _ in 0..100_000 {
        *m.lock() += 1;
    }
    assert_eq!(m.into_inner(), 100_000);
}

#[test]
fn try_lock_fails_while_held_and_debug_does_not_block() {
    let m = Mutex::new(5);

    let guard = m.try_lock().unwrap();
    assert!(m.try_lock().is_none());
    assert_eq!(format!("{m:?}"), "Mutex { value: <locked> }");
    drop(guard);

    assert_eq!(format!("{m:?}"), "Mutex { value: 5 }");
    *m.try_lock().unwrap() += 1;
    assert_eq!(*m.lock(), 6);
}

#[test]
fn contended_increments_are_not_lost() {
    use std::thread;

    let m = Mutex::new(0);
    std::hint::black_box(&m);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..200_000 {
                    *m.lock() += 1;
                }
            });
        }
    });

    let value = *m.lock();
    assert!(value == 200_000 * 4, "value = {}", value);
}
