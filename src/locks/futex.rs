use std::sync::atomic::AtomicU32;
use std::time::Duration;

pub use atomic_wait::{wait, wake_all, wake_one};

/// Blocks while `a` still holds `expected`, for at most `timeout`.
///
/// Like [`wait`] this may return early without the value changing, so
/// callers re-check their condition in a loop.
#[cfg(target_os = "linux")]
pub fn wait_timeout(a: &AtomicU32, expected: u32, timeout: Duration) {
    // FUTEX_WAIT takes a relative timeout. Clamp so tv_sec fits on 32-bit targets.
    let timeout = libc::timespec {
        tv_sec: timeout.as_secs().min(i32::MAX as u64) as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as _,
    };

    // Refer to the futex (2) man page for the syscall signature.
    // atomic-wait uses the private variant, so wake_one / wake_all reach us.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            a as *const AtomicU32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            &timeout as *const libc::timespec,
        );
    }
}

/// Portable fallback: poll in short sleeps until the value changes or time is up.
#[cfg(not(target_os = "linux"))]
pub fn wait_timeout(a: &AtomicU32, expected: u32, timeout: Duration) {
    use std::sync::atomic::Ordering::Relaxed;
    use std::time::Instant;

    const SLICE: Duration = Duration::from_millis(1);

    let deadline = Instant::now() + timeout;
    while a.load(Relaxed) == expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(SLICE));
    }
}

#[test]
fn wait_timeout_gives_up() {
    use std::time::Instant;

    let a = AtomicU32::new(0);
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(50) {
        wait_timeout(&a, 0, Duration::from_millis(50));
    }
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn wait_timeout_returns_on_wake() {
    use std::sync::atomic::Ordering::Relaxed;
    use std::thread;
    use std::time::Instant;

    let a = AtomicU32::new(0);
    let start = Instant::now();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            a.store(1, Relaxed);
            wake_all(&a);
        });

        while a.load(Relaxed) == 0 {
            wait_timeout(&a, 0, Duration::from_secs(10));
        }
    });

    // Woken by the store, nowhere near the ten second timeout.
    assert!(start.elapsed() < Duration::from_secs(5));
}
