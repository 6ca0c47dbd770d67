//! Process-wide OS audio-client activation lock (§4.B/§9).
//!
//! Grounded in the original capture implementation's `static std::mutex
//! g_wasapiMutex`: WASAPI (and, empirically, several other platform audio
//! stacks) misbehaves when `Initialize`/`Start` run concurrently on two
//! clients, so every crate that builds a cpal device/stream serializes
//! through this single lock rather than each keeping its own. It lives
//! here, not in `engine_platform` or `engine_sinks`, because those two
//! crates share no dependency edge and `engine_format` is the one crate
//! both already depend on.

use std::sync::{Mutex, OnceLock, TryLockError};
use std::time::{Duration, Instant};

static ACTIVATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Default bound on how long a caller waits to acquire the lock before
/// giving up (§9: "bounded wait (default 5s)").
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run `f` with the process-wide activation lock held, polling for up to
/// `timeout` to acquire it. `std::sync::Mutex` has no timed-lock
/// primitive, so the wait is a bounded poll loop rather than a blocking
/// acquire. Returns `Err(timeout)` if the lock never freed up in time.
pub fn with_activation_lock<T>(timeout: Duration, f: impl FnOnce() -> T) -> Result<T, Duration> {
    let lock = ACTIVATION_LOCK.get_or_init(|| Mutex::new(()));
    let deadline = Instant::now() + timeout;
    loop {
        match lock.try_lock() {
            Ok(guard) => {
                let result = f();
                drop(guard);
                return Ok(result);
            }
            // A prior activation panicked while holding the lock. Proceed
            // rather than wedging every future activation attempt.
            Err(TryLockError::Poisoned(poisoned)) => {
                drop(poisoned.into_inner());
                let result = f();
                return Ok(result);
            }
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(timeout);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_closure_and_returns_its_value() {
        let result = with_activation_lock(Duration::from_millis(100), || 42);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_serializes_concurrent_callers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                with_activation_lock(Duration::from_secs(1), || {
                    let before = counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    assert_eq!(counter.load(Ordering::SeqCst), before + 1);
                })
            }));
        }
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }
}
