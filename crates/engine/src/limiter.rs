//! Adaptive concurrency limiter.
//!
//! A counting semaphore whose limit can be changed while waiters are
//! blocked. Lowering the limit never preempts in-flight work; it only
//! stalls new admissions until releases catch up.

use std::sync::{Condvar, Mutex};

#[derive(Debug)]
struct LimiterState {
    limit: usize,
    active: usize,
}

/// Controls the number of concurrent workers and allows adjusting the
/// limit at runtime.
#[derive(Debug)]
pub struct AdaptiveLimiter {
    state: Mutex<LimiterState>,
    cond: Condvar,
}

impl AdaptiveLimiter {
    /// Create a limiter with the provided initial limit (floored at 1).
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                limit: limit.max(1),
                active: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until a worker slot is available, then take it.
    pub fn acquire(&self) {
        let mut state = self.state.lock().unwrap();
        while state.active >= state.limit {
            state = self.cond.wait(state).unwrap();
        }
        state.active += 1;
    }

    /// Free a worker slot and wake one waiter.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        if state.active > 0 {
            state.active -= 1;
        }
        self.cond.notify_one();
    }

    /// Update the maximum number of concurrent workers (floored at 1).
    ///
    /// An increase wakes every waiter so the freed slots fill immediately;
    /// a decrease signals one so the queue keeps draining as releases come
    /// in.
    pub fn set_limit(&self, limit: usize) {
        let limit = limit.max(1);
        let mut state = self.state.lock().unwrap();
        let previous = state.limit;
        state.limit = limit;
        drop(state);

        if limit > previous {
            self.cond.notify_all();
        } else {
            self.cond.notify_one();
        }
    }

    /// Current maximum number of workers.
    pub fn limit(&self) -> usize {
        self.state.lock().unwrap().limit
    }

    /// Number of workers currently holding a slot.
    pub fn active(&self) -> usize {
        self.state.lock().unwrap().active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_initial_limit_floored_at_one() {
        let limiter = AdaptiveLimiter::new(0);
        assert_eq!(limiter.limit(), 1);
    }

    #[test]
    fn test_acquire_release_counts() {
        let limiter = AdaptiveLimiter::new(2);
        limiter.acquire();
        limiter.acquire();
        assert_eq!(limiter.active(), 2);

        limiter.release();
        assert_eq!(limiter.active(), 1);
        limiter.release();
        assert_eq!(limiter.active(), 0);

        // Releasing below zero is a no-op
        limiter.release();
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn test_acquire_blocks_at_limit() {
        let limiter = Arc::new(AdaptiveLimiter::new(1));
        limiter.acquire();

        let acquired = Arc::new(AtomicUsize::new(0));
        let l = limiter.clone();
        let a = acquired.clone();
        let handle = thread::spawn(move || {
            l.acquire();
            a.store(1, Ordering::SeqCst);
            l.release();
        });

        // The second acquire must not proceed while the slot is held
        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        limiter.release();
        assert!(wait_until(1000, || acquired.load(Ordering::SeqCst) == 1));
        handle.join().unwrap();
    }

    #[test]
    fn test_lowering_limit_stalls_new_admissions() {
        let limiter = Arc::new(AdaptiveLimiter::new(3));
        limiter.acquire();
        limiter.acquire();
        limiter.acquire();

        // Lowering below active never preempts in-flight work
        limiter.set_limit(1);
        assert_eq!(limiter.active(), 3);

        let admitted = Arc::new(AtomicUsize::new(0));
        let l = limiter.clone();
        let a = admitted.clone();
        let handle = thread::spawn(move || {
            l.acquire();
            a.fetch_add(1, Ordering::SeqCst);
        });

        // One release leaves active=2 >= limit=1, still no admission
        limiter.release();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        // Two more releases bring active below the limit
        limiter.release();
        limiter.release();
        assert!(wait_until(1000, || admitted.load(Ordering::SeqCst) == 1));
        handle.join().unwrap();
    }

    // After SetLimit(k) with n > k waiters, exactly k acquirers run; raising
    // the limit later wakes the rest.
    #[test]
    fn test_fairness_under_mutation() {
        let limiter = Arc::new(AdaptiveLimiter::new(1));
        limiter.acquire(); // saturate so all spawned threads queue up

        let admitted = Arc::new(AtomicUsize::new(0));
        let n = 5;
        let mut handles = Vec::new();
        for _ in 0..n {
            let l = limiter.clone();
            let a = admitted.clone();
            handles.push(thread::spawn(move || {
                l.acquire();
                a.fetch_add(1, Ordering::SeqCst);
                // Hold the slot until the end of the test
                thread::sleep(Duration::from_millis(400));
                l.release();
            }));
        }

        thread::sleep(Duration::from_millis(50));
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        // Open k=3 slots: exactly 2 more waiters may enter (1 already active)
        limiter.set_limit(3);
        limiter.release();
        assert!(wait_until(1000, || admitted.load(Ordering::SeqCst) == 3));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(admitted.load(Ordering::SeqCst), 3);

        // Raising the limit wakes the remaining waiters
        limiter.set_limit(n + 1);
        assert!(wait_until(2000, || admitted.load(Ordering::SeqCst) == n));

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_set_limit_floors_at_one() {
        let limiter = AdaptiveLimiter::new(4);
        limiter.set_limit(0);
        assert_eq!(limiter.limit(), 1);
    }
}
