//! Single-flight with a debounce window
//!
//! At most one computation runs at a time. Callers arriving while it runs
//! wait for it and share its result; callers arriving within `wait` after it
//! finished get the cached result. Expiry is checked on access, there is no
//! background timer.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct State<T> {
    /// Last published result and when it was computed
    cached: Option<(T, Instant)>,
    /// Result of the most recent completed computation, for its waiters
    last: Option<T>,
    in_flight: bool,
    /// Completed computations so far
    completed: u64,
    /// Bumped by `reset`; results of older computations are not cached
    generation: u64,
}

pub struct Single<T: Clone> {
    wait: Duration,
    state: Mutex<State<T>>,
    done: Condvar,
}

impl<T: Clone> Single<T> {
    pub fn new(wait: Duration) -> Self {
        Single {
            wait,
            state: Mutex::new(State {
                cached: None,
                last: None,
                in_flight: false,
                completed: 0,
                generation: 0,
            }),
            done: Condvar::new(),
        }
    }

    /// Run `f` or share a recent or in-flight result
    ///
    /// The flag is true when the value came from another call.
    pub fn run<F>(&self, f: F) -> (T, bool)
    where
        F: FnOnce() -> T,
    {
        let mut state = self.state.lock();
        loop {
            if let Some((value, at)) = &state.cached {
                if at.elapsed() < self.wait {
                    return (value.clone(), true);
                }
            }
            if !state.in_flight {
                break;
            }

            let seen = state.completed;
            while state.in_flight && state.completed == seen {
                self.done.wait(&mut state);
            }
            if state.completed != seen {
                if let Some(value) = &state.last {
                    return (value.clone(), true);
                }
            }
            // The computation we waited for panicked; try again
        }

        state.in_flight = true;
        let generation = state.generation;
        drop(state);

        let mut flight = Flight {
            single: self,
            landed: false,
        };
        let value = f();
        flight.landed = true;

        let mut state = self.state.lock();
        state.in_flight = false;
        state.completed += 1;
        state.last = Some(value.clone());
        if state.generation == generation {
            state.cached = Some((value.clone(), Instant::now()));
        }
        drop(state);
        self.done.notify_all();

        (value, false)
    }

    /// Drop the cached result; the next call recomputes
    ///
    /// A computation already running is still shared with its waiters but
    /// is not cached.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.cached = None;
        state.generation += 1;
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }
}

/// Clears `in_flight` if the computation unwinds
struct Flight<'a, T: Clone> {
    single: &'a Single<T>,
    landed: bool,
}

impl<T: Clone> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        if !self.landed {
            self.single.state.lock().in_flight = false;
            self.single.done.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_cached_within_window() {
        let single = Single::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let compute = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        assert_eq!(single.run(compute), (1, false));
        assert_eq!(single.run(compute), (1, true));
        assert_eq!(single.run(compute), (1, true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_window_recomputes() {
        let single = Single::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        let compute = || calls.fetch_add(1, Ordering::SeqCst) + 1;

        assert_eq!(single.run(compute).0, 1);
        assert_eq!(single.run(compute).0, 2);
    }

    #[test]
    fn test_reset() {
        let single = Single::new(Duration::from_secs(60));
        assert_eq!(single.run(|| "old"), ("old", false));
        single.reset();
        assert_eq!(single.run(|| "new"), ("new", false));
        assert_eq!(single.run(|| "newer"), ("new", true));
    }

    #[test]
    fn test_concurrent_callers_share_one_computation() {
        let single = Single::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<usize> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        single
                            .run(|| {
                                thread::sleep(Duration::from_millis(50));
                                calls.fetch_add(1, Ordering::SeqCst) + 1
                            })
                            .0
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|&r| r == 1));
    }

    #[test]
    fn test_waiters_get_in_flight_result_after_reset() {
        let single = Single::new(Duration::from_secs(60));
        let started = Barrier::new(2);

        thread::scope(|s| {
            let leader = s.spawn(|| {
                single.run(|| {
                    started.wait();
                    thread::sleep(Duration::from_millis(200));
                    1
                })
            });
            started.wait();
            single.reset();
            let follower = single.run(|| 2);
            assert_eq!(follower, (1, true));
            assert_eq!(leader.join().unwrap(), (1, false));
        });

        // Reset happened mid-flight, so nothing was cached
        assert_eq!(single.run(|| 3), (3, false));
    }

    #[test]
    fn test_panic_releases_waiters() {
        let single = Single::new(Duration::from_secs(60));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            single.run(|| -> u32 { panic!("boom") })
        }));
        assert!(result.is_err());
        assert_eq!(single.run(|| 7), (7, false));
    }
}
