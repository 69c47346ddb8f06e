//! Keyed single-flight cache
//!
//! [`CoalescingCache`] memoizes successful computations by string key. When
//! several callers ask for the same missing key at once, exactly one of them
//! (the leader) runs the compute function; the others block until the leader
//! finishes and receive a clone of its result. Failed computations are handed
//! to the waiters of that flight and then forgotten, so the next caller
//! retries.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

/// Boxed error produced by a compute function.
pub type ComputeError = Box<dyn std::error::Error + Send + Sync>;

/// Cache errors.
///
/// Cloneable so a single failure can be delivered to every waiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("{0}")]
    Compute(Arc<dyn std::error::Error + Send + Sync>),

    #[error("computation for key was abandoned")]
    Abandoned,
}

impl CacheError {
    /// Wrap a compute failure.
    pub fn compute(err: impl Into<ComputeError>) -> Self {
        CacheError::Compute(Arc::from(err.into()))
    }
}

/// Keyed cache with compute-on-miss semantics.
pub trait Cache<V>: Send + Sync {
    /// Return the cached value for `key`, computing and storing it if absent.
    ///
    /// Errors from `compute` are returned but never stored.
    fn get_or_set(
        &self,
        key: &str,
        compute: &mut dyn FnMut() -> Result<V, ComputeError>,
    ) -> Result<V, CacheError>;
}

impl<V, T: Cache<V> + ?Sized> Cache<V> for Arc<T> {
    fn get_or_set(
        &self,
        key: &str,
        compute: &mut dyn FnMut() -> Result<V, ComputeError>,
    ) -> Result<V, CacheError> {
        (**self).get_or_set(key, compute)
    }
}

type FlightResult<V> = Result<V, CacheError>;

struct Flight<V> {
    result: Mutex<Option<FlightResult<V>>>,
    done: Condvar,
}

impl<V: Clone> Flight<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, result: FlightResult<V>) {
        let mut slot = lock(&self.result);
        *slot = Some(result);
        self.done.notify_all();
    }

    fn wait(&self) -> FlightResult<V> {
        let mut slot = lock(&self.result);
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self
                .done
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

enum Slot<V> {
    Ready(V),
    InFlight(Arc<Flight<V>>),
}

/// In-memory single-flight cache.
pub struct CoalescingCache<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
}

impl<V: Clone> Default for CoalescingCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> CoalescingCache<V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a completed value is stored for `key`.
    pub fn contains(&self, key: &str) -> bool {
        matches!(lock(&self.slots).get(key), Some(Slot::Ready(_)))
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the completed value for `key`. In-flight computations are left alone.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slots = lock(&self.slots);
        if matches!(slots.get(key), Some(Slot::Ready(_))) {
            slots.remove(key);
            true
        } else {
            false
        }
    }

    fn finish(&self, key: &str, flight: &Arc<Flight<V>>, result: FlightResult<V>) {
        {
            let mut slots = lock(&self.slots);
            let ours = matches!(slots.get(key), Some(Slot::InFlight(f)) if Arc::ptr_eq(f, flight));
            if ours {
                match &result {
                    Ok(value) => {
                        slots.insert(key.to_string(), Slot::Ready(value.clone()));
                    }
                    Err(_) => {
                        slots.remove(key);
                    }
                }
            }
        }
        flight.complete(result);
    }
}

impl<V: Clone + Send + Sync> CoalescingCache<V> {
    /// Typed convenience wrapper around [`Cache::get_or_set`].
    pub fn get_or_insert_with<F, E>(&self, key: &str, compute: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Result<V, E>,
        E: Into<ComputeError>,
    {
        let mut compute = Some(compute);
        let mut erased = || match compute.take() {
            Some(f) => f().map_err(Into::into),
            None => Err(ComputeError::from("compute function invoked twice")),
        };
        self.get_or_set(key, &mut erased)
    }
}

impl<V: Clone + Send + Sync> Cache<V> for CoalescingCache<V> {
    fn get_or_set(
        &self,
        key: &str,
        compute: &mut dyn FnMut() -> Result<V, ComputeError>,
    ) -> Result<V, CacheError> {
        let flight = {
            let mut slots = lock(&self.slots);
            match slots.get(key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::InFlight(flight)) => {
                    let flight = Arc::clone(flight);
                    drop(slots);
                    debug!(key, "waiting on in-flight computation");
                    return flight.wait();
                }
                None => {
                    let flight = Arc::new(Flight::new());
                    slots.insert(key.to_string(), Slot::InFlight(Arc::clone(&flight)));
                    flight
                }
            }
        };

        let mut guard = LeaderGuard {
            cache: self,
            key,
            flight: &flight,
            finished: false,
        };
        let result = compute().map_err(CacheError::compute);
        guard.finished = true;
        self.finish(key, &flight, result.clone());
        result
    }
}

/// Completes the flight with [`CacheError::Abandoned`] if the leader unwinds.
struct LeaderGuard<'a, V: Clone> {
    cache: &'a CoalescingCache<V>,
    key: &'a str,
    flight: &'a Arc<Flight<V>>,
    finished: bool,
}

impl<V: Clone> Drop for LeaderGuard<'_, V> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache
                .finish(self.key, self.flight, Err(CacheError::Abandoned));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
