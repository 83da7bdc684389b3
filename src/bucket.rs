//! Leaky bucket counter with lazy, retroactive drain
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::error::{LeakyError, Result};
use crate::settings::BucketSettings;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Everything the drain accounting reads and advances together.
/// Only ever touched while holding `Bucket::state`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BucketState {
    pub(crate) drain_by: i64,
    pub(crate) drain_interval: Duration,
    pub(crate) capacity: i64,
    pub(crate) last_drain: DateTime<Utc>,
}

/// A counter of accumulated load that leaks `drain_by` every `drain_interval`
/// and refuses to grow past `capacity`.
///
/// Draining is lazy: nothing happens in the background. Every reconciling
/// operation (`value`, `remaining`, `add`, `drain`) first accounts for all the
/// whole intervals that elapsed since the last drain, carrying the leftover
/// fraction of an interval forward so that many short observations add up to
/// the same result as one long one.
///
/// A `Bucket` is meant to be shared (e.g. behind an `Arc`); all methods take
/// `&self` and serialize through one internal lock. `peek` is the only read
/// that skips the lock.
pub struct Bucket {
    // Written only while `state` is held so it stays consistent with `last_drain`
    value: AtomicI64,
    state: Mutex<BucketState>,
}

impl Bucket {
    /// Create an empty bucket whose drain clock starts now.
    pub fn new(drain_by: i64, drain_interval: Duration, capacity: i64) -> Result<Self> {
        if drain_by <= 0 || drain_interval <= Duration::zero() {
            return Err(LeakyError::NeverDrains);
        }
        if capacity <= 0 {
            return Err(LeakyError::NeverFills);
        }
        Ok(Self::from_parts(
            BucketState {
                drain_by,
                drain_interval,
                capacity,
                last_drain: Utc::now(),
            },
            0,
        ))
    }

    pub fn from_settings(settings: &BucketSettings) -> Result<Self> {
        settings.validate()?;
        Self::new(
            settings.drain_by,
            settings.drain_interval(),
            settings.capacity,
        )
    }

    /// Assemble a bucket verbatim, without constructor validation.
    /// Used when restoring persisted state.
    pub(crate) fn from_parts(state: BucketState, value: i64) -> Self {
        Self {
            value: AtomicI64::new(value),
            state: Mutex::new(state),
        }
    }

    /// Every critical section leaves `BucketState` consistent before anything
    /// that could panic, so a poisoned lock is still safe to use.
    pub(crate) fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current value without draining first.
    ///
    /// Does not take the lock, so the result may be stale relative to a
    /// concurrent writer, and it never reflects time elapsed since the last
    /// reconciling call. You probably want [`Bucket::value`].
    pub fn peek(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Drain, then return the current value.
    pub fn value(&self) -> i64 {
        let mut state = self.lock();
        self.drain_locked(&mut state, Utc::now());
        self.value.load(Ordering::Acquire)
    }

    /// Drain, then return `capacity - value`.
    /// Negative when capacity was lowered below the current value.
    pub fn remaining(&self) -> i64 {
        let mut state = self.lock();
        self.drain_locked(&mut state, Utc::now());
        state
            .capacity
            .saturating_sub(self.value.load(Ordering::Acquire))
    }

    /// Drain, then add `amount` to the value.
    ///
    /// Only growth past capacity is rejected: a positive `amount` that would
    /// exceed `capacity` fails with [`LeakyError::Full`] and leaves the value
    /// untouched. A negative `amount` always succeeds and clamps at zero rather
    /// than reporting an underflow. A bucket pushed over capacity by
    /// reconfiguration can still shrink but cannot grow.
    pub fn add(&self, amount: i64) -> Result<()> {
        let mut state = self.lock();
        // Drain even for a zero amount; this is how elapsed time gets spent
        self.drain_locked(&mut state, Utc::now());
        if amount == 0 {
            return Ok(());
        }

        let new_value = self.value.load(Ordering::Acquire).saturating_add(amount);
        if amount > 0 && new_value > state.capacity {
            return Err(LeakyError::Full);
        }
        self.value.store(new_value.max(0), Ordering::Release);
        Ok(())
    }

    /// Same as `add(-amount)`: positive amounts shrink the value, negative ones
    /// grow it and may fail with [`LeakyError::Full`].
    pub fn drain(&self, amount: i64) -> Result<()> {
        self.add(amount.checked_neg().unwrap_or(i64::MAX))
    }

    /// Overwrite the value without draining first.
    ///
    /// With `reset_drain` the drain clock restarts now and any partial interval
    /// is forgotten; without it the pending schedule continues as if the value
    /// had always been `value`.
    pub fn set(&self, value: i64, reset_drain: bool) -> Result<()> {
        if value < 0 {
            return Err(LeakyError::NegativeValue);
        }

        let mut state = self.lock();
        if value > state.capacity {
            return Err(LeakyError::ExceedsCapacity {
                value,
                capacity: state.capacity,
            });
        }
        self.value.store(value, Ordering::Release);
        if reset_drain {
            state.last_drain = Utc::now();
        }
        Ok(())
    }

    /// Instant up to which drain has been accounted for
    pub fn last_drain(&self) -> DateTime<Utc> {
        self.lock().last_drain
    }

    pub fn drain_by(&self) -> i64 {
        self.lock().drain_by
    }

    pub fn drain_interval(&self) -> Duration {
        self.lock().drain_interval
    }

    pub fn capacity(&self) -> i64 {
        self.lock().capacity
    }

    /// Change how much leaks per interval. Takes effect at the next drain,
    /// including for time already elapsed.
    pub fn set_drain_by(&self, drain_by: i64) -> Result<()> {
        if drain_by <= 0 {
            return Err(LeakyError::NeverDrains);
        }
        self.lock().drain_by = drain_by;
        Ok(())
    }

    pub fn set_drain_interval(&self, drain_interval: Duration) -> Result<()> {
        if drain_interval <= Duration::zero() {
            return Err(LeakyError::NeverDrains);
        }
        self.lock().drain_interval = drain_interval;
        Ok(())
    }

    /// Change the ceiling. Lowering it below the current value is allowed;
    /// the bucket then refuses growth until it drains back under.
    pub fn set_capacity(&self, capacity: i64) -> Result<()> {
        if capacity <= 0 {
            return Err(LeakyError::NeverFills);
        }
        self.lock().capacity = capacity;
        Ok(())
    }

    /// Configuration snapshot, accepted as-is by [`Bucket::from_settings`].
    pub fn settings(&self) -> BucketSettings {
        let state = self.lock();
        BucketSettings::new(state.drain_by, state.drain_interval, state.capacity)
    }

    /// Reconcile elapsed time against the drain schedule.
    ///
    /// Only whole intervals leak. `last_drain` advances by exactly the
    /// accounted time, so the leftover fraction of an interval is still owed
    /// at the next call.
    fn drain_locked(&self, state: &mut BucketState, now: DateTime<Utc>) {
        if is_unset(&state.last_drain) {
            state.last_drain = now;
        }

        let value = self.value.load(Ordering::Acquire);
        if value <= 0 {
            // Nothing to account for, and no backlog should build while idle
            self.value.store(0, Ordering::Release);
            state.last_drain = now;
            return;
        }

        let interval = total_nanos(state.drain_interval).abs();
        if interval == 0 {
            return;
        }
        let elapsed = total_nanos(now - state.last_drain);
        let accounted = elapsed - elapsed % interval;
        let leaks = i64::try_from(accounted.abs() / interval).unwrap_or(i64::MAX);
        if leaks == 0 {
            return;
        }

        let new_value = value
            .saturating_sub(state.drain_by.saturating_mul(leaks))
            .max(0);
        self.value.store(new_value, Ordering::Release);

        let owed = from_nanos(elapsed - accounted);
        state.last_drain = now.checked_sub_signed(owed).unwrap_or(now);
        trace!(leaks, from = value, to = new_value, "drained bucket");
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Bucket")
            .field("drain_by", &state.drain_by)
            .field("drain_interval", &state.drain_interval)
            .field("capacity", &state.capacity)
            .field("value", &self.value.load(Ordering::Acquire))
            .field("last_drain", &state.last_drain)
            .finish()
    }
}

/// The Unix epoch stands in for "never drained"
fn is_unset(timestamp: &DateTime<Utc>) -> bool {
    timestamp.timestamp() == 0 && timestamp.timestamp_subsec_nanos() == 0
}

// num_nanoseconds() gives up past ~292 years; this doesn't
fn total_nanos(duration: Duration) -> i128 {
    i128::from(duration.num_seconds()) * NANOS_PER_SEC + i128::from(duration.subsec_nanos())
}

fn from_nanos(nanos: i128) -> Duration {
    // Only called with remainders smaller than one interval, which always fit
    let secs = i64::try_from(nanos / NANOS_PER_SEC)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(Duration::zero);
    secs + Duration::nanoseconds((nanos % NANOS_PER_SEC) as i64)
}
