//! Named rate-limit buckets and the in-process engine that enforces them.
//!
//! State lives in memory per (bucket, key). Nothing is persisted: a restart
//! hands everyone a full bucket. Entries that have refilled or whose window
//! has closed are swept out, so callers rotating keys cannot grow the map.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Continuous refill of `rate` tokens per `period`, holding at most `capacity`.
    TokenBucket,
    /// `capacity` units per `period`-long window, starting at first use.
    FixedWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub name: &'static str,
    pub algorithm: Algorithm,
    pub rate: u32,
    pub period: Duration,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    CreateTask,
    UpdateTask,
    DeleteTask,
    SignUp,
}

pub const CREATE_TASK: BucketConfig = BucketConfig {
    name: "createTask",
    algorithm: Algorithm::TokenBucket,
    rate: 20,
    period: MINUTE,
    capacity: 5,
};

pub const UPDATE_TASK: BucketConfig = BucketConfig {
    name: "updateTask",
    algorithm: Algorithm::TokenBucket,
    rate: 30,
    period: MINUTE,
    capacity: 10,
};

pub const DELETE_TASK: BucketConfig = BucketConfig {
    name: "deleteTask",
    algorithm: Algorithm::TokenBucket,
    rate: 20,
    period: MINUTE,
    capacity: 5,
};

pub const SIGN_UP: BucketConfig = BucketConfig {
    name: "signUp",
    algorithm: Algorithm::FixedWindow,
    rate: 5,
    period: HOUR,
    capacity: 5,
};

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::CreateTask, Bucket::UpdateTask, Bucket::DeleteTask, Bucket::SignUp];

    pub fn config(self) -> BucketConfig {
        match self {
            Bucket::CreateTask => CREATE_TASK,
            Bucket::UpdateTask => UPDATE_TASK,
            Bucket::DeleteTask => DELETE_TASK,
            Bucket::SignUp => SIGN_UP,
        }
    }
}

/// Bucket exhausted. `retry_after` is how long until one unit is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

impl RateLimited {
    /// Whole seconds, rounded up, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let secs = if self.retry_after.subsec_nanos() > 0 { secs + 1 } else { secs };
        secs.max(1)
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Tokens { available: f64, refreshed: Instant },
    Window { started: Instant, used: u32 },
}

/// A sweep runs once the map reaches this many entries, or after `SWEEP_INTERVAL`.
const SWEEP_THRESHOLD: usize = 1024;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Entries {
    map: HashMap<(Bucket, String), State>,
    last_sweep: Option<Instant>,
    sweep_at_len: usize,
}

#[derive(Default)]
pub struct RateLimiter {
    state: Mutex<Entries>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one unit from `bucket` for `key`.
    pub fn limit(&self, bucket: Bucket, key: &str) -> Result<(), RateLimited> {
        self.limit_at(bucket, key, Instant::now())
    }

    /// Same as `limit`, against an explicit clock reading.
    pub fn limit_at(&self, bucket: Bucket, key: &str, now: Instant) -> Result<(), RateLimited> {
        let config = bucket.config();
        let mut entries = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.sweep_if_due(now);

        let entry = entries
            .map
            .entry((bucket, key.to_string()))
            .or_insert_with(|| initial_state(&config, now));

        let result = match entry {
            State::Tokens { available, refreshed } => {
                take_token(&config, available, refreshed, now)
            }
            State::Window { started, used } => take_from_window(&config, started, used, now),
        };

        if let Err(limited) = &result {
            tracing::debug!(
                bucket = config.name,
                key,
                retry_after_ms = limited.retry_after.as_millis() as u64,
                "rate limited"
            );
        }
        result
    }
}

impl Entries {
    fn sweep_if_due(&mut self, now: Instant) {
        let last = *self.last_sweep.get_or_insert(now);
        let by_size = self.map.len() >= self.sweep_at_len.max(SWEEP_THRESHOLD);
        let by_time = now.saturating_duration_since(last) >= SWEEP_INTERVAL;
        if !by_size && !by_time {
            return;
        }

        let before = self.map.len();
        self.map.retain(|(bucket, _), state| !is_idle(&bucket.config(), state, now));
        self.last_sweep = Some(now);
        // keys still live after a sweep push the next size trigger out
        self.sweep_at_len = self.map.len() * 2;
        tracing::trace!(before, after = self.map.len(), "rate limiter swept");
    }
}

/// An idle entry behaves exactly like a missing one, so it can be dropped.
fn is_idle(config: &BucketConfig, state: &State, now: Instant) -> bool {
    match *state {
        State::Tokens { available, refreshed } => {
            let elapsed = now.saturating_duration_since(refreshed).as_secs_f64();
            let refilled = available + elapsed * f64::from(config.rate) / config.period.as_secs_f64();
            refilled >= f64::from(config.capacity)
        }
        State::Window { started, .. } => now.saturating_duration_since(started) >= config.period,
    }
}

fn initial_state(config: &BucketConfig, now: Instant) -> State {
    match config.algorithm {
        Algorithm::TokenBucket => State::Tokens {
            available: f64::from(config.capacity),
            refreshed: now,
        },
        Algorithm::FixedWindow => State::Window { started: now, used: 0 },
    }
}

fn take_token(
    config: &BucketConfig,
    available: &mut f64,
    refreshed: &mut Instant,
    now: Instant,
) -> Result<(), RateLimited> {
    let rate = f64::from(config.rate);
    let period = config.period.as_secs_f64();
    // Instants from a caller may run behind the stored one; treat that as no time passing.
    let elapsed = now.saturating_duration_since(*refreshed).as_secs_f64();
    *available = (*available + elapsed * rate / period).min(f64::from(config.capacity));
    if now > *refreshed {
        *refreshed = now;
    }

    if *available >= 1.0 {
        *available -= 1.0;
        return Ok(());
    }

    let missing = 1.0 - *available;
    Err(RateLimited {
        retry_after: Duration::from_secs_f64(missing * period / rate),
    })
}

fn take_from_window(
    config: &BucketConfig,
    started: &mut Instant,
    used: &mut u32,
    now: Instant,
) -> Result<(), RateLimited> {
    let elapsed = now.saturating_duration_since(*started);
    if elapsed >= config.period {
        // skip ahead by whole windows so boundaries stay aligned to the first use
        let windows = (elapsed.as_nanos() / config.period.as_nanos()) as u32;
        *started += config.period * windows;
        *used = 0;
    }

    if *used < config.capacity {
        *used += 1;
        return Ok(());
    }

    Err(RateLimited {
        retry_after: (*started + config.period).saturating_duration_since(now),
    })
}
