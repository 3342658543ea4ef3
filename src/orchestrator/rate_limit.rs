//! Slot-based rate limiting with FIFO waiters
//!
//! A [`RateLimiter`] owns a pool of slots and a queue of callers waiting for
//! one. Slots come back either from a fixed periodic refill (for quotas the
//! upstream never reports) or from live [`RateLimitObservation`]s parsed out
//! of response headers. All pool state sits behind one mutex; no other code
//! touches the counter or the queue.
//!
//! A refill *replaces* the pool contents: the upstream window recycled, so
//! whatever was left of the previous window is gone and the new quota is `n`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::metrics;
use crate::orchestrator::config::OrchestratorConfig;

/// Rate limit state reported by the upstream with each response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitObservation {
    /// Slots per window
    pub limit: u64,
    /// Slots left in the current window
    pub remaining: u64,
    /// When the current window recycles
    pub reset: DateTime<Utc>,
}

impl RateLimitObservation {
    /// Create a new observation
    pub fn new(limit: u64, remaining: u64, reset: DateTime<Utc>) -> Self {
        Self {
            limit,
            remaining,
            reset,
        }
    }

    /// Time left until `reset`, zero when it already passed
    pub fn delay_until_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.reset - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Rate limiter errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// The pool was torn down while the caller was queued
    #[error("rate limiter '{0}' closed while waiting for a slot")]
    Closed(String),
}

/// Anything that hands out request slots
#[async_trait]
pub trait SlotSource: Send + Sync {
    /// Wait until one slot is granted to the caller
    async fn request_slot(&self) -> Result<(), RateLimitError>;
}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<()>,
}

struct SlotPool {
    available: u64,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    last_observation: Option<RateLimitObservation>,
    pending_refill: Option<JoinHandle<()>>,
}

impl SlotPool {
    fn new(initial: u64) -> Self {
        Self {
            available: initial,
            waiters: VecDeque::new(),
            next_waiter_id: 0,
            last_observation: None,
            pending_refill: None,
        }
    }

    /// An observation refill is scheduled and its task is still alive. A task
    /// lost with its runtime no longer counts.
    fn refill_pending(&self) -> bool {
        self.pending_refill
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn try_take(&mut self) -> bool {
        if self.available > 0 {
            self.available -= 1;
            true
        } else {
            false
        }
    }

    fn enqueue(&mut self) -> (u64, oneshot::Receiver<()>) {
        let (grant, receiver) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.waiters.push_back(Waiter { id, grant });
        (id, receiver)
    }

    /// Grant waiters FIFO from `n` fresh slots; the rest becomes `available`.
    /// Returns how many waiters were granted.
    fn refresh(&mut self, n: u64) -> u64 {
        let mut remaining = n;
        let mut granted = 0;
        while remaining > 0 {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            // A failed send means the waiter is gone; the slot stays in hand.
            if waiter.grant.send(()).is_ok() {
                remaining -= 1;
                granted += 1;
            }
        }
        self.available = remaining;
        granted
    }

    /// Hand one unused slot back: next waiter first, otherwise the counter.
    fn release(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                return;
            }
        }
        self.available += 1;
    }

    fn remove_waiter(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

struct Shared {
    name: String,
    pool: Mutex<SlotPool>,
}

impl Shared {
    fn refresh(&self, n: u64, source: &'static str) {
        self.refresh_with(n, source, |_| {});
    }

    /// Observation refill firing: the pending flag clears in the same
    /// critical section as the refill.
    fn refresh_observed(&self, n: u64) {
        self.refresh_with(n, "observation", |pool| pool.pending_refill = None);
    }

    fn refresh_with(&self, n: u64, source: &'static str, settle: impl FnOnce(&mut SlotPool)) {
        let (granted, available, queued) = {
            let mut pool = self.pool.lock();
            settle(&mut *pool);
            let granted = pool.refresh(n);
            (granted, pool.available, pool.waiters.len())
        };
        metrics::record_slots_refreshed(&self.name, source, n, granted);
        metrics::update_slot_gauges(&self.name, available, queued);
        trace!(
            limiter = %self.name,
            source,
            slots = n,
            granted,
            available,
            queued,
            "Slots refreshed"
        );
    }
}

/// Removes its queue entry if the waiting future is dropped before the grant
/// is observed, and hands back a grant that arrived but was never used.
struct QueuedWaiter<'a> {
    shared: &'a Shared,
    id: u64,
    receiver: oneshot::Receiver<()>,
    settled: bool,
}

impl QueuedWaiter<'_> {
    async fn wait(&mut self) -> Result<(), RateLimitError> {
        let result = (&mut self.receiver).await;
        self.settled = true;
        result.map_err(|_| RateLimitError::Closed(self.shared.name.clone()))
    }
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut pool = self.shared.pool.lock();
        if pool.remove_waiter(self.id) {
            debug!(limiter = %self.shared.name, waiter = self.id, "Abandoned slot request removed");
        } else if self.receiver.try_recv().is_ok() {
            pool.release();
            debug!(limiter = %self.shared.name, waiter = self.id, "Unused slot grant returned");
        }
    }
}

/// FIFO slot pool shared by every request against one quota
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Create a limiter holding `initial_slots`
    ///
    /// # Arguments
    /// * `name` - Label used in logs and metrics (e.g. "per_second")
    /// * `initial_slots` - Slots available before the first refill
    pub fn new(name: impl Into<String>, initial_slots: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                pool: Mutex::new(SlotPool::new(initial_slots)),
            }),
        }
    }

    /// Limiter label
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Wait for one slot.
    ///
    /// Completes immediately while slots are available, otherwise queues the
    /// caller behind every earlier waiter. Dropping the returned future while
    /// queued removes the caller from the queue.
    pub async fn request_slot(&self) -> Result<(), RateLimitError> {
        let started = Instant::now();
        let (id, receiver) = {
            let mut pool = self.shared.pool.lock();
            if pool.try_take() {
                drop(pool);
                metrics::record_slot_granted(&self.shared.name, started.elapsed(), false);
                return Ok(());
            }
            pool.enqueue()
        };

        trace!(limiter = %self.shared.name, waiter = id, "Waiting for slot");
        let mut waiter = QueuedWaiter {
            shared: &self.shared,
            id,
            receiver,
            settled: false,
        };
        waiter.wait().await?;
        metrics::record_slot_granted(&self.shared.name, started.elapsed(), true);
        Ok(())
    }

    /// Take a slot without waiting. Never drives the counter below zero.
    pub fn try_acquire(&self) -> bool {
        self.shared.pool.lock().try_take()
    }

    /// Make `n` slots available, granting queued waiters first in arrival order
    pub fn refresh_slots(&self, n: u64) {
        self.shared.refresh(n, "manual");
    }

    /// Feed an upstream observation.
    ///
    /// Ignored when its `reset` is not newer than the last accepted one, or
    /// while a previously scheduled refill is still pending. Otherwise a
    /// refill of `observation.limit` slots is scheduled for `reset`. Returns
    /// whether the observation was accepted.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn update(&self, observation: RateLimitObservation) -> bool {
        let delay = {
            let mut pool = self.shared.pool.lock();
            let stale = pool
                .last_observation
                .is_some_and(|last| observation.reset <= last.reset);
            if stale {
                drop(pool);
                metrics::record_observation(&self.shared.name, "stale");
                return false;
            }
            if pool.refill_pending() {
                drop(pool);
                metrics::record_observation(&self.shared.name, "refill_pending");
                return false;
            }
            pool.last_observation = Some(observation);
            let delay = observation.delay_until_reset(Utc::now());

            // Spawned under the lock so the task cannot clear the handle
            // before it is stored.
            let shared = Arc::downgrade(&self.shared);
            pool.pending_refill = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(shared) = shared.upgrade() {
                    shared.refresh_observed(observation.limit);
                }
            }));
            delay
        };

        metrics::record_observation(&self.shared.name, "accepted");
        debug!(
            limiter = %self.shared.name,
            limit = observation.limit,
            remaining = observation.remaining,
            refill_in_ms = delay.as_millis() as u64,
            "Scheduled refill from rate limit observation"
        );
        true
    }

    /// Safety net for a quota whose live feedback went missing.
    ///
    /// Refills when no observation was ever accepted, or when the last one's
    /// `reset` is older than `now - threshold`, using the last known limit or
    /// `fallback` when none is known. Does nothing while an observation refill
    /// is pending. Returns whether slots were refilled.
    pub fn refresh_undetermined_slots(&self, threshold: Duration, fallback: u64) -> bool {
        let mut pool = self.shared.pool.lock();
        if pool.refill_pending() {
            return false;
        }
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::zero());
        let count = match pool.last_observation {
            None => fallback,
            Some(last) if last.reset < cutoff => last.limit,
            Some(_) => return false,
        };
        let granted = pool.refresh(count);
        let (available, queued) = (pool.available, pool.waiters.len());
        drop(pool);

        metrics::record_slots_refreshed(&self.shared.name, "undetermined", count, granted);
        metrics::update_slot_gauges(&self.shared.name, available, queued);
        debug!(
            limiter = %self.shared.name,
            slots = count,
            "Refilled undetermined slots"
        );
        true
    }

    /// Refill `slots` every `period`, regardless of observations.
    ///
    /// The first refill happens immediately. Dropping the handle stops it.
    pub fn spawn_periodic_refill(&self, slots: u64, period: Duration) -> PeriodicRefill {
        let shared = Arc::downgrade(&self.shared);
        PeriodicRefill::spawn(period, move || match shared.upgrade() {
            Some(shared) => {
                shared.refresh(slots, "periodic");
                true
            }
            None => false,
        })
    }

    /// Run [`refresh_undetermined_slots`](Self::refresh_undetermined_slots)
    /// every `period`. Dropping the handle stops it.
    pub fn spawn_undetermined_watchdog(
        &self,
        period: Duration,
        threshold: Duration,
        fallback: u64,
    ) -> PeriodicRefill {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        PeriodicRefill::spawn(period, move || match shared.upgrade() {
            Some(shared) => {
                RateLimiter { shared }.refresh_undetermined_slots(threshold, fallback);
                true
            }
            None => false,
        })
    }

    /// Hand back a slot granted to a caller that never used it
    fn release_unused(&self) {
        self.shared.pool.lock().release();
        debug!(limiter = %self.shared.name, "Unused slot grant returned");
    }

    /// Slots currently available. Introspection only.
    pub fn available_slots(&self) -> u64 {
        self.shared.pool.lock().available
    }

    /// Callers currently queued. Introspection only.
    pub fn queued_waiters(&self) -> usize {
        self.shared.pool.lock().waiters.len()
    }

    /// Last accepted observation
    pub fn last_observation(&self) -> Option<RateLimitObservation> {
        self.shared.pool.lock().last_observation
    }

    /// Whether an observation refill is scheduled but has not fired yet
    pub fn is_refill_pending(&self) -> bool {
        self.shared.pool.lock().refill_pending()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pool = self.shared.pool.lock();
        f.debug_struct("RateLimiter")
            .field("name", &self.shared.name)
            .field("available", &pool.available)
            .field("queued", &pool.waiters.len())
            .field("refill_pending", &pool.refill_pending())
            .finish()
    }
}

#[async_trait]
impl SlotSource for RateLimiter {
    async fn request_slot(&self) -> Result<(), RateLimitError> {
        RateLimiter::request_slot(self).await
    }
}

/// Handle to a background refill timer; aborts the timer on drop
#[derive(Debug)]
pub struct PeriodicRefill {
    handle: JoinHandle<()>,
}

impl PeriodicRefill {
    fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick() {
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Whether the timer task is still alive. It dies with its runtime.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the timer
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PeriodicRefill {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Background refill attached to one of a gate's limiters
#[derive(Debug, Clone, Copy)]
enum GateTimer {
    Periodic {
        limiter: usize,
        slots: u64,
        period: Duration,
    },
    Watchdog {
        limiter: usize,
        period: Duration,
        threshold: Duration,
        fallback: u64,
    },
}

impl GateTimer {
    fn spawn(&self, limiters: &[RateLimiter]) -> Option<PeriodicRefill> {
        match *self {
            GateTimer::Periodic {
                limiter,
                slots,
                period,
            } => limiters
                .get(limiter)
                .map(|l| l.spawn_periodic_refill(slots, period)),
            GateTimer::Watchdog {
                limiter,
                period,
                threshold,
                fallback,
            } => limiters
                .get(limiter)
                .map(|l| l.spawn_undetermined_watchdog(period, threshold, fallback)),
        }
    }
}

/// Several quotas enforced together (e.g. per-second and per-hour).
///
/// A slot request takes one slot from every limiter, in order, so each
/// limiter keeps its own process-wide FIFO. A request abandoned part way
/// hands the slots it already holds back.
///
/// Refill timers start on the first slot request and are restarted on the
/// caller's runtime whenever the runtime that ran them has shut down, so one
/// gate can outlive the runtime that created it.
#[derive(Debug)]
pub struct QuotaGate {
    limiters: Vec<RateLimiter>,
    live: Option<RateLimiter>,
    plan: Vec<GateTimer>,
    timers: Mutex<Vec<PeriodicRefill>>,
}

impl QuotaGate {
    /// Gate over the given limiters, with no background timers
    pub fn new(limiters: Vec<RateLimiter>) -> Self {
        Self {
            limiters,
            live: None,
            plan: Vec::new(),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Standard two-level gate.
    ///
    /// - `per_second`: refilled every second with the safe per-second cap
    /// - `per_hour`: refilled from live observations, with the undetermined
    ///   watchdog falling back to the safe per-hour cap
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let per_second = RateLimiter::new("per_second", 0);
        let per_hour = RateLimiter::new("per_hour", 0);

        let plan = vec![
            GateTimer::Periodic {
                limiter: 0,
                slots: config.safe_requests_per_second(),
                period: Duration::from_secs(1),
            },
            GateTimer::Watchdog {
                limiter: 1,
                period: config.quota_watchdog_period,
                threshold: config.quota_stale_after,
                fallback: config.safe_requests_per_hour(),
            },
        ];

        Self {
            limiters: vec![per_second, per_hour.clone()],
            live: Some(per_hour),
            plan,
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Limiter that should receive upstream observations, if any
    pub fn live_limiter(&self) -> Option<&RateLimiter> {
        self.live.as_ref()
    }

    /// All limiters, in acquisition order
    pub fn limiters(&self) -> &[RateLimiter] {
        &self.limiters
    }

    /// Whether every refill timer is currently alive
    pub fn timers_running(&self) -> bool {
        let timers = self.timers.lock();
        timers.len() == self.plan.len() && timers.iter().all(PeriodicRefill::is_running)
    }

    /// (Re)start the refill timers on the current runtime if they are not
    /// running. Must be called from within a Tokio runtime.
    fn ensure_timers(&self) {
        if self.plan.is_empty() {
            return;
        }
        let mut timers = self.timers.lock();
        if timers.len() == self.plan.len() && timers.iter().all(PeriodicRefill::is_running) {
            return;
        }
        if !timers.is_empty() {
            debug!("Refill timers lost with their runtime, restarting");
        }
        *timers = self
            .plan
            .iter()
            .filter_map(|timer| timer.spawn(&self.limiters))
            .collect();
    }
}

/// Slots already taken from a gate's leading limiters. Dropped before
/// [`disarm`](Self::disarm), it returns them.
struct HeldSlots<'a> {
    limiters: &'a [RateLimiter],
    held: usize,
}

impl HeldSlots<'_> {
    fn disarm(mut self) {
        self.held = 0;
    }
}

impl Drop for HeldSlots<'_> {
    fn drop(&mut self) {
        for limiter in self.limiters[..self.held].iter().rev() {
            limiter.release_unused();
        }
    }
}

#[async_trait]
impl SlotSource for QuotaGate {
    async fn request_slot(&self) -> Result<(), RateLimitError> {
        self.ensure_timers();
        let mut held = HeldSlots {
            limiters: &self.limiters,
            held: 0,
        };
        for limiter in &self.limiters {
            limiter.request_slot().await?;
            held.held += 1;
        }
        held.disarm();
        Ok(())
    }
}
