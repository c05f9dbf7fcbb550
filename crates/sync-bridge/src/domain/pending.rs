//! Correlator - maps correlation IDs to callers waiting on a response event.
//!
//! Flow:
//! 1. Bridge calls `register()` and gets a [`WaitHandle`]
//! 2. Bridge publishes the command carrying the same id
//! 3. The response subscription handler calls `resolve()`
//! 4. Bridge awaits the handle with `wait()` until the deadline
//!
//! The waiter table is the only shared mutable state. Register, resolve and
//! eviction each touch a single entry atomically through the `DashMap` entry
//! API, so a response is delivered to at most one caller.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, BridgeResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Payload delivered to a waiter.
pub type ResponsePayload = serde_json::Value;

/// A registered caller waiting for its response.
struct Waiter {
    /// Single-use delivery slot
    sender: oneshot::Sender<ResponsePayload>,
    /// Distinguishes re-registrations of the same id
    generation: u64,
    created_at: Instant,
    deadline: Instant,
}

/// Counters for the correlator
#[derive(Debug, Default)]
pub struct CorrelatorStats {
    /// Waiters registered
    pub registered: AtomicU64,
    /// Responses delivered to a waiter
    pub resolved: AtomicU64,
    /// Waiters evicted at their deadline
    pub timed_out: AtomicU64,
    /// Waiters dropped by their caller before resolution
    pub cancelled: AtomicU64,
    /// Responses with no live waiter (late, unknown or duplicate)
    pub unmatched: AtomicU64,
}

/// Point-in-time view of the correlator, served on `/pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelatorSnapshot {
    pub pending: usize,
    pub registered: u64,
    pub resolved: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub unmatched: u64,
}

struct Inner {
    pending: DashMap<CorrelationId, Waiter>,
    default_timeout: Duration,
    next_generation: AtomicU64,
    stats: CorrelatorStats,
}

impl Inner {
    /// Remove the waiter for `id` only if it is still the one registered
    /// under `generation`.
    fn remove_generation(&self, id: &CorrelationId, generation: u64) -> bool {
        self.pending
            .remove_if(id, |_, waiter| waiter.generation == generation)
            .is_some()
    }
}

/// Waiter table for request/response correlation.
///
/// Cloning is cheap; all clones share one table.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<Inner>,
}

impl Correlator {
    /// Create a correlator whose plain `register` uses `default_timeout`.
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                default_timeout,
                next_generation: AtomicU64::new(0),
                stats: CorrelatorStats::default(),
            }),
        }
    }

    /// Default per-request timeout.
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Register a waiter for `id` expiring after the default timeout.
    pub fn register(&self, id: CorrelationId) -> BridgeResult<WaitHandle> {
        let deadline = Instant::now() + self.inner.default_timeout;
        self.register_with_deadline(id, deadline)
    }

    /// Register a waiter for `id` expiring at `deadline`.
    ///
    /// Fails with [`BridgeError::DuplicateCorrelation`] while another waiter
    /// is pending under the same id. The existing waiter is left untouched.
    pub fn register_with_deadline(
        &self,
        id: CorrelationId,
        deadline: Instant,
    ) -> BridgeResult<WaitHandle> {
        let (sender, receiver) = oneshot::channel();
        let registered_at = Instant::now();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.inner.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %id, "Rejected duplicate registration");
                return Err(BridgeError::DuplicateCorrelation(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(Waiter {
                    sender,
                    generation,
                    created_at: registered_at,
                    deadline,
                });
            }
        }
        self.inner.stats.registered.fetch_add(1, Ordering::Relaxed);

        debug!(correlation_id = %id, "Registered waiter");

        Ok(WaitHandle {
            id,
            generation,
            deadline,
            registered_at,
            receiver,
            inner: Arc::clone(&self.inner),
            settled: false,
        })
    }

    /// Deliver `payload` to the waiter registered under `id`.
    ///
    /// Returns `true` if a live waiter received it. Unknown, late and
    /// already-resolved ids return `false` and change nothing but counters.
    pub fn resolve(&self, id: &CorrelationId, payload: ResponsePayload) -> bool {
        let Some((_, waiter)) = self.inner.pending.remove(id) else {
            self.inner.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %id, "Response for unknown or expired correlation ID");
            return false;
        };

        let response_time = waiter.created_at.elapsed();
        match waiter.sender.send(payload) {
            Ok(()) => {
                self.inner.stats.resolved.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    response_time_ms = response_time.as_millis() as u64,
                    "Resolved waiter"
                );
                true
            }
            Err(_) => {
                // Caller went away between removal and delivery
                self.inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %id, "Waiter dropped before delivery");
                false
            }
        }
    }

    /// Suspend the calling task until the waiter is resolved or `deadline`
    /// passes.
    ///
    /// On timeout the waiter is evicted. If a resolver claimed the waiter
    /// first, its value is returned rather than lost.
    pub async fn wait(
        &self,
        mut handle: WaitHandle,
        deadline: Instant,
    ) -> BridgeResult<ResponsePayload> {
        let outcome = tokio::time::timeout_at(deadline, &mut handle.receiver).await;
        handle.settled = true;

        match outcome {
            Ok(Ok(payload)) => Ok(payload),
            // Slot dropped without a value: evicted by the sweeper or cancelled
            Ok(Err(_)) => Err(handle.timeout_error()),
            Err(_elapsed) => {
                if self.inner.remove_generation(&handle.id, handle.generation) {
                    self.inner.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                    debug!(correlation_id = %handle.id, "Waiter timed out");
                    return Err(handle.timeout_error());
                }
                // A resolver already removed the entry; its send is in flight.
                match (&mut handle.receiver).await {
                    Ok(payload) => {
                        debug!(correlation_id = %handle.id, "Response delivered at deadline");
                        Ok(payload)
                    }
                    Err(_) => Err(handle.timeout_error()),
                }
            }
        }
    }

    /// Remove every waiter whose deadline has passed.
    ///
    /// Returns the number of waiters removed. Their callers observe a timeout.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.inner.pending.retain(|id, waiter| {
            if waiter.deadline > now {
                return true;
            }
            warn!(
                correlation_id = %id,
                elapsed_ms = now.duration_since(waiter.created_at).as_millis() as u64,
                "Evicting expired waiter"
            );
            removed += 1;
            false
        });

        self.inner
            .stats
            .timed_out
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Drop the waiter for `id` without delivering anything.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        if self.inner.pending.remove(id).is_some() {
            self.inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Whether a waiter is registered under `id`.
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        self.inner.pending.contains_key(id)
    }

    /// Number of registered waiters.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Raw counters.
    pub fn stats(&self) -> &CorrelatorStats {
        &self.inner.stats
    }

    pub fn snapshot(&self) -> CorrelatorSnapshot {
        let stats = &self.inner.stats;
        CorrelatorSnapshot {
            pending: self.pending_count(),
            registered: stats.registered.load(Ordering::Relaxed),
            resolved: stats.resolved.load(Ordering::Relaxed),
            timed_out: stats.timed_out.load(Ordering::Relaxed),
            cancelled: stats.cancelled.load(Ordering::Relaxed),
            unmatched: stats.unmatched.load(Ordering::Relaxed),
        }
    }
}

/// A registered waiter, owned by the caller awaiting the response.
///
/// Dropping an unsettled handle deregisters its waiter, so an abandoned
/// caller never leaves an entry behind.
pub struct WaitHandle {
    id: CorrelationId,
    generation: u64,
    deadline: Instant,
    registered_at: Instant,
    receiver: oneshot::Receiver<ResponsePayload>,
    inner: Arc<Inner>,
    settled: bool,
}

impl WaitHandle {
    /// Correlation id this handle waits on.
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Deadline fixed at registration.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn timeout_error(&self) -> BridgeError {
        BridgeError::Timeout {
            id: self.id.clone(),
            timeout_ms: self
                .deadline
                .saturating_duration_since(self.registered_at)
                .as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitHandle")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.inner.remove_generation(&self.id, self.generation) {
            self.inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(correlation_id = %self.id, "Waiter abandoned by caller");
        }
    }
}

/// Background task that evicts expired waiters every `interval`.
pub async fn cleanup_task(correlator: Correlator, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = correlator.evict_expired();
        if removed > 0 {
            debug!(removed, "Cleaned up expired waiters");
        }
    }
}
