//! The bridge: turns one blocking call into a published command plus a
//! correlated wait on the response topic.

use crate::adapter::http::BridgeReply;
use crate::adapter::wire::{decode_response, encode_command};
use crate::domain::config::{BridgeConfig, ConfigError, CorrelationMode};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::pending::Correlator;
use crate::domain::request::Request;
use crate::ipc::backoff::RetryPolicy;
use serde_json::Value;
use shared_bus::{BusClient, BusEvent, EventHandler, SubscriptionHandle, Topic};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Synchronous-over-asynchronous request bridge.
///
/// Owns one standing subscription on the response topic, shared by every
/// call. It is opened by a single attempt at a time and re-opened when the
/// previous one has ended. Calls are independent of each other except in
/// [`CorrelationMode::FixedKey`], where they run one at a time.
pub struct Bridge {
    bus: Arc<dyn BusClient>,
    correlator: Correlator,
    command_topic: Topic,
    response_topic: Topic,
    timeout: Duration,
    mode: CorrelationMode,
    fixed_key: CorrelationId,
    /// Held for the whole call in fixed-key mode
    in_flight: Mutex<()>,
    /// Current response subscription; the write lock serializes setup
    subscription: RwLock<Option<SubscriptionHandle>>,
    shut_down: AtomicBool,
}

impl Bridge {
    /// Create a bridge over `bus`.
    ///
    /// The response subscription is not opened here; see
    /// [`establish_subscription`](Self::establish_subscription).
    pub fn new(bus: Arc<dyn BusClient>, config: &BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            bus,
            correlator: Correlator::new(config.timeouts.request),
            command_topic: config.command_topic(),
            response_topic: config.response_topic(),
            timeout: config.timeouts.request,
            mode: config.correlation.mode,
            fixed_key: CorrelationId::new(config.correlation.fixed_key.clone()),
            in_flight: Mutex::new(()),
            subscription: RwLock::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn command_topic(&self) -> &Topic {
        &self.command_topic
    }

    pub fn response_topic(&self) -> &Topic {
        &self.response_topic
    }

    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the response subscription is established and delivering.
    ///
    /// Reports `false` while a (re)subscription attempt is in progress.
    pub fn is_ready(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst)
            && self.subscription.try_read().is_ok_and(|slot| {
                slot.as_ref().is_some_and(SubscriptionHandle::is_active)
            })
    }

    /// Open the response subscription if it is not open, or re-open it if
    /// the previous one has ended.
    ///
    /// Concurrent callers share a single attempt. A failed attempt leaves the
    /// slot empty so a later call can try again.
    pub async fn ensure_subscribed(&self) -> BridgeResult<()> {
        self.check_running()?;

        if self
            .subscription
            .read()
            .await
            .as_ref()
            .is_some_and(SubscriptionHandle::is_active)
        {
            return Ok(());
        }

        let mut slot = self.subscription.write().await;
        // Another caller may have finished an attempt while we queued.
        if slot.as_ref().is_some_and(SubscriptionHandle::is_active) {
            return Ok(());
        }
        self.check_running()?;

        if let Some(ended) = slot.take() {
            warn!(topic = %ended.topic(), "Response subscription ended, re-subscribing");
        }

        let correlator = self.correlator.clone();
        let handler: EventHandler =
            Arc::new(move |event: BusEvent| route_response(&correlator, event));

        let handle = self
            .bus
            .subscribe(&self.response_topic, handler)
            .await
            .map_err(|e| BridgeError::SubscriptionSetupFailed(e.to_string()))?;

        if let Err(e) = self.check_running() {
            handle.unsubscribe();
            return Err(e);
        }
        if !handle.is_active() {
            return Err(BridgeError::SubscriptionSetupFailed(format!(
                "subscription on {} ended during setup",
                self.response_topic
            )));
        }

        info!(topic = %self.response_topic, "Response subscription ready");
        *slot = Some(handle);
        Ok(())
    }

    fn check_running(&self) -> BridgeResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(BridgeError::SubscriptionSetupFailed(
                "bridge is shut down".into(),
            ));
        }
        Ok(())
    }

    /// Open the response subscription, retrying on failure per `policy`.
    pub async fn establish_subscription(&self, policy: &RetryPolicy) -> BridgeResult<()> {
        let mut delays = policy.backoff();
        let mut attempt: u32 = 1;

        loop {
            let err = match self.ensure_subscribed().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let Some(delay) = delays.next() else {
                error!(
                    topic = %self.response_topic,
                    attempts = attempt,
                    error = %err,
                    "Giving up on response subscription"
                );
                return Err(err);
            };

            warn!(
                topic = %self.response_topic,
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "Response subscription failed"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Bridge one request: publish `payload` as a command and wait for the
    /// correlated response.
    ///
    /// A publish failure is reported immediately. Nothing is retried.
    pub async fn call(&self, payload: Value) -> BridgeResult<BridgeReply> {
        let id = match self.mode {
            CorrelationMode::PerRequest => CorrelationId::generate(),
            CorrelationMode::FixedKey => self.fixed_key.clone(),
        };
        self.call_with_id(id, payload).await
    }

    /// Like [`call`](Self::call) under a caller-chosen correlation id.
    #[instrument(skip(self, payload), fields(correlation_id = %id, mode = ?self.mode))]
    pub async fn call_with_id(
        &self,
        id: CorrelationId,
        payload: Value,
    ) -> BridgeResult<BridgeReply> {
        let started = Instant::now();
        let request = Request::new(id, payload, self.timeout);

        // Queueing for the fixed key counts against the caller's deadline.
        let _guard = match self.mode {
            CorrelationMode::PerRequest => None,
            CorrelationMode::FixedKey => Some(
                tokio::time::timeout_at(request.deadline, self.in_flight.lock())
                    .await
                    .map_err(|_| self.timeout_error(&request))?,
            ),
        };
        if request.is_expired() {
            return Err(self.timeout_error(&request));
        }

        let handle = self
            .correlator
            .register_with_deadline(request.id.clone(), request.deadline)?;

        self.ensure_subscribed().await?;

        let command = encode_command(&request.id, &request.payload)?;
        if let Err(e) = self
            .bus
            .publish(&self.command_topic, request.id.as_str(), command)
            .await
        {
            warn!(correlation_id = %request.id, error = %e, "Command publish failed");
            return Err(BridgeError::PublishFailed(e.to_string()));
        }
        debug!(
            correlation_id = %request.id,
            topic = %self.command_topic,
            arrived_at = %request.arrived_at,
            remaining_ms = request.remaining().as_millis() as u64,
            "Command published"
        );

        let body = self.correlator.wait(handle, request.deadline).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        debug!(correlation_id = %request.id, elapsed_ms, "Request bridged");

        Ok(BridgeReply {
            correlation_id: request.id,
            body,
            elapsed_ms,
        })
    }

    fn timeout_error(&self, request: &Request) -> BridgeError {
        BridgeError::Timeout {
            id: request.id.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Tear down the response subscription. Pending callers run into their
    /// deadlines; new calls fail with `SubscriptionSetupFailed`.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        // A setup attempt holding the write lock sees the flag and stops.
        if let Ok(slot) = self.subscription.try_read() {
            if let Some(handle) = slot.as_ref() {
                handle.unsubscribe();
            }
        }
        info!(
            topic = %self.response_topic,
            pending = self.correlator.pending_count(),
            "Bridge shut down"
        );
    }
}

/// Subscription handler body: match one response event to its waiter.
fn route_response(correlator: &Correlator, event: BusEvent) {
    match decode_response(&event) {
        Ok((id, body)) => {
            correlator.resolve(&id, body);
        }
        Err(err) => {
            warn!(
                topic = %event.topic,
                key = %event.key,
                error = %err,
                "Dropping undecodable response"
            );
        }
    }
}
