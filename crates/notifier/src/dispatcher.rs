//! Periodic fan-out of pending notifications.
//!
//! Each tick lists the queue and spawns one delivery task per event, bounded
//! by a semaphore. Every listed event is claimed before any permit is
//! awaited. A claim is refused while the event is still being delivered, or
//! when its delivery finished after the listing was taken, since that row
//! may already be gone or carry a stale attempt count.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ecomm_common::config::{
    DEFAULT_CONCURRENCY, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_QUEUE_TIMEOUT_SECS,
    DEFAULT_SEND_TIMEOUT_SECS, NotifierConfig,
};
use ecomm_common::error::AppError;
use ecomm_common::types::{Completion, CompletionReport, DeliveryOutcome, NotificationEvent};

use crate::channel::{DeliveryChannel, DeliveryError, EmailMessage};
use crate::queue::NotificationQueue;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub concurrency: usize,
    pub send_timeout: Duration,
    /// Bound on each queue call, so a hung store never pins a permit.
    pub queue_timeout: Duration,
    pub subject: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            queue_timeout: Duration::from_secs(DEFAULT_QUEUE_TIMEOUT_SECS),
            subject: "email from ecomm".to_string(),
        }
    }
}

impl From<&NotifierConfig> for DispatcherConfig {
    fn from(config: &NotifierConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            concurrency: config.concurrency,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            queue_timeout: Duration::from_secs(config.queue_timeout_secs),
            subject: config.email_subject.clone(),
        }
    }
}

/// Deliveries in flight, plus when recent ones finished.
#[derive(Debug, Default)]
struct Tracker {
    active: HashSet<i64>,
    /// Finish sequence number per event, kept until the next listing.
    finished: HashMap<i64, u64>,
    seq: u64,
}

impl Tracker {
    /// Mark the start of a listing. Everything finished before this point is
    /// reflected in the rows the listing will return.
    fn begin_listing(&mut self) -> u64 {
        self.finished.clear();
        self.seq
    }
}

type InFlight = Arc<Mutex<Tracker>>;

/// Holds an event id in the in-flight set until dropped.
struct InFlightGuard {
    tracker: InFlight,
    event_id: i64,
}

impl InFlightGuard {
    /// Claim every claimable event of a listing in one pass.
    fn claim_all(
        tracker: &InFlight,
        events: Vec<NotificationEvent>,
        listed_at: u64,
    ) -> Vec<(NotificationEvent, InFlightGuard)> {
        let mut state = tracker.lock();
        let mut claimed = Vec::with_capacity(events.len());

        for event in events {
            if state.active.contains(&event.id) {
                tracing::debug!(event_id = event.id, "Delivery already in flight, skipping");
                continue;
            }
            if state.finished.get(&event.id).is_some_and(|at| *at > listed_at) {
                tracing::debug!(event_id = event.id, "Delivery finished after listing, skipping");
                continue;
            }
            state.active.insert(event.id);
            let guard = InFlightGuard {
                tracker: Arc::clone(tracker),
                event_id: event.id,
            };
            claimed.push((event, guard));
        }

        claimed
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.tracker.lock();
        state.active.remove(&self.event_id);
        state.seq += 1;
        let seq = state.seq;
        state.finished.insert(self.event_id, seq);
    }
}

pub struct Dispatcher {
    queue: Arc<dyn NotificationQueue>,
    channel: Arc<dyn DeliveryChannel>,
    config: DispatcherConfig,
    permits: Arc<Semaphore>,
    in_flight: InFlight,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        channel: Arc<dyn DeliveryChannel>,
        config: DispatcherConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            queue,
            channel,
            config,
            permits,
            in_flight: Arc::new(Mutex::new(Tracker::default())),
        }
    }

    /// Number of events currently being delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().active.len()
    }

    /// Poll and dispatch until `shutdown` is cancelled.
    ///
    /// The first poll happens immediately. On shutdown no new deliveries are
    /// started, and the call returns once every in-flight delivery has
    /// recorded its outcome.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        tracing::info!(
            channel = self.channel.name(),
            poll_interval_secs = self.config.poll_interval.as_secs_f64(),
            concurrency = self.config.concurrency,
            send_timeout_secs = self.config.send_timeout.as_secs_f64(),
            queue_timeout_secs = self.config.queue_timeout.as_secs_f64(),
            "Notification dispatcher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.dispatch_pending(&mut tasks, &shutdown).await {
                Ok(0) => {}
                Ok(launched) => tracing::debug!(launched, "Dispatched pending notifications"),
                Err(e) => tracing::error!(error = %e, "Failed to list pending notifications"),
            }
        }

        tracing::info!(
            in_flight = tasks.len(),
            "Dispatcher stopping, waiting for in-flight deliveries"
        );
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        tracing::info!("Notification dispatcher stopped");
    }

    /// List the queue once and spawn a delivery task per eligible event.
    ///
    /// Waits for a free permit before each spawn. Returns how many
    /// deliveries were launched. Calls must not overlap.
    pub async fn dispatch_pending(
        &self,
        tasks: &mut JoinSet<()>,
        shutdown: &CancellationToken,
    ) -> Result<usize, AppError> {
        let listed_at = self.in_flight.lock().begin_listing();

        let listed = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(0),
            listed = tokio::time::timeout(self.config.queue_timeout, self.queue.list_pending()) => listed,
        };
        let events = listed.map_err(|_| {
            AppError::Upstream(format!(
                "Listing pending notifications timed out after {:?}",
                self.config.queue_timeout
            ))
        })??;

        let claimed = InFlightGuard::claim_all(&self.in_flight, events, listed_at);
        let mut launched = 0;

        // Unlaunched claims are released when the iterator drops.
        for (event, guard) in claimed {
            if shutdown.is_cancelled() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let queue = Arc::clone(&self.queue);
            let channel = Arc::clone(&self.channel);
            let subject = self.config.subject.clone();
            let send_timeout = self.config.send_timeout;
            let queue_timeout = self.config.queue_timeout;

            tasks.spawn(async move {
                let _permit = permit;
                let _guard = guard;
                let event_id = event.id;
                match deliver_one(
                    queue.as_ref(),
                    channel.as_ref(),
                    &event,
                    &subject,
                    send_timeout,
                    queue_timeout,
                )
                .await
                {
                    Ok(completion) => tracing::debug!(
                        event_id,
                        terminal = completion.is_terminal(),
                        "Delivery outcome recorded"
                    ),
                    // The event stays queued and is picked up again next tick.
                    Err(e) => {
                        tracing::error!(event_id, error = %e, "Failed to record delivery outcome")
                    }
                }
            });
            launched += 1;
        }

        Ok(launched)
    }
}

/// Send one notification and report the outcome to the queue.
async fn deliver_one(
    queue: &dyn NotificationQueue,
    channel: &dyn DeliveryChannel,
    event: &NotificationEvent,
    subject: &str,
    send_timeout: Duration,
    queue_timeout: Duration,
) -> Result<Completion, AppError> {
    let message = EmailMessage::for_event(event, subject);

    let result = match tokio::time::timeout(send_timeout, channel.send(&message)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout(send_timeout)),
    };

    let (outcome, text) = match &result {
        Ok(()) => (
            DeliveryOutcome::Success,
            "notification sent successfully".to_string(),
        ),
        Err(e) => {
            tracing::warn!(
                event_id = event.id,
                order_id = event.order_id,
                attempts = event.attempts,
                channel = channel.name(),
                error = %e,
                "Notification send failed"
            );
            (DeliveryOutcome::Failure, format!("failed: {}", e))
        }
    };

    let report = CompletionReport {
        event_id: event.id,
        state_id: event.state_id,
        outcome,
        message: text,
    };
    tokio::time::timeout(queue_timeout, queue.complete(&report))
        .await
        .map_err(|_| {
            AppError::Upstream(format!(
                "Recording outcome of event {} timed out after {:?}",
                event.id, queue_timeout
            ))
        })?
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Delivery task panicked");
    }
}
