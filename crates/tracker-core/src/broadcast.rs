//! Broadcast Hub - fans snapshots out to connected observers
//!
//! The hub owns the live subscriber set and the heartbeat timer. It never
//! touches registry data directly: publishers hand it a snapshot (or a
//! closure producing one) and the hub pushes it to every active subscriber.
//!
//! Delivery is best effort. A subscriber whose send fails is closed and
//! evicted, the remaining subscribers still receive the payload, and the
//! publisher never sees the failure.

use crate::{snapshot::Snapshot, DEFAULT_HEARTBEAT_INTERVAL_SECS};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

/// Subscriber ID, assigned in subscription order
pub type SubscriberId = u64;

/// Why a push to one subscriber failed
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber is closed")]
    Closed,
    #[error("subscriber queue is full")]
    Full,
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// A long-lived observer connection
pub trait Subscriber: Send {
    /// One-time setup, run exactly once when the subscriber joins the hub
    fn setup(&mut self) -> Result<(), DeliveryError> {
        Ok(())
    }

    /// Push a snapshot to this observer. Must not block.
    fn send(&mut self, snapshot: &Snapshot) -> Result<(), DeliveryError>;
}

/// Subscriber lifecycle: `Connecting -> Active -> Closed`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Connecting,
    Active,
    Closed,
}

struct SubscriberEntry {
    subscriber: Box<dyn Subscriber>,
    state: SubscriberState,
}

/// Hub counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub publishes: u64,
    pub deliveries: u64,
    pub evictions: u64,
}

/// Subscriber set plus heartbeat timer
pub struct BroadcastHub {
    /// Live subscribers, iterated in subscription order
    subscribers: Mutex<BTreeMap<SubscriberId, SubscriberEntry>>,
    /// Next subscriber ID
    next_id: AtomicU64,
    /// Heartbeat task, at most one per hub
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    /// Stats
    stats: RwLock<HubStats>,
}

impl BroadcastHub {
    /// Create a hub with no subscribers and no heartbeat
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            heartbeat: Mutex::new(None),
            stats: RwLock::new(HubStats::default()),
        }
    }

    /// Add a subscriber and run its setup step.
    ///
    /// The subscriber is `Connecting` while setup runs and `Active` once it
    /// returns. If setup fails the subscriber is closed, never joins the live
    /// set, and the error is returned.
    pub fn subscribe(
        &self,
        subscriber: Box<dyn Subscriber>,
    ) -> Result<SubscriberId, DeliveryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subscribers = self.subscribers.lock();

        let entry = subscribers.entry(id).or_insert(SubscriberEntry {
            subscriber,
            state: SubscriberState::Connecting,
        });

        if let Err(e) = entry.subscriber.setup() {
            entry.state = SubscriberState::Closed;
            subscribers.remove(&id);
            tracing::warn!("Subscriber {} failed setup: {}", id, e);
            return Err(e);
        }
        entry.state = SubscriberState::Active;

        tracing::debug!(
            "Subscriber {} active ({} connected)",
            id,
            subscribers.len()
        );
        Ok(id)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        if self.subscribers.lock().remove(&id).is_some() {
            tracing::debug!("Removed subscriber {}", id);
            true
        } else {
            false
        }
    }

    /// Send `snapshot` to every active subscriber.
    ///
    /// Returns the number of successful deliveries.
    pub fn publish(&self, snapshot: &Snapshot) -> usize {
        let mut subscribers = self.subscribers.lock();
        self.fan_out(&mut subscribers, snapshot)
    }

    /// Capture a snapshot and send it while holding the subscriber set.
    ///
    /// Concurrent publishes are serialized, so observers never receive an
    /// older capture after a newer one.
    pub fn publish_with<F>(&self, capture: F) -> usize
    where
        F: FnOnce() -> Snapshot,
    {
        let mut subscribers = self.subscribers.lock();
        let snapshot = capture();
        self.fan_out(&mut subscribers, &snapshot)
    }

    fn fan_out(
        &self,
        subscribers: &mut BTreeMap<SubscriberId, SubscriberEntry>,
        snapshot: &Snapshot,
    ) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, entry) in subscribers.iter_mut() {
            if entry.state != SubscriberState::Active {
                continue;
            }
            match entry.subscriber.send(snapshot) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!("Delivery to subscriber {} failed: {}", id, e);
                    entry.state = SubscriberState::Closed;
                    closed.push(*id);
                }
            }
        }

        for id in &closed {
            subscribers.remove(id);
        }

        let mut stats = self.stats.write();
        stats.publishes += 1;
        stats.deliveries += delivered as u64;
        stats.evictions += closed.len() as u64;
        drop(stats);

        if !closed.is_empty() {
            tracing::info!(
                "Evicted {} subscriber(s), {} remaining",
                closed.len(),
                subscribers.len()
            );
        }
        tracing::trace!("Published snapshot to {} subscriber(s)", delivered);

        delivered
    }

    /// Start the heartbeat timer.
    ///
    /// `tick` runs once per interval (default 10s), first after one full
    /// interval; returning false from it stops the timer. Only one heartbeat
    /// may run per hub: later calls return false and leave the running timer
    /// alone. A timer that already ended may be replaced. Returns false
    /// outside a tokio runtime.
    pub fn start_heartbeat<F>(&self, interval: Option<Duration>, mut tick: F) -> bool
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let mut heartbeat = self.heartbeat.lock();
        if heartbeat.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::warn!("Heartbeat already running, ignoring second start");
            return false;
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No tokio runtime, heartbeat not started");
            return false;
        };

        let default = Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS);
        let period = match interval {
            Some(period) if period.is_zero() => {
                tracing::warn!("Zero heartbeat interval, using {:?}", default);
                default
            }
            Some(period) => period,
            None => default,
        };

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick() {
                    tracing::debug!("Heartbeat source gone, stopping timer");
                    break;
                }
            }
        });

        *heartbeat = Some(handle);
        tracing::info!("Heartbeat started ({:?} interval)", period);
        true
    }

    /// Stop the heartbeat timer. Returns false if none was running.
    pub fn stop_heartbeat(&self) -> bool {
        match self.heartbeat.lock().take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("Heartbeat stopped");
                true
            }
            None => false,
        }
    }

    /// Check if a heartbeat timer has been started and not stopped
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Lifecycle state of a subscriber; unknown IDs are `Closed`
    pub fn state(&self, id: SubscriberId) -> SubscriberState {
        self.subscribers
            .lock()
            .get(&id)
            .map(|entry| entry.state)
            .unwrap_or(SubscriberState::Closed)
    }

    /// Number of live subscribers
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Check if no subscriber is connected
    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Get hub counters
    pub fn stats(&self) -> HubStats {
        *self.stats.read()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BroadcastHub {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.get_mut().take() {
            handle.abort();
        }
    }
}
