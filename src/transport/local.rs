//! In-process [`Transport`] implementation
//!
//! Satisfies the full transport contract (durability, reliability,
//! liveliness, request/reply correlation) using only `tokio` channels and
//! `dashmap`, so a fabric can be exercised and tested without an external
//! broker. Durable topics (`FunctionCapability`, `GenesisRegistration`) key
//! their late-joiner replay buffer off a `"durability_key"` string field
//! every publisher on those topics includes in its JSON payload — the
//! concrete mechanism behind spec §4.1's "late-joiner durability" guarantee,
//! modeled on keyed-instance topics rather than whole-topic replay.

use super::{ReplyEndpoint, RequestEndpoint, SampleSink, SubscriptionHandle, Transport};
use crate::domain_types::{CallId, MillisTimestamp, ProviderId};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

const DURABLE_TOPICS: &[&str] = &[
    crate::domain_types::topics::FUNCTION_CAPABILITY,
    crate::domain_types::topics::GENESIS_REGISTRATION,
];

/// Wire payload published on `LivelinessUpdate` (spec §6) alongside the
/// direct `SampleSink::on_liveliness_change` callback, so an external
/// observer subscribed only to the topic (not embedded as a transport
/// client) can also see liveliness transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LivelinessUpdate {
    provider_id: ProviderId,
    alive: bool,
    timestamp: MillisTimestamp,
}

struct Subscription {
    topic: String,
    sink: Arc<dyn SampleSink>,
}

struct Inner {
    identity: ProviderId,
    lease: Duration,
    topics: DashMap<String, Vec<u64>>,
    subscriptions: DashMap<u64, Subscription>,
    next_subscription_id: AtomicU64,
    durable_replay: DashMap<String, DashMap<String, Bytes>>,
    liveliness: DashMap<ProviderId, Instant>,
    request_queues: DashMap<String, mpsc::UnboundedSender<(CallId, Bytes)>>,
    request_receivers: DashMap<String, Arc<Mutex<mpsc::UnboundedReceiver<(CallId, Bytes)>>>>,
    pending_replies: DashMap<CallId, oneshot::Sender<Bytes>>,
}

/// An entirely in-process transport: one `LocalTransport` instance per
/// simulated "process". Multiple instances sharing the same [`Inner`] (via
/// [`LocalTransport::clone`] from [`LocalTransport::new_mesh`]) form a mesh
/// that behaves like independent processes on a shared bus.
#[derive(Clone)]
pub struct LocalTransport {
    inner: Arc<Inner>,
}

impl LocalTransport {
    /// Creates a brand new, isolated bus with one process identity.
    ///
    /// `lease` is the liveliness lease duration: a provider that does not
    /// call [`Transport::assert_liveliness`] within `lease` is declared dead.
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        let inner = Arc::new(Inner {
            identity: ProviderId::generate(),
            lease,
            topics: DashMap::new(),
            subscriptions: DashMap::new(),
            next_subscription_id: AtomicU64::new(0),
            durable_replay: DashMap::new(),
            liveliness: DashMap::new(),
            request_queues: DashMap::new(),
            request_receivers: DashMap::new(),
            pending_replies: DashMap::new(),
        });

        spawn_liveliness_sweeper(Arc::downgrade(&inner));

        Self { inner }
    }

    /// Creates a new process identity sharing this instance's bus, so the
    /// two act like independent providers/consumers on the same mesh.
    #[must_use]
    pub fn join_mesh(&self) -> Self {
        let inner = Arc::new(Inner {
            identity: ProviderId::generate(),
            lease: self.inner.lease,
            topics: self.inner.topics.clone(),
            subscriptions: self.inner.subscriptions.clone(),
            next_subscription_id: AtomicU64::new(
                self.inner.next_subscription_id.load(Ordering::SeqCst),
            ),
            durable_replay: self.inner.durable_replay.clone(),
            liveliness: self.inner.liveliness.clone(),
            request_queues: self.inner.request_queues.clone(),
            request_receivers: self.inner.request_receivers.clone(),
            pending_replies: self.inner.pending_replies.clone(),
        });
        Self { inner }
    }

    fn durability_key(topic: &str, sample: &Bytes) -> Option<String> {
        if !DURABLE_TOPICS.contains(&topic) {
            return None;
        }
        let value: serde_json::Value = serde_json::from_slice(sample).ok()?;
        value
            .get("durability_key")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    }
}

fn spawn_liveliness_sweeper(inner: Weak<Inner>) {
    tokio::spawn(async move {
        loop {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let lease = inner.lease;
            tokio::time::sleep(lease / 2).await;
            let now = Instant::now();
            let dead: Vec<ProviderId> = inner
                .liveliness
                .iter()
                .filter(|entry| now.duration_since(*entry.value()) > lease)
                .map(|entry| *entry.key())
                .collect();
            for provider_id in dead {
                inner.liveliness.remove(&provider_id);
                notify_liveliness(&inner, provider_id, false).await;
            }
        }
    });
}

/// Invokes every subscriber's direct `on_liveliness_change` callback, and
/// additionally publishes a [`LivelinessUpdate`] sample on the
/// `LivelinessUpdate` topic (spec §6) for observers subscribed only to the
/// topic rather than embedded as a transport client.
async fn notify_liveliness(inner: &Inner, provider_id: ProviderId, alive: bool) {
    for entry in &inner.subscriptions {
        entry.value().sink.on_liveliness_change(provider_id, alive);
    }

    let update = LivelinessUpdate {
        provider_id,
        alive,
        timestamp: MillisTimestamp::now(),
    };
    match serde_json::to_vec(&update) {
        Ok(bytes) => publish_fanout(inner, crate::domain_types::topics::LIVELINESS_UPDATE, Bytes::from(bytes)).await,
        Err(err) => warn!(error = %err, "failed to serialize liveliness update"),
    }
}

/// Fans a sample out to every subscriber of `topic`, without touching the
/// durable-replay buffer (used for the always-non-durable `LivelinessUpdate`
/// topic; [`Transport::publish`] handles durability for the topics that need it).
async fn publish_fanout(inner: &Inner, topic: &str, sample: Bytes) {
    let subscriber_ids = inner
        .topics
        .get(topic)
        .map(|entry| entry.value().clone())
        .unwrap_or_default();

    for id in subscriber_ids {
        if let Some(subscription) = inner.subscriptions.get(&id) {
            subscription.sink.on_sample(topic, sample.clone());
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn publish(&self, topic: &str, sample: Bytes) -> Result<(), TransportError> {
        if let Some(key) = Self::durability_key(topic, &sample) {
            self.inner
                .durable_replay
                .entry(topic.to_string())
                .or_default()
                .insert(key, sample.clone());
        }

        publish_fanout(&self.inner, topic, sample).await;

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        sink: Arc<dyn SampleSink>,
    ) -> Result<SubscriptionHandle, TransportError> {
        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::SeqCst);

        if let Some(replay) = self.inner.durable_replay.get(topic) {
            for entry in replay.iter() {
                sink.on_sample(topic, entry.value().clone());
            }
        }

        self.inner.subscriptions.insert(
            id,
            Subscription {
                topic: topic.to_string(),
                sink,
            },
        );
        self.inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(id);

        debug!(topic, subscription_id = id, "subscribed to topic");
        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some((_, subscription)) = self.inner.subscriptions.remove(&handle.0) {
            if let Some(mut ids) = self.inner.topics.get_mut(&subscription.topic) {
                ids.retain(|id| *id != handle.0);
            }
        }
    }

    async fn open_request_endpoint(
        &self,
        service_name: &str,
    ) -> Result<RequestEndpoint, TransportError> {
        Ok(RequestEndpoint {
            service_name: service_name.to_string(),
        })
    }

    async fn open_reply_endpoint(
        &self,
        service_name: &str,
    ) -> Result<ReplyEndpoint, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .request_queues
            .insert(service_name.to_string(), tx);
        self.inner
            .request_receivers
            .insert(service_name.to_string(), Arc::new(Mutex::new(rx)));
        Ok(ReplyEndpoint {
            service_name: service_name.to_string(),
        })
    }

    async fn send_request(
        &self,
        endpoint: &RequestEndpoint,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        let queue = self
            .inner
            .request_queues
            .get(&endpoint.service_name)
            .ok_or_else(|| TransportError::UnknownTopic(endpoint.service_name.clone()))?
            .clone();

        let call_id = CallId::generate();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.pending_replies.insert(call_id, reply_tx);

        if queue.send((call_id, payload)).is_err() {
            self.inner.pending_replies.remove(&call_id);
            return Err(TransportError::UnknownTopic(endpoint.service_name.clone()));
        }

        let result = tokio::time::timeout(timeout, reply_rx).await;
        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.inner.pending_replies.remove(&call_id);
                Err(TransportError::ChannelClosed)
            }
            Err(_) => {
                self.inner.pending_replies.remove(&call_id);
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    async fn receive_request(
        &self,
        endpoint: &ReplyEndpoint,
    ) -> Result<(CallId, Bytes), TransportError> {
        let receiver = self
            .inner
            .request_receivers
            .get(&endpoint.service_name)
            .ok_or_else(|| TransportError::UnknownTopic(endpoint.service_name.clone()))?
            .clone();

        let mut receiver = receiver.lock().await;
        receiver
            .recv()
            .await
            .ok_or(TransportError::ChannelClosed)
    }

    async fn send_reply(&self, _endpoint: &ReplyEndpoint, call_id: CallId, payload: Bytes) {
        if let Some((_, sender)) = self.inner.pending_replies.remove(&call_id) {
            // A reply sent after the caller timed out and dropped its
            // receiver is simply discarded, per spec §5's cancellation rule.
            let _ = sender.send(payload);
        } else {
            warn!(%call_id, "dropping reply for unknown or expired call");
        }
    }

    async fn assert_liveliness(&self, provider_id: ProviderId) {
        let was_dead = !self.inner.liveliness.contains_key(&provider_id);
        self.inner.liveliness.insert(provider_id, Instant::now());
        if was_dead {
            notify_liveliness(&self.inner, provider_id, true).await;
        }
    }

    async fn revoke_liveliness(&self, provider_id: ProviderId) {
        if self.inner.liveliness.remove(&provider_id).is_some() {
            notify_liveliness(&self.inner, provider_id, false).await;
        }
    }

    fn process_identity(&self) -> ProviderId {
        self.inner.identity
    }

    fn liveliness_lease(&self) -> Duration {
        self.inner.lease
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("identity", &self.inner.identity)
            .finish_non_exhaustive()
    }
}

/// Snapshot helper used by tests to assert on durable-replay contents
/// without reaching into private fields.
#[cfg(test)]
pub(crate) fn durable_sample_count(transport: &LocalTransport, topic: &str) -> usize {
    transport
        .inner
        .durable_replay
        .get(topic)
        .map(|map| map.len())
        .unwrap_or(0)
}
