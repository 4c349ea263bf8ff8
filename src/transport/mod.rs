//! Transport Abstraction (spec §4.1)
//!
//! Topic-based pub/sub with late-joiner durability, reliability, and
//! liveliness, plus request/reply correlation. This module defines the
//! object-safe trait every other component depends on; [`local::LocalTransport`]
//! is the one concrete implementation this crate ships, built entirely on
//! `tokio` primitives so the fabric runs without an external broker.
//!
//! The trait boundary exists so a different transport (a real DDS/MQTT
//! binding, for instance) could be substituted without touching the
//! catalogue, matcher, service loop, or monitoring emitter — the same
//! reason the teacher's `MessageRouter`/`DeliveryEngine` split keeps local
//! and remote delivery swappable.

pub mod local;

use crate::domain_types::ProviderId;
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// The two abstract sinks a subscriber provides, collapsing the
/// subscription-match/data-available listener classes of the original
/// system into a single object per spec's design notes (§9).
pub trait SampleSink: Send + Sync {
    /// Invoked once per sample published on a subscribed topic (including,
    /// for durable topics, the late-joiner replay delivered at subscribe time).
    fn on_sample(&self, topic: &str, sample: Bytes);

    /// Invoked when a publisher's liveliness lease lapses or is renewed.
    fn on_liveliness_change(&self, provider_id: ProviderId, alive: bool);
}

/// Handle to an active subscription; dropping it does not unsubscribe —
/// call [`Transport::unsubscribe`] explicitly, mirroring the teacher's
/// explicit-release-in-reverse-order endpoint ownership convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(pub(crate) u64);

/// A request endpoint opened for a given logical service name.
#[derive(Debug, Clone)]
pub struct RequestEndpoint {
    pub(crate) service_name: String,
}

/// A reply endpoint opened for a given logical service name.
#[derive(Debug, Clone)]
pub struct ReplyEndpoint {
    pub(crate) service_name: String,
}

/// Topic-based pub/sub with late-joiner durability, reliability, liveliness,
/// and request/reply correlation — the minimum surface spec §4.1 requires.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes one sample on `topic`. Durable topics retain the sample for
    /// late joiners; non-durable topics deliver only to current subscribers.
    async fn publish(&self, topic: &str, sample: Bytes) -> Result<(), TransportError>;

    /// Subscribes to `topic`. For durable topics, `sink.on_sample` is invoked
    /// once per still-live instance immediately, before this call returns.
    async fn subscribe(
        &self,
        topic: &str,
        sink: Arc<dyn SampleSink>,
    ) -> Result<SubscriptionHandle, TransportError>;

    /// Releases a subscription. Idempotent.
    async fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Opens the caller side of a request/reply pair for `service_name`.
    async fn open_request_endpoint(
        &self,
        service_name: &str,
    ) -> Result<RequestEndpoint, TransportError>;

    /// Opens the callee side of a request/reply pair for `service_name`.
    async fn open_reply_endpoint(
        &self,
        service_name: &str,
    ) -> Result<ReplyEndpoint, TransportError>;

    /// Sends `payload` on `endpoint` and suspends until a correlated reply
    /// arrives, `timeout` elapses, or the call is cancelled. A reply that
    /// arrives after the caller has given up is discarded.
    async fn send_request(
        &self,
        endpoint: &RequestEndpoint,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError>;

    /// Receives the next request addressed to `endpoint`, along with the
    /// call correlator the reply must echo back.
    async fn receive_request(
        &self,
        endpoint: &ReplyEndpoint,
    ) -> Result<(crate::domain_types::CallId, Bytes), TransportError>;

    /// Sends the reply for a previously received `call_id`. A reply sent
    /// for an unknown or expired `call_id` is silently dropped.
    async fn send_reply(
        &self,
        endpoint: &ReplyEndpoint,
        call_id: crate::domain_types::CallId,
        payload: Bytes,
    );

    /// Asserts this process's liveliness for `provider_id`, resetting its lease.
    async fn assert_liveliness(&self, provider_id: ProviderId);

    /// Stops asserting liveliness for `provider_id`; subscribers observe a
    /// negative liveliness signal within one lease period.
    async fn revoke_liveliness(&self, provider_id: ProviderId);

    /// This process's stable transport identity.
    fn process_identity(&self) -> ProviderId;

    /// The liveliness lease duration this transport enforces: a provider
    /// that does not call [`Transport::assert_liveliness`] within this
    /// window is declared dead. Callers that need to stay alive use this
    /// to size their own heartbeat cadence (spec §4.1's liveliness lease).
    fn liveliness_lease(&self) -> Duration;
}
