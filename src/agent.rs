//! Agent Shell (spec §4.5)
//!
//! Binds a [`Catalogue`] (as a client), [`Matcher`], and [`MonitoringEmitter`]
//! into a process that is itself discoverable: it announces on the
//! registration topic, subscribes to capability advertisements, and wraps
//! request processing with monitoring events. Phantom-typed over its own
//! construction phase (`Unannounced` → `Announced` → `Running`) so
//! `process_request` cannot be called before the shell has subscribed to
//! capabilities — the teacher's "illegal states unrepresentable" philosophy
//! from its own `Agent<State>` in the original `agent.rs`.

use crate::catalogue::{Catalogue, CapabilitySink};
use crate::domain_types::{topics, CallId, ChainId, InstanceId};
use crate::error::{FabricError, TransportError};
use crate::monitoring::{ComponentType, MonitoringEmitter};
use crate::transport::{SubscriptionHandle, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::instrument;

/// The three kinds of registration announcement spec §3's glossary names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentType {
    /// A plain consumer/provider combination.
    Agent,
    /// An agent specialized for a narrower role than a general agent.
    SpecializedAgent,
    /// A human-facing front-end.
    Interface,
}

/// Registration announcement advertising an agent (spec §3), published on
/// the durable `GenesisRegistration` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationAnnouncement {
    /// Human-chosen display name.
    pub preferred_name: String,
    /// Logical service this agent fronts, if any.
    pub service_name: String,
    /// What kind of agent this is.
    pub agent_type: AgentType,
    /// This running instance's identifier.
    pub instance_id: InstanceId,
    /// Whether this agent should be treated as a default handler absent a more specific match.
    pub default_capable: bool,
    /// Late-joiner durability key: this announcement's stringified `instance_id`.
    pub durability_key: String,
}

/// Static configuration for constructing an [`AgentShell`].
pub struct AgentShellConfig {
    /// Human-chosen display name.
    pub preferred_name: String,
    /// Logical service this agent fronts.
    pub service_name: String,
    /// What kind of agent this is.
    pub agent_type: AgentType,
    /// Whether this agent should be treated as a default handler.
    pub default_capable: bool,
}

/// The concrete request-handling behavior an [`AgentShell`] wraps with
/// monitoring. Implementers hold whatever state (a `Matcher`, an RPC client)
/// they need to turn a free-form request into a result.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    /// Processes one free-form request, returning its structured result.
    async fn process(&self, request: &str) -> Result<serde_json::Value, FabricError>;
}

/// Marker: constructed, not yet announced.
pub struct Unannounced;
/// Marker: announced on the registration topic, not yet subscribed.
pub struct Announced;
/// Marker: fully constructed and accepting `process_request` calls.
pub struct Running;

/// A discoverable agent process, phantom-typed over its construction phase.
pub struct AgentShell<State> {
    instance_id: InstanceId,
    config: AgentShellConfig,
    transport: Arc<dyn Transport>,
    catalogue: Arc<Catalogue>,
    monitoring: Arc<MonitoringEmitter>,
    processor: Option<Arc<dyn RequestProcessor>>,
    capability_subscription: Option<SubscriptionHandle>,
    _state: PhantomData<State>,
}

impl AgentShell<Unannounced> {
    /// Creates a not-yet-announced shell bound to one transport identity.
    #[must_use]
    pub fn new(
        config: AgentShellConfig,
        transport: Arc<dyn Transport>,
        catalogue: Arc<Catalogue>,
        monitoring: Arc<MonitoringEmitter>,
    ) -> Self {
        Self {
            instance_id: InstanceId::generate(),
            config,
            transport,
            catalogue,
            monitoring,
            processor: None,
            capability_subscription: None,
            _state: PhantomData,
        }
    }

    /// Publishes this agent's registration announcement on the durable
    /// `GenesisRegistration` topic and emits `AGENT_INIT`.
    #[instrument(skip(self), fields(name = %self.config.preferred_name))]
    pub async fn announce(self) -> Result<AgentShell<Announced>, TransportError> {
        self.monitoring.emit_agent_init(self.instance_id.to_string());

        let announcement = RegistrationAnnouncement {
            preferred_name: self.config.preferred_name.clone(),
            service_name: self.config.service_name.clone(),
            agent_type: self.config.agent_type,
            instance_id: self.instance_id,
            default_capable: self.config.default_capable,
            durability_key: self.instance_id.to_string(),
        };
        let payload = serde_json::to_vec(&announcement)
            .map(bytes::Bytes::from)
            .map_err(TransportError::Serialization)?;
        self.transport.publish(topics::GENESIS_REGISTRATION, payload).await?;

        Ok(AgentShell {
            instance_id: self.instance_id,
            config: self.config,
            transport: self.transport,
            catalogue: self.catalogue,
            monitoring: self.monitoring,
            processor: self.processor,
            capability_subscription: self.capability_subscription,
            _state: PhantomData,
        })
    }
}

impl AgentShell<Announced> {
    /// Subscribes to the capability topic (feeding this shell's catalogue,
    /// which owns the resulting `NODE_DISCOVERY`/`EDGE_DISCOVERY` events)
    /// and binds the `processor` that will serve `process_request`.
    #[instrument(skip(self, processor), fields(name = %self.config.preferred_name))]
    pub async fn subscribe_capabilities(
        mut self,
        processor: Arc<dyn RequestProcessor>,
    ) -> Result<AgentShell<Running>, TransportError> {
        let sink = Arc::new(CapabilitySink::new(self.catalogue.clone()));
        let handle = self.transport.subscribe(topics::FUNCTION_CAPABILITY, sink).await?;
        self.capability_subscription = Some(handle);
        self.processor = Some(processor);

        self.monitoring.emit_agent_ready(self.instance_id.to_string());

        Ok(AgentShell {
            instance_id: self.instance_id,
            config: self.config,
            transport: self.transport,
            catalogue: self.catalogue,
            monitoring: self.monitoring,
            processor: self.processor,
            capability_subscription: self.capability_subscription,
            _state: PhantomData,
        })
    }
}

impl AgentShell<Running> {
    /// This instance's identifier.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// The bound client-side catalogue.
    #[must_use]
    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }

    /// Processes one request, wrapping the bound [`RequestProcessor`] with
    /// `AGENT_REQUEST` on entry and `AGENT_RESPONSE` on exit, both carrying
    /// the same `call_id`.
    #[instrument(skip(self, request), fields(instance_id = %self.instance_id))]
    pub async fn process_request(&self, request: &str) -> Result<serde_json::Value, FabricError> {
        let call_id = CallId::generate();
        let chain_id = ChainId::generate();

        self.monitoring
            .emit_agent_request(self.instance_id.to_string(), call_id, chain_id);

        let processor = self
            .processor
            .as_ref()
            .expect("Running shell always has a bound processor");
        let result = processor.process(request).await;

        let status = if result.is_ok() { "success" } else { "error" };
        self.monitoring
            .emit_agent_response(self.instance_id.to_string(), call_id, chain_id, status);

        result
    }

    /// Transitions `READY → DEGRADED → OFFLINE`, then releases the
    /// capability subscription (the one transport endpoint this shell
    /// itself owns), in reverse of its construction order.
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn shutdown(self) {
        self.monitoring.emit_state_change(
            ComponentType::Agent,
            self.instance_id.to_string(),
            Some("READY"),
            "DEGRADED",
            "shutdown requested",
        );
        self.monitoring.emit_state_change(
            ComponentType::Agent,
            self.instance_id.to_string(),
            Some("DEGRADED"),
            "OFFLINE",
            "shutdown complete",
        );

        if let Some(handle) = self.capability_subscription {
            self.transport.unsubscribe(handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{EventCategory, LifecycleEvent};
    use crate::transport::local::LocalTransport;
    use crate::transport::SampleSink;
    use std::sync::Mutex;
    use std::time::Duration;

    struct EchoProcessor;

    struct RecordingSink {
        samples: Mutex<Vec<(String, bytes::Bytes)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                samples: Mutex::new(Vec::new()),
            })
        }
    }

    impl SampleSink for RecordingSink {
        fn on_sample(&self, topic: &str, sample: bytes::Bytes) {
            self.samples.lock().unwrap().push((topic.to_string(), sample));
        }

        fn on_liveliness_change(&self, _provider_id: crate::domain_types::ProviderId, _alive: bool) {}
    }

    #[async_trait]
    impl RequestProcessor for EchoProcessor {
        async fn process(&self, request: &str) -> Result<serde_json::Value, FabricError> {
            Ok(serde_json::json!({ "echo": request }))
        }
    }

    async fn running_shell() -> AgentShell<Running> {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(Duration::from_secs(5)));
        let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
        let catalogue = Arc::new(Catalogue::new(transport.clone(), monitoring.clone()));
        let config = AgentShellConfig {
            preferred_name: "test-agent".to_string(),
            service_name: "TestService".to_string(),
            agent_type: AgentType::Agent,
            default_capable: true,
        };
        AgentShell::new(config, transport, catalogue, monitoring)
            .announce()
            .await
            .unwrap()
            .subscribe_capabilities(Arc::new(EchoProcessor))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn process_request_returns_processor_result() {
        let shell = running_shell().await;
        let response = shell.process_request("hello").await.unwrap();
        assert_eq!(response["echo"], "hello");
    }

    #[tokio::test]
    async fn process_request_emits_exactly_one_request_and_one_response_sharing_a_call_id() {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(Duration::from_secs(5)));
        let sink = RecordingSink::new();
        transport
            .subscribe(topics::MONITORING_EVENT, sink.clone())
            .await
            .unwrap();

        let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
        let catalogue = Arc::new(Catalogue::new(transport.clone(), monitoring.clone()));
        let config = AgentShellConfig {
            preferred_name: "test-agent".to_string(),
            service_name: "TestService".to_string(),
            agent_type: AgentType::Agent,
            default_capable: true,
        };
        let shell = AgentShell::new(config, transport, catalogue, monitoring)
            .announce()
            .await
            .unwrap()
            .subscribe_capabilities(Arc::new(EchoProcessor))
            .await
            .unwrap();

        shell.process_request("hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events: Vec<LifecycleEvent> = sink
            .samples
            .lock()
            .unwrap()
            .iter()
            .map(|(_, bytes)| serde_json::from_slice(bytes).unwrap())
            .collect();

        let requests: Vec<&LifecycleEvent> = events
            .iter()
            .filter(|event| event.event_category == EventCategory::AgentRequest)
            .collect();
        let responses: Vec<&LifecycleEvent> = events
            .iter()
            .filter(|event| event.event_category == EventCategory::AgentResponse)
            .collect();

        assert_eq!(requests.len(), 1);
        assert_eq!(responses.len(), 1);
        assert_eq!(requests[0].call_id, responses[0].call_id);
    }

    #[tokio::test]
    async fn shutdown_releases_capability_subscription() {
        let shell = running_shell().await;
        shell.shutdown().await;
    }
}
