//! Monitoring Emitter (spec §4.6)
//!
//! Publishes the best-effort event stream that lets an external observer
//! reconstruct the live agent/function/interface graph: node and edge
//! discovery, state transitions, and per-chain correlation. Grounded on the
//! teacher's `AgentLifecycleManager` in `lifecycle.rs`: an
//! `mpsc::UnboundedSender` feeding a background task that does the actual
//! publishing, simplified (no batching, no recovery loop) because spec marks
//! these events fire-and-forget.

use crate::domain_types::{CallId, ChainId, EventId, MillisTimestamp};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// The three kinds of component a lifecycle event can describe (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentType {
    /// An agent shell process.
    Agent,
    /// A single registered function.
    Function,
    /// An agent specialized as a human-facing front-end.
    Interface,
}

/// Closed set of event categories spec §3/§4.6 name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    /// A new node (function or provider) entered the local view.
    NodeDiscovery,
    /// A new edge between two components was observed.
    EdgeDiscovery,
    /// A component transitioned from one named state to another.
    StateChange,
    /// An agent shell began construction.
    AgentInit,
    /// An agent shell finished construction and is serving requests.
    AgentReady,
    /// A request entered an agent shell's `process_request`.
    AgentRequest,
    /// A reply left an agent shell's `process_request`.
    AgentResponse,
    /// A periodic keepalive emitted while a component stays in one state.
    AgentStatus,
}

impl EventCategory {
    fn primary_topic(self) -> &'static str {
        match self {
            EventCategory::AgentRequest | EventCategory::AgentResponse | EventCategory::AgentStatus => {
                crate::domain_types::topics::MONITORING_EVENT
            }
            _ => crate::domain_types::topics::COMPONENT_LIFECYCLE_EVENT,
        }
    }
}

/// Nodes, edges, and state changes of the live system (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Freshly generated at emission time, never at enqueue time.
    pub event_id: EventId,
    /// Milliseconds since epoch, captured at emission time.
    pub timestamp: MillisTimestamp,
    /// What kind of thing this event describes.
    pub event_category: EventCategory,
    /// The component this event is primarily about.
    pub component_id: String,
    /// The kind of component `component_id` names.
    pub component_type: ComponentType,
    /// Prior named state, for `StateChange` events.
    pub previous_state: Option<String>,
    /// New named state, for `StateChange` events.
    pub new_state: Option<String>,
    /// Human-readable cause; also carries edge relation types (`CONNECTS_TO`).
    pub reason: Option<String>,
    /// Opaque, forwarded-only metadata blob.
    pub capabilities: Option<serde_json::Value>,
    /// Correlates this event with others from the same user request.
    pub chain_id: Option<ChainId>,
    /// Correlates this event with a specific RPC call.
    pub call_id: Option<CallId>,
    /// For `EdgeDiscovery`: the edge's source component.
    pub source_id: Option<String>,
    /// For `EdgeDiscovery`: the edge's target component.
    pub target_id: Option<String>,
    /// This emitter's own component kind, fixed for the emitter's lifetime —
    /// distinct from `component_type`, which names the event's subject (e.g.
    /// an `EdgeDiscovery` event's `component_type` is the far end of the
    /// edge, not the process that observed it).
    pub entity_type: ComponentType,
    /// This emitter's own component id, always the emitting process.
    pub entity_id: String,
}

/// Fields supplied at emission time; `event_id`/`timestamp`/`entity_*` are
/// filled in by the background task so causally-ordered emissions from one
/// emitter keep increasing timestamps even under queuing delay.
struct EventDraft {
    event_category: EventCategory,
    component_id: String,
    component_type: ComponentType,
    previous_state: Option<String>,
    new_state: Option<String>,
    reason: Option<String>,
    capabilities: Option<serde_json::Value>,
    chain_id: Option<ChainId>,
    call_id: Option<CallId>,
    source_id: Option<String>,
    target_id: Option<String>,
}

/// Thin wrapper over an `mpsc::UnboundedSender<EventDraft>` plus a background
/// task that stamps, serializes, and publishes — the same shape as the
/// teacher's `AgentLifecycleManager::process_lifecycle_events`.
pub struct MonitoringEmitter {
    sender: mpsc::UnboundedSender<EventDraft>,
}

impl MonitoringEmitter {
    /// Spawns the background publishing task and returns the emitter handle.
    ///
    /// `entity_type` is this emitter's own fixed component kind, stamped on
    /// every event regardless of what that event's `component_type`/
    /// `component_id` describe.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, entity_type: ComponentType) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<EventDraft>();
        let entity_id = transport.process_identity().to_string();

        tokio::spawn(async move {
            while let Some(draft) = receiver.recv().await {
                let event = LifecycleEvent {
                    event_id: EventId::generate(),
                    timestamp: MillisTimestamp::now(),
                    event_category: draft.event_category,
                    component_id: draft.component_id,
                    component_type: draft.component_type,
                    previous_state: draft.previous_state,
                    new_state: draft.new_state,
                    reason: draft.reason,
                    capabilities: draft.capabilities,
                    chain_id: draft.chain_id,
                    call_id: draft.call_id,
                    source_id: draft.source_id,
                    target_id: draft.target_id,
                    entity_type,
                    entity_id: entity_id.clone(),
                };

                let payload = match serde_json::to_vec(&event) {
                    Ok(bytes) => bytes::Bytes::from(bytes),
                    Err(err) => {
                        warn!(error = %err, "failed to serialize lifecycle event, dropping");
                        continue;
                    }
                };

                // Best-effort: publish failures never propagate to callers.
                if let Err(err) = transport.publish(event.event_category.primary_topic(), payload.clone()).await {
                    warn!(error = %err, category = ?event.event_category, "monitoring publish failed");
                }

                if event.chain_id.is_some() {
                    if let Err(err) = transport
                        .publish(crate::domain_types::topics::CHAIN_EVENT, payload)
                        .await
                    {
                        warn!(error = %err, "chain event publish failed");
                    }
                }
            }
        });

        Self { sender }
    }

    fn send(&self, draft: EventDraft) {
        if self.sender.send(draft).is_err() {
            warn!("monitoring channel closed, dropping event");
        }
    }

    /// Emits a `NODE_DISCOVERY` event for a newly observed component.
    pub fn emit_node_discovery(&self, component_type: ComponentType, component_id: String) {
        self.send(EventDraft {
            event_category: EventCategory::NodeDiscovery,
            component_id,
            component_type,
            previous_state: None,
            new_state: None,
            reason: None,
            capabilities: None,
            chain_id: None,
            call_id: None,
            source_id: None,
            target_id: None,
        });
    }

    /// Emits an `EDGE_DISCOVERY` event between two components.
    pub fn emit_edge_discovery(&self, source_id: String, target_id: String, relation: &str) {
        self.send(EventDraft {
            event_category: EventCategory::EdgeDiscovery,
            component_id: target_id.clone(),
            component_type: ComponentType::Function,
            previous_state: None,
            new_state: None,
            reason: Some(relation.to_string()),
            capabilities: None,
            chain_id: None,
            call_id: None,
            source_id: Some(source_id),
            target_id: Some(target_id),
        });
    }

    /// Emits a `STATE_CHANGE` event for `component_id`'s transition.
    pub fn emit_state_change(
        &self,
        component_type: ComponentType,
        component_id: String,
        previous_state: Option<&str>,
        new_state: &str,
        reason: &str,
    ) {
        self.send(EventDraft {
            event_category: EventCategory::StateChange,
            component_id,
            component_type,
            previous_state: previous_state.map(str::to_string),
            new_state: Some(new_state.to_string()),
            reason: Some(reason.to_string()),
            capabilities: None,
            chain_id: None,
            call_id: None,
            source_id: None,
            target_id: None,
        });
    }

    /// Emits `AGENT_INIT` at the start of agent shell construction.
    pub fn emit_agent_init(&self, component_id: String) {
        self.send(EventDraft {
            event_category: EventCategory::AgentInit,
            component_id,
            component_type: ComponentType::Agent,
            previous_state: None,
            new_state: Some("INITIALIZING".to_string()),
            reason: None,
            capabilities: None,
            chain_id: None,
            call_id: None,
            source_id: None,
            target_id: None,
        });
    }

    /// Emits `AGENT_READY` once an agent shell is fully constructed.
    pub fn emit_agent_ready(&self, component_id: String) {
        self.send(EventDraft {
            event_category: EventCategory::AgentReady,
            component_id,
            component_type: ComponentType::Agent,
            previous_state: Some("INITIALIZING".to_string()),
            new_state: Some("READY".to_string()),
            reason: None,
            capabilities: None,
            chain_id: None,
            call_id: None,
            source_id: None,
            target_id: None,
        });
    }

    /// Emits `AGENT_REQUEST` on entry to `process_request`.
    pub fn emit_agent_request(&self, component_id: String, call_id: CallId, chain_id: ChainId) {
        self.send(EventDraft {
            event_category: EventCategory::AgentRequest,
            component_id,
            component_type: ComponentType::Agent,
            previous_state: None,
            new_state: None,
            reason: None,
            capabilities: None,
            chain_id: Some(chain_id),
            call_id: Some(call_id),
            source_id: None,
            target_id: None,
        });
    }

    /// Emits `AGENT_RESPONSE` on exit from `process_request`, with the
    /// same `call_id` the matching `AGENT_REQUEST` carried.
    pub fn emit_agent_response(
        &self,
        component_id: String,
        call_id: CallId,
        chain_id: ChainId,
        status: &str,
    ) {
        self.send(EventDraft {
            event_category: EventCategory::AgentResponse,
            component_id,
            component_type: ComponentType::Agent,
            previous_state: None,
            new_state: Some(status.to_string()),
            reason: None,
            capabilities: None,
            chain_id: Some(chain_id),
            call_id: Some(call_id),
            source_id: None,
            target_id: None,
        });
    }

    /// Emits a periodic `AGENT_STATUS` keepalive while a component remains `READY`.
    pub fn emit_keepalive(&self, component_type: ComponentType, component_id: String, state: &str) {
        self.send(EventDraft {
            event_category: EventCategory::AgentStatus,
            component_id,
            component_type,
            previous_state: Some(state.to_string()),
            new_state: Some(state.to_string()),
            reason: Some("keepalive".to_string()),
            capabilities: None,
            chain_id: None,
            call_id: None,
            source_id: None,
            target_id: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalTransport;
    use crate::transport::{SampleSink, SubscriptionHandle};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSink {
        count: AtomicUsize,
    }

    impl SampleSink for CountingSink {
        fn on_sample(&self, _topic: &str, _sample: bytes::Bytes) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn on_liveliness_change(&self, _provider_id: crate::domain_types::ProviderId, _alive: bool) {}
    }

    #[tokio::test]
    async fn state_change_reaches_component_lifecycle_topic() {
        let transport: Arc<dyn crate::transport::Transport> =
            Arc::new(LocalTransport::new(Duration::from_secs(5)));
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
        });
        let _handle: SubscriptionHandle = transport
            .subscribe(crate::domain_types::topics::COMPONENT_LIFECYCLE_EVENT, sink.clone())
            .await
            .unwrap();

        let emitter = MonitoringEmitter::new(transport, ComponentType::Agent);
        emitter.emit_state_change(ComponentType::Function, "fn-1".to_string(), None, "READY", "registered");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chain_scoped_event_is_duplicated_onto_chain_topic() {
        let transport: Arc<dyn crate::transport::Transport> =
            Arc::new(LocalTransport::new(Duration::from_secs(5)));
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
        });
        transport
            .subscribe(crate::domain_types::topics::CHAIN_EVENT, sink.clone())
            .await
            .unwrap();

        let emitter = MonitoringEmitter::new(transport, ComponentType::Agent);
        emitter.emit_agent_request("agent-1".to_string(), CallId::generate(), ChainId::generate());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
    }
}
