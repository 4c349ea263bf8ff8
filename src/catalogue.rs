//! Capability Catalogue (spec §4.2)
//!
//! Per-process registry of locally-hosted and remotely-discovered function
//! descriptors, indexed by id, by (provider, name), and by category.
//! Grounded on the teacher's `AgentRegistry` in `agent.rs`: the same
//! `Arc<DashMap<..>>` plus secondary capability-index idiom, generalized
//! from agent capabilities to function descriptors.

use crate::domain_types::{Category, FunctionId, FunctionName, MillisTimestamp, ProviderId, ServiceName};
use crate::error::CatalogueError;
use crate::monitoring::MonitoringEmitter;
use crate::transport::{SampleSink, Transport};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The primitive type a single parameter validates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// An arbitrary string.
    Text,
    /// Any JSON number.
    Number,
    /// A JSON number with no fractional component.
    Integer,
}

/// One parameter's validation rule, closed over the three kinds spec §3
/// names. `required` and `pattern` apply across kinds; bounds are
/// kind-specific (`min_length`/`max_length` for text, `minimum`/`maximum`
/// for numerics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// The parameter's declared kind.
    pub kind: ParameterKind,
    /// Whether the parameter must be present in every call's arguments.
    pub required: bool,
    /// Minimum character length, `Text` only.
    pub min_length: Option<usize>,
    /// Maximum character length, `Text` only.
    pub max_length: Option<usize>,
    /// A regular expression the value must fully match, `Text` only.
    pub pattern: Option<String>,
    /// Inclusive lower bound, `Number`/`Integer` only.
    pub minimum: Option<f64>,
    /// Inclusive upper bound, `Number`/`Integer` only.
    pub maximum: Option<f64>,
}

impl ParameterSpec {
    /// Compiles the `pattern`, if any, once per call site. Catalogue
    /// registration calls this eagerly to reject a malformed pattern at
    /// registration time, per spec's meta-schema-at-registration invariant.
    pub fn compiled_pattern(&self) -> Result<Option<Regex>, regex::Error> {
        self.pattern.as_deref().map(Regex::new).transpose()
    }
}

/// A shorthand selecting one of the built-in validation templates spec §4.4
/// names, instead of spelling out a full [`ParameterSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommonPattern {
    /// Unconstrained text.
    Text,
    /// Exactly one alphabetic character.
    Letter,
    /// An integer in `1..=1000`.
    Count,
    /// An unconstrained number.
    Number,
}

impl CommonPattern {
    /// Expands this shorthand into the concrete [`ParameterSpec`] it stands for.
    #[must_use]
    pub fn expand(self, required: bool) -> ParameterSpec {
        match self {
            CommonPattern::Text => ParameterSpec {
                kind: ParameterKind::Text,
                required,
                min_length: None,
                max_length: None,
                pattern: None,
                minimum: None,
                maximum: None,
            },
            CommonPattern::Letter => ParameterSpec {
                kind: ParameterKind::Text,
                required,
                min_length: Some(1),
                max_length: Some(1),
                pattern: Some("^[A-Za-z]$".to_string()),
                minimum: None,
                maximum: None,
            },
            CommonPattern::Count => ParameterSpec {
                kind: ParameterKind::Integer,
                required,
                min_length: None,
                max_length: None,
                pattern: None,
                minimum: Some(1.0),
                maximum: Some(1000.0),
            },
            CommonPattern::Number => ParameterSpec {
                kind: ParameterKind::Number,
                required,
                min_length: None,
                max_length: None,
                pattern: None,
                minimum: None,
                maximum: None,
            },
        }
    }
}

/// The unit of advertisement: one callable capability (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Globally unique identifier, assigned at registration.
    pub function_id: FunctionId,
    /// Human-visible name, unique per provider.
    pub name: FunctionName,
    /// Prose description used by the matcher.
    pub description: String,
    /// Stable identity of the hosting process.
    pub provider_id: ProviderId,
    /// Logical service this function belongs to.
    pub service_name: ServiceName,
    /// Per-parameter validation rules.
    pub parameter_schema: HashMap<String, ParameterSpec>,
    /// Category tags used for category indexing.
    pub categories: Vec<Category>,
    /// Opaque, forwarded-only metadata.
    pub performance_metrics: serde_json::Value,
    /// Opaque, forwarded-only, never enforced by the core.
    pub security_requirements: serde_json::Value,
    /// Parameter-name to built-in-template shorthand.
    pub common_patterns: HashMap<String, CommonPattern>,
    /// Timestamp of the most recent advertisement, for staleness.
    pub last_seen: MillisTimestamp,
}

impl FunctionDescriptor {
    /// The effective schema: `common_patterns` expanded, with explicit
    /// `parameter_schema` entries taking precedence on name collision.
    #[must_use]
    pub fn effective_schema(&self) -> HashMap<String, ParameterSpec> {
        let mut schema: HashMap<String, ParameterSpec> = self
            .common_patterns
            .iter()
            .map(|(name, pattern)| (name.clone(), pattern.expand(true)))
            .collect();
        for (name, spec) in &self.parameter_schema {
            schema.insert(name.clone(), spec.clone());
        }
        schema
    }
}

/// The wire form of a [`FunctionDescriptor`], published on `FunctionCapability`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityAdvertisement {
    /// The descriptor instance this sample carries.
    #[serde(flatten)]
    pub descriptor: FunctionDescriptor,
    /// The late-joiner durability key: this descriptor's stringified `function_id`.
    pub durability_key: String,
}

impl CapabilityAdvertisement {
    fn from_descriptor(descriptor: FunctionDescriptor) -> Self {
        let durability_key = descriptor.function_id.to_string();
        Self {
            descriptor,
            durability_key,
        }
    }
}

/// Parameters for registering a locally-hosted function, grouped to avoid
/// an unwieldy positional argument list (the teacher's `FipaMessageParams`
/// pattern in `message_router/domain_types.rs`).
pub struct RegisterLocalParams {
    /// Human-visible name, unique among this provider's own functions.
    pub name: FunctionName,
    /// Prose description used by the matcher.
    pub description: String,
    /// Logical service this function belongs to.
    pub service_name: ServiceName,
    /// Per-parameter validation rules.
    pub parameter_schema: HashMap<String, ParameterSpec>,
    /// Category tags used for category indexing.
    pub categories: Vec<Category>,
    /// Parameter-name to built-in-template shorthand.
    pub common_patterns: HashMap<String, CommonPattern>,
    /// Opaque, forwarded-only metadata.
    pub performance_metrics: serde_json::Value,
    /// Opaque, forwarded-only metadata.
    pub security_requirements: serde_json::Value,
}

/// Per-process registry of function descriptors: `function_by_id`,
/// `function_by_name`, `function_by_category`, and `discovered_functions`
/// (the remote view), exactly as spec §4.2 names them.
pub struct Catalogue {
    provider_id: ProviderId,
    transport: Arc<dyn Transport>,
    monitoring: Arc<MonitoringEmitter>,
    function_by_id: Arc<DashMap<FunctionId, FunctionDescriptor>>,
    function_by_name: Arc<DashMap<(ProviderId, String), FunctionId>>,
    function_by_category: Arc<DashMap<String, Vec<FunctionId>>>,
    discovered_functions: Arc<DashMap<FunctionId, FunctionDescriptor>>,
    heartbeat_started: Arc<AtomicBool>,
}

impl Catalogue {
    /// Creates an empty catalogue bound to one transport identity.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, monitoring: Arc<MonitoringEmitter>) -> Self {
        let provider_id = transport.process_identity();
        Self {
            provider_id,
            transport,
            monitoring,
            function_by_id: Arc::new(DashMap::new()),
            function_by_name: Arc::new(DashMap::new()),
            function_by_category: Arc::new(DashMap::new()),
            discovered_functions: Arc::new(DashMap::new()),
            heartbeat_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns, at most once per catalogue (shared across clones), a
    /// background task that re-asserts this process's liveliness at a
    /// fraction of the transport's lease — the heartbeat that keeps this
    /// provider's functions alive in every other process's catalogue.
    /// Idempotent: called automatically on a provider's first local
    /// registration, so callers never need to invoke it directly.
    fn ensure_liveliness_heartbeat(&self) {
        if self
            .heartbeat_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let transport = self.transport.clone();
        let provider_id = self.provider_id;
        let interval = (transport.liveliness_lease() / 3).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                transport.assert_liveliness(provider_id).await;
            }
        });
    }

    /// Validates schema shape, allocates an id, stores the descriptor,
    /// publishes an advertisement, and emits `READY` for the function.
    #[instrument(skip(self, params), fields(name = %params.name))]
    pub async fn register_local(
        &self,
        params: RegisterLocalParams,
    ) -> Result<FunctionId, CatalogueError> {
        let key = (self.provider_id, params.name.to_string());
        if self.function_by_name.contains_key(&key) {
            return Err(CatalogueError::DuplicateName(params.name.to_string()));
        }

        for (param_name, spec) in &params.parameter_schema {
            if let Err(err) = spec.compiled_pattern() {
                return Err(CatalogueError::InvalidSchema(param_name.clone(), err.to_string()));
            }
        }

        let function_id = FunctionId::generate();
        let descriptor = FunctionDescriptor {
            function_id,
            name: params.name,
            description: params.description,
            provider_id: self.provider_id,
            service_name: params.service_name,
            parameter_schema: params.parameter_schema,
            categories: params.categories,
            performance_metrics: params.performance_metrics,
            security_requirements: params.security_requirements,
            common_patterns: params.common_patterns,
            last_seen: MillisTimestamp::now(),
        };

        self.function_by_id.insert(function_id, descriptor.clone());
        self.function_by_name.insert(key, function_id);
        for category in &descriptor.categories {
            self.function_by_category
                .entry(category.to_string())
                .or_default()
                .push(function_id);
        }

        self.publish_advertisement(&descriptor).await;
        self.transport.assert_liveliness(self.provider_id).await;
        self.ensure_liveliness_heartbeat();

        self.monitoring.emit_state_change(
            crate::monitoring::ComponentType::Function,
            function_id.to_string(),
            None,
            "READY",
            "registered",
        );

        Ok(function_id)
    }

    async fn publish_advertisement(&self, descriptor: &FunctionDescriptor) {
        let advertisement = CapabilityAdvertisement::from_descriptor(descriptor.clone());
        let payload = match serde_json::to_vec(&advertisement) {
            Ok(bytes) => bytes::Bytes::from(bytes),
            Err(err) => {
                warn!(error = %err, "failed to serialize capability advertisement");
                return;
            }
        };
        if let Err(err) = self
            .transport
            .publish(crate::domain_types::topics::FUNCTION_CAPABILITY, payload)
            .await
        {
            // Publish failures never fail registration; retried on the next
            // liveliness tick per spec §4.2's failure semantics.
            warn!(error = %err, "advertisement publish failed, will retry on next liveliness tick");
        }
    }

    /// Applies one incoming `CapabilityAdvertisement`. Self-originated
    /// samples are ignored; unknown functions are inserted with
    /// `NODE_DISCOVERY` + `EDGE_DISCOVERY`; stale samples are dropped;
    /// newer samples for a known id are merged.
    #[instrument(skip(self, advertisement), fields(function_id = %advertisement.descriptor.function_id))]
    pub fn on_advertisement(&self, advertisement: CapabilityAdvertisement) {
        let descriptor = advertisement.descriptor;
        if descriptor.provider_id == self.provider_id {
            return;
        }

        match self.discovered_functions.get(&descriptor.function_id) {
            None => {
                self.discovered_functions
                    .insert(descriptor.function_id, descriptor.clone());
                self.monitoring.emit_node_discovery(
                    crate::monitoring::ComponentType::Function,
                    descriptor.function_id.to_string(),
                );
                self.monitoring.emit_edge_discovery(
                    self.provider_id.to_string(),
                    descriptor.provider_id.to_string(),
                    "CONNECTS_TO",
                );
                info!(name = %descriptor.name, provider = %descriptor.provider_id, "discovered remote function");
            }
            Some(existing) if descriptor.last_seen <= existing.last_seen => {
                debug!(function_id = %descriptor.function_id, "dropping stale advertisement");
            }
            Some(_) => {
                self.discovered_functions
                    .insert(descriptor.function_id, descriptor);
            }
        }
    }

    /// Removes every remotely-discovered function owned by `provider_id`
    /// and emits a node-removal event for each.
    #[instrument(skip(self))]
    pub fn on_liveliness_lost(&self, provider_id: ProviderId) {
        let lost: Vec<FunctionId> = self
            .discovered_functions
            .iter()
            .filter(|entry| entry.value().provider_id == provider_id)
            .map(|entry| *entry.key())
            .collect();

        for function_id in lost {
            self.discovered_functions.remove(&function_id);
            self.monitoring.emit_state_change(
                crate::monitoring::ComponentType::Function,
                function_id.to_string(),
                Some("READY"),
                "REMOVED",
                "provider liveliness lost",
            );
        }
    }

    /// Looks up a function by name across both local and discovered sets.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<FunctionDescriptor> {
        self.function_by_id
            .iter()
            .find(|entry| entry.value().name.as_ref() == name)
            .map(|entry| entry.value().clone())
            .or_else(|| {
                self.discovered_functions
                    .iter()
                    .find(|entry| entry.value().name.as_ref() == name)
                    .map(|entry| entry.value().clone())
            })
    }

    /// Looks up a function by its id across both local and discovered sets.
    #[must_use]
    pub fn find_by_id(&self, function_id: FunctionId) -> Option<FunctionDescriptor> {
        self.function_by_id
            .get(&function_id)
            .map(|entry| entry.value().clone())
            .or_else(|| {
                self.discovered_functions
                    .get(&function_id)
                    .map(|entry| entry.value().clone())
            })
    }

    /// Lists every descriptor tagged with `tag`, ordered `(provider_id, name)`
    /// lexical ascending, per spec's stated tie-break rule.
    #[must_use]
    pub fn list_by_category(&self, tag: &str) -> Vec<FunctionDescriptor> {
        let mut results: Vec<FunctionDescriptor> = self.all_internal();
        results.retain(|descriptor| descriptor.categories.iter().any(|c| c.as_ref() == tag));
        sort_by_provider_then_name(&mut results);
        results
    }

    /// All known descriptors, local and discovered, `(provider_id, name)` ordered.
    #[must_use]
    pub fn all(&self) -> Vec<FunctionDescriptor> {
        let mut results = self.all_internal();
        sort_by_provider_then_name(&mut results);
        results
    }

    fn all_internal(&self) -> Vec<FunctionDescriptor> {
        self.function_by_id
            .iter()
            .map(|entry| entry.value().clone())
            .chain(self.discovered_functions.iter().map(|entry| entry.value().clone()))
            .collect()
    }

    /// Delegates to [`crate::matcher::Matcher::select`] over an immutable
    /// snapshot of [`Catalogue::all`], per spec §4.2's `matching` operation.
    /// The snapshot handed to the matcher is an owned clone, never a live
    /// reference into the catalogue's indices (spec §9's ownership note).
    pub async fn matching(
        &self,
        request: &str,
        min_score: f64,
        oracle: Option<&dyn crate::matcher::Oracle>,
    ) -> Vec<crate::matcher::MatchResult> {
        let snapshot = self.all();
        crate::matcher::Matcher::select(request, &snapshot, oracle, min_score).await
    }
}

fn sort_by_provider_then_name(descriptors: &mut [FunctionDescriptor]) {
    descriptors.sort_by(|a, b| {
        (a.provider_id.to_string(), a.name.to_string())
            .cmp(&(b.provider_id.to_string(), b.name.to_string()))
    });
}

/// Feeds incoming `FunctionCapability` samples into a [`Catalogue`]; bound
/// to a transport subscription at agent/service construction time.
pub struct CapabilitySink {
    catalogue: Arc<CatalogueHandle>,
}

/// A cheaply-cloneable handle wrapping the pieces a [`CapabilitySink`]
/// needs without borrowing the whole [`Catalogue`].
pub struct CatalogueHandle {
    on_advertisement: Box<dyn Fn(CapabilityAdvertisement) + Send + Sync>,
    on_liveliness_lost: Box<dyn Fn(ProviderId) + Send + Sync>,
}

impl CapabilitySink {
    /// Wraps `catalogue` in a [`SampleSink`] for transport subscription.
    #[must_use]
    pub fn new(catalogue: Arc<Catalogue>) -> Self {
        let register = catalogue.clone();
        let remove = catalogue;
        Self {
            catalogue: Arc::new(CatalogueHandle {
                on_advertisement: Box::new(move |advertisement| register.on_advertisement(advertisement)),
                on_liveliness_lost: Box::new(move |provider_id| remove.on_liveliness_lost(provider_id)),
            }),
        }
    }
}

impl SampleSink for CapabilitySink {
    fn on_sample(&self, _topic: &str, sample: bytes::Bytes) {
        match serde_json::from_slice::<CapabilityAdvertisement>(&sample) {
            Ok(advertisement) => (self.catalogue.on_advertisement)(advertisement),
            Err(err) => warn!(error = %err, "malformed capability advertisement, dropping"),
        }
    }

    fn on_liveliness_change(&self, provider_id: ProviderId, alive: bool) {
        if !alive {
            (self.catalogue.on_liveliness_lost)(provider_id);
        }
    }
}

impl Clone for Catalogue {
    fn clone(&self) -> Self {
        Self {
            provider_id: self.provider_id,
            transport: self.transport.clone(),
            monitoring: self.monitoring.clone(),
            function_by_id: self.function_by_id.clone(),
            function_by_name: self.function_by_name.clone(),
            function_by_category: self.function_by_category.clone(),
            discovered_functions: self.discovered_functions.clone(),
            heartbeat_started: self.heartbeat_started.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::MonitoringEmitter;
    use crate::transport::local::LocalTransport;
    use std::time::Duration;

    fn test_catalogue() -> Catalogue {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(Duration::from_secs(5)));
        let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), crate::monitoring::ComponentType::Agent));
        Catalogue::new(transport, monitoring)
    }

    fn register_params(name: &str) -> RegisterLocalParams {
        RegisterLocalParams {
            name: FunctionName::try_new(name).unwrap(),
            description: format!("does {name}"),
            service_name: ServiceName::try_new("Calculator").unwrap(),
            parameter_schema: HashMap::new(),
            categories: vec![Category::try_new("math").unwrap()],
            common_patterns: HashMap::new(),
            performance_metrics: serde_json::json!({}),
            security_requirements: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn register_local_assigns_id_and_is_findable() {
        let catalogue = test_catalogue();
        let id = catalogue.register_local(register_params("add")).await.unwrap();
        let found = catalogue.find("add").unwrap();
        assert_eq!(found.function_id, id);
    }

    #[tokio::test]
    async fn register_local_rejects_duplicate_name() {
        let catalogue = test_catalogue();
        catalogue.register_local(register_params("add")).await.unwrap();
        let err = catalogue.register_local(register_params("add")).await.unwrap_err();
        assert!(matches!(err, CatalogueError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn list_by_category_is_ordered_by_provider_then_name() {
        let catalogue = test_catalogue();
        catalogue.register_local(register_params("subtract")).await.unwrap();
        catalogue.register_local(register_params("add")).await.unwrap();
        let listed = catalogue.list_by_category("math");
        assert_eq!(listed[0].name.to_string(), "add");
        assert_eq!(listed[1].name.to_string(), "subtract");
    }

    #[test]
    fn common_pattern_letter_expands_to_single_char_text() {
        let spec = CommonPattern::Letter.expand(true);
        assert_eq!(spec.min_length, Some(1));
        assert_eq!(spec.max_length, Some(1));
    }

    #[test]
    fn on_advertisement_ignores_self_originated_samples() {
        let catalogue = test_catalogue();
        let descriptor = FunctionDescriptor {
            function_id: FunctionId::generate(),
            name: FunctionName::try_new("echo").unwrap(),
            description: "echo".to_string(),
            provider_id: catalogue.provider_id,
            service_name: ServiceName::try_new("Echo").unwrap(),
            parameter_schema: HashMap::new(),
            categories: vec![],
            performance_metrics: serde_json::json!({}),
            security_requirements: serde_json::json!({}),
            common_patterns: HashMap::new(),
            last_seen: MillisTimestamp::now(),
        };
        catalogue.on_advertisement(CapabilityAdvertisement::from_descriptor(descriptor));
        assert!(catalogue.discovered_functions.is_empty());
    }
}
