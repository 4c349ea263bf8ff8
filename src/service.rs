//! RPC Service Loop (spec §4.4)
//!
//! Hosts a set of registered functions behind one `service_name`, accepting
//! requests over the Transport Abstraction, validating arguments against
//! each function's schema, dispatching to handlers, and replying on the
//! same correlator. Grounded on the teacher's `AgentLifecycleManager`
//! background-task shape in `lifecycle.rs`, with the state machine
//! expressed as an explicit enum whose `transition` method is the sole
//! path to mutate state and emit the corresponding lifecycle event.

use crate::catalogue::{Catalogue, CommonPattern, ParameterKind, ParameterSpec, RegisterLocalParams};
use crate::domain_types::{Category, FunctionId, FunctionName, ServiceName, DISCOVERY_FUNCTION_NAME};
use crate::error::{CatalogueError, FabricError, HandlerError, TransportError};
use crate::monitoring::{ComponentType, MonitoringEmitter};
use crate::transport::{RequestEndpoint, ReplyEndpoint, Transport};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// One service-hosted function: `async fn call(args) -> Result<Value, HandlerError>`.
/// The handler may do synchronous work or await a deferred result; the loop
/// always awaits completion before replying.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Invokes the handler with its parsed, schema-validated keyword arguments.
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError>;
}

/// Per-service request/reply pair (spec §3). `arguments`/`result` are raw
/// JSON text, matching spec's "serialized …  blob" wording for the wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Name of the function to invoke, or `"discovery"`.
    pub function_name: String,
    /// Raw JSON object text of keyword arguments.
    pub arguments: String,
}

/// Per-service request/reply pair (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReply {
    /// Whether the call completed without error.
    pub success: bool,
    /// Raw JSON text of the handler's return value, present iff `success`.
    pub result: Option<String>,
    /// Human-readable failure explanation, present iff `!success`.
    pub error_message: Option<String>,
}

impl RpcReply {
    fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result.to_string()),
            error_message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error_message: Some(message.into()),
        }
    }
}

/// The service's own lifecycle, spec §4.4: `OFFLINE → JOINING →
/// DISCOVERING → READY → (BUSY ⇄ READY) → DEGRADED? → OFFLINE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not yet started.
    Offline,
    /// Opening transport endpoints.
    Joining,
    /// Subscribing to the capability topic / publishing own advertisements.
    Discovering,
    /// Idle, ready to accept requests.
    Ready,
    /// Actively handling a request.
    Busy,
    /// A non-fatal degradation (reserved for future health signals).
    Degraded,
}

impl ServiceState {
    fn label(self) -> &'static str {
        match self {
            ServiceState::Offline => "OFFLINE",
            ServiceState::Joining => "JOINING",
            ServiceState::Discovering => "DISCOVERING",
            ServiceState::Ready => "READY",
            ServiceState::Busy => "BUSY",
            ServiceState::Degraded => "DEGRADED",
        }
    }
}

struct RegisteredFunction {
    descriptor: crate::catalogue::FunctionDescriptor,
    handler: Arc<dyn FunctionHandler>,
}

/// Hosts a set of registered functions behind one `service_name`.
pub struct Service {
    service_name: ServiceName,
    catalogue: Arc<Catalogue>,
    transport: Arc<dyn Transport>,
    monitoring: Arc<MonitoringEmitter>,
    functions: Arc<DashMap<String, RegisteredFunction>>,
    state: RwLock<ServiceState>,
}

impl Service {
    /// Creates an idle (`OFFLINE`) service hosting no functions yet.
    #[must_use]
    pub fn new(
        service_name: ServiceName,
        catalogue: Arc<Catalogue>,
        transport: Arc<dyn Transport>,
        monitoring: Arc<MonitoringEmitter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            service_name,
            catalogue,
            transport,
            monitoring,
            functions: Arc::new(DashMap::new()),
            state: RwLock::new(ServiceState::Offline),
        })
    }

    fn transition(&self, to: ServiceState, reason: &str) {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            let previous = *state;
            *state = to;
            previous
        };
        self.monitoring.emit_state_change(
            ComponentType::Agent,
            self.service_name.to_string(),
            Some(previous.label()),
            to.label(),
            reason,
        );
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers one locally-hosted function: validates and stores it in
    /// the catalogue, then binds `handler` so incoming requests can dispatch
    /// to it.
    #[instrument(skip(self, handler, parameter_schema, common_patterns), fields(service = %self.service_name, name = %name))]
    pub async fn register_function(
        &self,
        name: &str,
        description: &str,
        parameter_schema: HashMap<String, ParameterSpec>,
        categories: Vec<&str>,
        common_patterns: HashMap<String, CommonPattern>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<FunctionId, CatalogueError> {
        let params = RegisterLocalParams {
            name: FunctionName::try_new(name).map_err(|e| CatalogueError::InvalidSchema(name.to_string(), e.to_string()))?,
            description: description.to_string(),
            service_name: self.service_name.clone(),
            parameter_schema,
            categories: categories
                .into_iter()
                .filter_map(|c| Category::try_new(c).ok())
                .collect(),
            common_patterns,
            performance_metrics: serde_json::json!({}),
            security_requirements: serde_json::json!({}),
        };

        let function_id = self.catalogue.register_local(params).await?;
        let descriptor = self
            .catalogue
            .find_by_id(function_id)
            .expect("just-registered descriptor must be present");

        self.functions.insert(
            name.to_string(),
            RegisteredFunction { descriptor, handler },
        );

        Ok(function_id)
    }

    /// Opens this service's reply endpoint, runs JOINING/DISCOVERING/READY,
    /// and spawns the request loop plus the periodic keepalive task.
    pub async fn start(self: &Arc<Self>) -> Result<(), crate::error::TransportError> {
        self.transition(ServiceState::Joining, "opening reply endpoint");
        let endpoint = self.transport.open_reply_endpoint(self.service_name.as_ref()).await?;

        self.transition(ServiceState::Discovering, "advertising registered functions");
        // Local functions were already advertised individually at
        // register_function time; this edge exists to mark the phase
        // boundary spec's state machine names explicitly.

        self.transition(ServiceState::Ready, "accepting requests");

        let loop_self = self.clone();
        let loop_endpoint = endpoint.clone();
        tokio::spawn(async move {
            loop_self.run_loop(loop_endpoint).await;
        });

        let keepalive_self = self.clone();
        tokio::spawn(async move {
            keepalive_self.run_keepalive().await;
        });

        Ok(())
    }

    async fn run_loop(self: Arc<Self>, endpoint: ReplyEndpoint) {
        loop {
            match self.transport.receive_request(&endpoint).await {
                Ok((call_id, payload)) => {
                    let service = self.clone();
                    let endpoint = endpoint.clone();
                    tokio::spawn(async move {
                        service.handle_one(endpoint, call_id, payload).await;
                    });
                }
                Err(err) => {
                    warn!(error = %err, service = %self.service_name, "reply endpoint closed, stopping service loop");
                    return;
                }
            }
        }
    }

    async fn run_keepalive(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            if self.state() == ServiceState::Ready {
                self.monitoring.emit_keepalive(
                    ComponentType::Agent,
                    self.service_name.to_string(),
                    ServiceState::Ready.label(),
                );
            }
        }
    }

    #[instrument(skip(self, payload), fields(service = %self.service_name, %call_id))]
    async fn handle_one(self: Arc<Self>, endpoint: ReplyEndpoint, call_id: crate::domain_types::CallId, payload: bytes::Bytes) {
        self.transition(ServiceState::Busy, "handling request");
        let reply = self.process(payload).await;
        self.transition(ServiceState::Ready, "request complete");

        let reply_bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes::Bytes::from(bytes),
            Err(err) => {
                error!(error = %err, "failed to serialize reply");
                return;
            }
        };

        self.transport.send_reply(&endpoint, call_id, reply_bytes).await;
    }

    async fn process(&self, payload: bytes::Bytes) -> RpcReply {
        let request: RpcRequest = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(err) => return RpcReply::error(format!("Invalid JSON arguments: {err}")),
        };

        if request.function_name == DISCOVERY_FUNCTION_NAME {
            return self.discovery_reply();
        }

        let Some(entry) = self.functions.get(&request.function_name) else {
            return RpcReply::error(format!("Unknown function: {}", request.function_name));
        };

        let arguments: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&request.arguments) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => return RpcReply::error("Invalid JSON arguments: expected an object"),
            Err(err) => return RpcReply::error(format!("Invalid JSON arguments: {err}")),
        };

        let schema = entry.value().descriptor.effective_schema();
        if let Err(violation) = validate_arguments(&schema, &arguments) {
            return RpcReply::error(violation);
        }

        let handler = entry.value().handler.clone();
        drop(entry);

        match handler.call(arguments).await {
            Ok(result) => RpcReply::ok(result),
            Err(HandlerError::Domain(message)) => RpcReply::error(message),
            Err(HandlerError::Internal(message)) => {
                error!(error = %message, function = %request.function_name, "handler failed");
                RpcReply::error(format!("Error executing function: {message}"))
            }
        }
    }

    fn discovery_reply(&self) -> RpcReply {
        let mut catalogue = serde_json::Map::new();
        for entry in self.functions.iter() {
            let descriptor = &entry.value().descriptor;
            catalogue.insert(
                descriptor.name.to_string(),
                serde_json::json!({
                    "description": descriptor.description,
                    "parameters": descriptor.effective_schema(),
                    "operation_type": descriptor
                        .categories
                        .first()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "general".to_string()),
                }),
            );
        }
        info!(service = %self.service_name, count = catalogue.len(), "answered discovery request");
        RpcReply::ok(serde_json::Value::Object(catalogue))
    }
}

/// Walks the schema's parameters in name order, checking required presence
/// first then type-specific bounds, stopping at the first violation, per
/// spec §4.4's ordered rule list.
fn validate_arguments(
    schema: &HashMap<String, ParameterSpec>,
    arguments: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), String> {
    let mut names: Vec<&String> = schema.keys().collect();
    names.sort();

    for name in names {
        let spec = &schema[name];
        let Some(value) = arguments.get(name) else {
            if spec.required {
                return Err(format!("Missing required parameter: {name}"));
            }
            continue;
        };

        validate_value(name, spec, value)?;
    }

    Ok(())
}

fn validate_value(name: &str, spec: &ParameterSpec, value: &serde_json::Value) -> Result<(), String> {
    match spec.kind {
        ParameterKind::Text => {
            let Some(text) = value.as_str() else {
                return Err(format!("Parameter '{name}' must be a string"));
            };
            if let Some(min_length) = spec.min_length {
                if text.chars().count() < min_length {
                    return Err(format!("Parameter '{name}' must be at least {min_length} characters"));
                }
            }
            if let Some(max_length) = spec.max_length {
                if text.chars().count() > max_length {
                    return Err(format!("Parameter '{name}' must be at most {max_length} characters"));
                }
            }
            if let Some(pattern) = &spec.pattern {
                let regex = regex::Regex::new(pattern)
                    .map_err(|e| format!("Parameter '{name}' has an invalid pattern: {e}"))?;
                if !regex.is_match(text) {
                    return Err(format!("Parameter '{name}' does not match required pattern"));
                }
            }
            Ok(())
        }
        ParameterKind::Number | ParameterKind::Integer => {
            let Some(number) = value.as_f64() else {
                return Err(format!("Parameter '{name}' must be a number"));
            };
            if spec.kind == ParameterKind::Integer && value.as_i64().is_none() && value.as_u64().is_none() {
                return Err(format!("Parameter '{name}' must be an integer"));
            }
            if let Some(minimum) = spec.minimum {
                if number < minimum {
                    return Err(format!("Parameter '{name}' must be at least {minimum}"));
                }
            }
            if let Some(maximum) = spec.maximum {
                if number > maximum {
                    return Err(format!("Parameter '{name}' must be at most {maximum}"));
                }
            }
            Ok(())
        }
    }
}

/// The caller side of a service's request/reply pair: opens one
/// [`RequestEndpoint`], issues calls with a wall-clock timeout, and maps
/// every `RpcReply` variant onto the [`FabricError`] taxonomy spec §7
/// names. Grounded on the teacher's thin client wrappers over its
/// `MessageRouter` trait in `message_router/router.rs`.
pub struct ServiceClient {
    transport: Arc<dyn Transport>,
    endpoint: RequestEndpoint,
    timeout: Duration,
}

impl ServiceClient {
    /// Opens a request endpoint addressed to `service_name`. Calls issued
    /// through the returned client default to `timeout` unless overridden
    /// per-call via [`ServiceClient::call_with_timeout`].
    pub async fn connect(
        service_name: &str,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoint = transport.open_request_endpoint(service_name).await?;
        Ok(Self {
            transport,
            endpoint,
            timeout,
        })
    }

    /// Issues one call with this client's default timeout.
    pub async fn call(&self, function_name: &str, arguments: serde_json::Value) -> Result<serde_json::Value, FabricError> {
        self.call_with_timeout(function_name, arguments, self.timeout).await
    }

    /// Issues one call, overriding the wall-clock timeout for this call only.
    #[instrument(skip(self, arguments), fields(function_name))]
    pub async fn call_with_timeout(
        &self,
        function_name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, FabricError> {
        let request = RpcRequest {
            function_name: function_name.to_string(),
            arguments: arguments.to_string(),
        };
        let payload = bytes::Bytes::from(
            serde_json::to_vec(&request).expect("RpcRequest is always representable as JSON"),
        );

        let reply_bytes = self
            .transport
            .send_request(&self.endpoint, payload, timeout)
            .await
            .map_err(|err| match err {
                TransportError::Timeout(duration) => FabricError::Timeout(duration),
                TransportError::UnknownTopic(name) => FabricError::NoProvider(name),
                TransportError::ChannelClosed => FabricError::Timeout(timeout),
                TransportError::Serialization(err) => {
                    FabricError::InvalidArguments(format!("malformed request: {err}"))
                }
            })?;

        let reply: RpcReply = serde_json::from_slice(&reply_bytes)
            .map_err(|err| FabricError::InvalidArguments(format!("malformed reply: {err}")))?;

        if reply.success {
            let value = match reply.result {
                Some(text) => serde_json::from_str(&text)
                    .map_err(|err| FabricError::InvalidArguments(format!("malformed result: {err}")))?,
                None => serde_json::Value::Null,
            };
            Ok(value)
        } else {
            Err(classify_error_message(
                function_name,
                reply.error_message.unwrap_or_default(),
            ))
        }
    }

    /// Polls `catalogue` until at least one descriptor advertises
    /// `service_name`, or `timeout` elapses — spec §5's `wait_for_service`.
    pub async fn wait_for_service(
        catalogue: &Catalogue,
        service_name: &str,
        timeout: Duration,
    ) -> Result<(), FabricError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if catalogue
                .all()
                .iter()
                .any(|descriptor| descriptor.service_name.as_ref() == service_name)
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FabricError::NoProvider(service_name.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

/// Maps a service-produced `error_message` back onto the taxonomy spec §7
/// names. The service loop's own prefixes (`"Unknown function: "`, `"Invalid
/// JSON arguments: "`, `"Error executing function: "`) are the only signal
/// available at the wire boundary; anything else is a domain error.
fn classify_error_message(function_name: &str, message: String) -> FabricError {
    if message.starts_with("Unknown function: ") {
        FabricError::UnknownFunction(function_name.to_string())
    } else if message.starts_with("Invalid JSON arguments")
        || message.starts_with("Missing required parameter")
        || message.starts_with("Parameter '")
    {
        FabricError::InvalidArguments(message)
    } else if let Some(detail) = message.strip_prefix("Error executing function: ") {
        FabricError::HandlerFailure(detail.to_string())
    } else {
        FabricError::DomainError(message)
    }
}
