//! genesis-fabric - reference process for the distributed function-call fabric
//!
//! This is the default entry point: it boots one process's transport
//! identity, registers a small set of example functions (the
//! business-logic handlers spec.md treats as an external collaborator —
//! only their registration contract matters to the core), starts the
//! hosting service, announces an agent shell wrapping the matcher, and
//! optionally serves the admin/observability surface.

use anyhow::Result;
use async_trait::async_trait;
use genesis_fabric::agent::{AgentShell, AgentShellConfig, AgentType, RequestProcessor};
use genesis_fabric::catalogue::{Catalogue, ParameterKind, ParameterSpec};
use genesis_fabric::config::FabricConfig;
use genesis_fabric::domain_types::ServiceName;
use genesis_fabric::error::{FabricError, HandlerError};
use genesis_fabric::monitoring::{ComponentType, MonitoringEmitter};
use genesis_fabric::service::{FunctionHandler, Service};
use genesis_fabric::transport::local::LocalTransport;
use genesis_fabric::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

fn number_param(required: bool) -> ParameterSpec {
    ParameterSpec {
        kind: ParameterKind::Number,
        required,
        min_length: None,
        max_length: None,
        pattern: None,
        minimum: None,
        maximum: None,
    }
}

struct Add;

#[async_trait]
impl FunctionHandler for Add {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let x = args.get("x").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let y = args.get("y").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "result": x + y }))
    }
}

struct Subtract;

#[async_trait]
impl FunctionHandler for Subtract {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let x = args.get("x").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let y = args.get("y").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "result": x - y }))
    }
}

struct Multiply;

#[async_trait]
impl FunctionHandler for Multiply {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let x = args.get("x").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let y = args.get("y").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "result": x * y }))
    }
}

struct Divide;

#[async_trait]
impl FunctionHandler for Divide {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let x = args.get("x").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let y = args.get("y").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        if y == 0.0 {
            return Err(HandlerError::Domain("Cannot divide by zero".to_string()));
        }
        Ok(serde_json::json!({ "result": x / y }))
    }
}

/// Wraps the live catalogue and matcher as the agent's request pipeline:
/// the one required override an [`AgentShell`] binds three monitoring
/// events around, per spec §4.5.
struct MatcherProcessor {
    catalogue: Arc<Catalogue>,
    min_score: f64,
}

#[async_trait]
impl RequestProcessor for MatcherProcessor {
    async fn process(&self, request: &str) -> Result<serde_json::Value, FabricError> {
        let matches = self.catalogue.matching(request, self.min_score, None).await;
        let summary: Vec<serde_json::Value> = matches
            .into_iter()
            .map(|m| {
                serde_json::json!({
                    "function": m.descriptor.name.to_string(),
                    "score": m.score,
                    "explanation": m.explanation,
                })
            })
            .collect();
        Ok(serde_json::json!({ "matches": summary }))
    }
}

async fn register_calculator(service: &Arc<Service>) -> Result<()> {
    let mut schema = HashMap::new();
    schema.insert("x".to_string(), number_param(true));
    schema.insert("y".to_string(), number_param(true));

    service
        .register_function("add", "add two numbers", schema.clone(), vec!["math"], HashMap::new(), Arc::new(Add))
        .await?;
    service
        .register_function(
            "subtract",
            "subtract one number from another",
            schema.clone(),
            vec!["math"],
            HashMap::new(),
            Arc::new(Subtract),
        )
        .await?;
    service
        .register_function(
            "multiply",
            "multiply two numbers",
            schema.clone(),
            vec!["math"],
            HashMap::new(),
            Arc::new(Multiply),
        )
        .await?;
    service
        .register_function("divide", "divide one number by another", schema, vec!["math"], HashMap::new(), Arc::new(Divide))
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = FabricConfig::load(None)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting genesis-fabric reference process");

    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(config.liveliness_lease()));
    let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
    let catalogue = Arc::new(Catalogue::new(transport.clone(), monitoring.clone()));

    let service_name = ServiceName::try_new("Calculator").map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let service = Service::new(service_name, catalogue.clone(), transport.clone(), monitoring.clone());
    register_calculator(&service).await?;
    service.start().await?;
    info!("Calculator service is READY");

    let agent_config = AgentShellConfig {
        preferred_name: "genesis-fabric-reference-agent".to_string(),
        service_name: "Calculator".to_string(),
        agent_type: AgentType::Agent,
        default_capable: true,
    };
    let processor = Arc::new(MatcherProcessor {
        catalogue: catalogue.clone(),
        min_score: config.matcher_min_score,
    });
    let shell = AgentShell::new(agent_config, transport.clone(), catalogue.clone(), monitoring)
        .announce()
        .await?
        .subscribe_capabilities(processor)
        .await?;
    info!(instance_id = %shell.instance_id(), "agent shell is READY and discoverable");

    if config.admin_enabled {
        let admin_catalogue = catalogue.clone();
        let bind_address = config.admin_bind_address.clone();
        tokio::spawn(async move {
            if let Err(err) = genesis_fabric::admin::serve(admin_catalogue, &bind_address).await {
                tracing::error!(error = %err, "admin surface exited");
            }
        });
    }

    info!("genesis-fabric is ready; press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    shell.shutdown().await;

    Ok(())
}
