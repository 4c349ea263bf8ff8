//! `fabric-cli` - thin command-line wrapper around the fabric core
//!
//! Spec treats CLI wrappers as out of the hard-core scope, but a runnable
//! crate still needs one. Because [`LocalTransport`] is in-process only
//! (no external broker ships with this crate — see spec's non-goal on
//! cross-domain federation), each subcommand builds its own short-lived
//! mesh, registers the same example calculator functions `main.rs` does,
//! and performs one action before exiting. It demonstrates the full
//! discovery/matching/RPC pipeline end to end rather than connecting to a
//! separately-running `genesis-fabric` process.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use genesis_fabric::catalogue::{Catalogue, ParameterKind, ParameterSpec};
use genesis_fabric::domain_types::ServiceName;
use genesis_fabric::error::HandlerError;
use genesis_fabric::monitoring::{ComponentType, MonitoringEmitter};
use genesis_fabric::service::{FunctionHandler, Service, ServiceClient};
use genesis_fabric::transport::local::LocalTransport;
use genesis_fabric::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Command-line interface for the genesis-fabric core.
#[derive(Parser)]
#[command(name = "fabric-cli", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start an agent shell hosting the example calculator functions and
    /// block until interrupted.
    Serve,
    /// Run the matcher against a freshly registered example catalogue and
    /// print the ranked matches for `request`.
    Discover {
        /// Free-form natural-language request to match against.
        request: String,
    },
    /// Issue one RPC call against a freshly started example service and
    /// print the reply.
    Call {
        /// Logical service name (only `Calculator` is hosted by this CLI).
        service: String,
        /// Function name to invoke.
        function: String,
        /// JSON object of keyword arguments, e.g. `{"x":1,"y":2}`.
        arguments: String,
    },
}

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

async fn build_calculator(transport: Arc<dyn Transport>, monitoring: Arc<MonitoringEmitter>) -> Result<(Arc<Catalogue>, Arc<Service>)> {
    let catalogue = Arc::new(Catalogue::new(transport.clone(), monitoring.clone()));
    let service_name = ServiceName::try_new("Calculator").context("invalid service name")?;
    let service = Service::new(service_name, catalogue.clone(), transport, monitoring);

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

    Ok((catalogue, service))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("fabric_cli=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => {
            let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(Duration::from_secs(5)));
            let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
            let (_catalogue, service) = build_calculator(transport, monitoring).await?;
            service.start().await?;
            println!("Calculator service is READY; press Ctrl+C to exit.");
            tokio::signal::ctrl_c().await?;
        }
        Command::Discover { request } => {
            let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(Duration::from_secs(5)));
            let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
            let (catalogue, _service) = build_calculator(transport, monitoring).await?;

            let matches = catalogue.matching(&request, 0.0, None).await;
            for m in matches {
                println!("{:<12} score={:.2}  {}", m.descriptor.name, m.score, m.explanation);
            }
        }
        Command::Call {
            service,
            function,
            arguments,
        } => {
            let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(Duration::from_secs(5)));
            let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
            let (_catalogue, hosted) = build_calculator(transport.clone(), monitoring).await?;
            hosted.start().await?;

            let args: serde_json::Value = serde_json::from_str(&arguments).context("arguments must be a JSON object")?;
            let client = ServiceClient::connect(&service, transport, Duration::from_secs(10)).await?;
            match client.call(&function, args).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(err) => eprintln!("error: {err}"),
            }
        }
    }

    Ok(())
}
