//! Shared fixtures for the integration tests: the out-of-scope-but-needed
//! example business-logic functions spec.md's end-to-end scenarios name by
//! literal value (add/subtract/multiply/divide/count_letter/count_words),
//! plus a small harness for wiring one transport mesh per test.

#![allow(dead_code)]

use async_trait::async_trait;
use genesis_fabric::catalogue::{CommonPattern, ParameterKind, ParameterSpec};
use genesis_fabric::domain_types::ServiceName;
use genesis_fabric::error::HandlerError;
use genesis_fabric::monitoring::{ComponentType, MonitoringEmitter};
use genesis_fabric::service::{FunctionHandler, Service};
use genesis_fabric::transport::local::LocalTransport;
use genesis_fabric::transport::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub fn number_param(required: bool) -> ParameterSpec {
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

pub fn text_param(required: bool) -> ParameterSpec {
    ParameterSpec {
        kind: ParameterKind::Text,
        required,
        min_length: None,
        max_length: None,
        pattern: None,
        minimum: None,
        maximum: None,
    }
}

pub struct Add;

#[async_trait]
impl FunctionHandler for Add {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let x = args.get("x").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let y = args.get("y").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "result": x + y }))
    }
}

pub struct Subtract;

#[async_trait]
impl FunctionHandler for Subtract {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let x = args.get("x").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let y = args.get("y").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "result": x - y }))
    }
}

pub struct Multiply;

#[async_trait]
impl FunctionHandler for Multiply {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let x = args.get("x").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        let y = args.get("y").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
        Ok(serde_json::json!({ "result": x * y }))
    }
}

pub struct Divide;

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

pub struct CountLetter;

#[async_trait]
impl FunctionHandler for CountLetter {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let text = args.get("text").and_then(serde_json::Value::as_str).unwrap_or("");
        let letter = args.get("letter").and_then(serde_json::Value::as_str).unwrap_or("");
        let needle = letter.chars().next();
        let count = needle.map_or(0, |c| text.chars().filter(|ch| *ch == c).count());
        Ok(serde_json::json!({ "result": count }))
    }
}

pub struct CountWords;

#[async_trait]
impl FunctionHandler for CountWords {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        let text = args.get("text").and_then(serde_json::Value::as_str).unwrap_or("");
        let word_count = text.split_whitespace().count();
        Ok(serde_json::json!({ "word_count": word_count }))
    }
}

/// One simulated process: its own transport identity sharing a bus, plus
/// the catalogue and monitoring emitter bound to it.
pub struct Process {
    pub transport: Arc<dyn Transport>,
    pub monitoring: Arc<MonitoringEmitter>,
    pub catalogue: Arc<genesis_fabric::catalogue::Catalogue>,
}

impl Process {
    pub fn join(bus: &LocalTransport) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(bus.join_mesh());
        let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
        let catalogue = Arc::new(genesis_fabric::catalogue::Catalogue::new(transport.clone(), monitoring.clone()));
        Self {
            transport,
            monitoring,
            catalogue,
        }
    }
}

/// Builds a fresh, isolated bus plus a "Calculator" service hosting
/// add/subtract/multiply/divide, and a "TextTools" service hosting
/// count_letter/count_words — the six functions spec §8's scenarios name.
pub async fn full_mesh(lease: Duration) -> (LocalTransport, Process, Arc<Service>, Arc<Service>) {
    let bus = LocalTransport::new(lease);
    let provider = Process::join(&bus);

    let calculator = Service::new(
        ServiceName::try_new("Calculator").unwrap(),
        provider.catalogue.clone(),
        provider.transport.clone(),
        provider.monitoring.clone(),
    );

    let mut number_schema = HashMap::new();
    number_schema.insert("x".to_string(), number_param(true));
    number_schema.insert("y".to_string(), number_param(true));

    calculator
        .register_function("add", "add two numbers together", number_schema.clone(), vec!["math"], HashMap::new(), Arc::new(Add))
        .await
        .unwrap();
    calculator
        .register_function(
            "subtract",
            "subtract one number from another",
            number_schema.clone(),
            vec!["math"],
            HashMap::new(),
            Arc::new(Subtract),
        )
        .await
        .unwrap();
    calculator
        .register_function(
            "multiply",
            "multiply two numbers",
            number_schema.clone(),
            vec!["math"],
            HashMap::new(),
            Arc::new(Multiply),
        )
        .await
        .unwrap();
    calculator
        .register_function(
            "divide",
            "divide one number by another",
            number_schema,
            vec!["math"],
            HashMap::new(),
            Arc::new(Divide),
        )
        .await
        .unwrap();

    let text_tools = Service::new(
        ServiceName::try_new("TextTools").unwrap(),
        provider.catalogue.clone(),
        provider.transport.clone(),
        provider.monitoring.clone(),
    );

    let mut count_letter_patterns = HashMap::new();
    count_letter_patterns.insert("letter".to_string(), CommonPattern::Letter);
    let mut count_letter_schema = HashMap::new();
    count_letter_schema.insert("text".to_string(), text_param(true));

    text_tools
        .register_function(
            "count_letter",
            "count occurrences of a letter in text",
            count_letter_schema,
            vec!["text"],
            count_letter_patterns,
            Arc::new(CountLetter),
        )
        .await
        .unwrap();

    let mut count_words_schema = HashMap::new();
    count_words_schema.insert("text".to_string(), text_param(true));
    text_tools
        .register_function(
            "count_words",
            "count the number of words in text",
            count_words_schema,
            vec!["text"],
            HashMap::new(),
            Arc::new(CountWords),
        )
        .await
        .unwrap();

    calculator.start().await.unwrap();
    text_tools.start().await.unwrap();

    (bus, provider, calculator, text_tools)
}
