//! End-to-end scenarios S1-S6 (spec §8), driven over [`LocalTransport`]
//! with a real `Service`/`ServiceClient` round trip rather than calling
//! `Service::process` directly.

mod support;

use genesis_fabric::domain_types::DISCOVERY_FUNCTION_NAME;
use genesis_fabric::error::FabricError;
use genesis_fabric::service::ServiceClient;
use std::time::Duration;
use support::{full_mesh, Process};

#[tokio::test]
async fn s1_calculator_add() {
    let (bus, _provider, _calculator, _text_tools) = full_mesh(Duration::from_secs(5)).await;
    let consumer = Process::join(&bus);

    let client = ServiceClient::connect("Calculator", consumer.transport, Duration::from_secs(2))
        .await
        .unwrap();
    let result = client
        .call("add", serde_json::json!({"x": 424242, "y": 111111}))
        .await
        .unwrap();

    assert_eq!(result, serde_json::json!({"result": 535353.0}));
}

#[tokio::test]
async fn s2_division_by_zero_is_a_domain_error_and_service_keeps_serving() {
    let (bus, _provider, _calculator, _text_tools) = full_mesh(Duration::from_secs(5)).await;
    let consumer = Process::join(&bus);

    let client = ServiceClient::connect("Calculator", consumer.transport, Duration::from_secs(2))
        .await
        .unwrap();

    let err = client.call("divide", serde_json::json!({"x": 10, "y": 0})).await.unwrap_err();
    match err {
        FabricError::DomainError(message) => assert!(message.contains("Cannot divide by zero")),
        other => panic!("expected a domain error, got {other:?}"),
    }

    let next = client.call("divide", serde_json::json!({"x": 10, "y": 2})).await.unwrap();
    assert_eq!(next, serde_json::json!({"result": 5.0}));
}

#[tokio::test]
async fn s3_letter_count() {
    let (bus, _provider, _calculator, _text_tools) = full_mesh(Duration::from_secs(5)).await;
    let consumer = Process::join(&bus);

    let client = ServiceClient::connect("TextTools", consumer.transport, Duration::from_secs(2))
        .await
        .unwrap();
    let result = client
        .call("count_letter", serde_json::json!({"text": "hello silly world", "letter": "l"}))
        .await
        .unwrap();

    assert_eq!(result, serde_json::json!({"result": 5}));
}

#[tokio::test]
async fn s4_word_count() {
    let (bus, _provider, _calculator, _text_tools) = full_mesh(Duration::from_secs(5)).await;
    let consumer = Process::join(&bus);

    let client = ServiceClient::connect("TextTools", consumer.transport, Duration::from_secs(2))
        .await
        .unwrap();
    let result = client
        .call("count_words", serde_json::json!({"text": "this is a test of the system"}))
        .await
        .unwrap();

    assert_eq!(result, serde_json::json!({"word_count": 7}));
}

#[tokio::test]
async fn s5_discovery_lists_exactly_the_hosted_functions() {
    let (bus, _provider, _calculator, _text_tools) = full_mesh(Duration::from_secs(5)).await;
    let consumer = Process::join(&bus);

    let client = ServiceClient::connect("Calculator", consumer.transport, Duration::from_secs(2))
        .await
        .unwrap();
    let result = client
        .call(DISCOVERY_FUNCTION_NAME, serde_json::json!({}))
        .await
        .unwrap();

    let listed = result.as_object().unwrap();
    assert_eq!(listed.len(), 4);
    for name in ["add", "subtract", "multiply", "divide"] {
        assert!(listed.contains_key(name), "missing {name} in discovery reply");
    }
}

#[tokio::test]
async fn s6_oracle_down_matcher_ranks_add_first_and_excludes_count_letter() {
    let (_bus, provider, _calculator, _text_tools) = full_mesh(Duration::from_secs(5)).await;

    let matches = provider
        .catalogue
        .matching("Can you add two numbers?", 0.5, None)
        .await;

    assert!(!matches.is_empty());
    assert_eq!(matches[0].descriptor.name.to_string(), "add");
    assert!(!matches.iter().any(|m| m.descriptor.name.to_string() == "count_letter"));
}
