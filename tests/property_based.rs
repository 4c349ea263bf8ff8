//! Testable properties 3 and 4 (spec §8): schema enforcement and matcher
//! fallback determinism, expressed as `proptest` properties over the public
//! API, following the teacher's
//! `tests/message_router_disabled/test_property_based.rs` `prop_compose!`
//! style. Each async round trip runs on a fresh `tokio::runtime::Runtime`
//! since `proptest!` test bodies are synchronous.

use async_trait::async_trait;
use genesis_fabric::catalogue::{Catalogue, FunctionDescriptor, ParameterKind, ParameterSpec};
use genesis_fabric::domain_types::{FunctionId, FunctionName, MillisTimestamp, ProviderId, ServiceName};
use genesis_fabric::error::HandlerError;
use genesis_fabric::matcher::Matcher;
use genesis_fabric::monitoring::{ComponentType, MonitoringEmitter};
use genesis_fabric::service::{FunctionHandler, Service, ServiceClient};
use genesis_fabric::transport::local::LocalTransport;
use genesis_fabric::transport::Transport;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Echo;

#[async_trait]
impl FunctionHandler for Echo {
    async fn call(&self, args: serde_json::Map<String, serde_json::Value>) -> Result<serde_json::Value, HandlerError> {
        Ok(serde_json::Value::Object(args))
    }
}

prop_compose! {
    fn arb_function_name()(name in "[a-z][a-z_]{0,19}") -> FunctionName {
        FunctionName::try_new(name).unwrap()
    }
}

prop_compose! {
    fn arb_descriptor()(
        name in arb_function_name(),
        description in "[a-z ]{0,40}",
    ) -> FunctionDescriptor {
        FunctionDescriptor {
            function_id: FunctionId::generate(),
            name,
            description,
            provider_id: ProviderId::generate(),
            service_name: ServiceName::try_new("Calculator").unwrap(),
            parameter_schema: HashMap::new(),
            categories: vec![],
            performance_metrics: serde_json::json!({}),
            security_requirements: serde_json::json!({}),
            common_patterns: HashMap::new(),
            last_seen: MillisTimestamp::now(),
        }
    }
}

prop_compose! {
    fn arb_number_bounds()(low in -1000.0f64..1000.0, span in 0.0f64..1000.0) -> (f64, f64) {
        (low, low + span)
    }
}

proptest! {
    /// Property 4: the lexical fallback matcher returns the same ranking for
    /// the same (request, catalogue snapshot) every time, and every returned
    /// score sits in `[0.0, 1.0]`, regardless of how many or which
    /// descriptors are present.
    #[test]
    fn fallback_matching_is_deterministic_and_score_bounded(
        descriptors in prop::collection::vec(arb_descriptor(), 0..8),
        request in "[a-z ]{0,30}",
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (first, second) = runtime.block_on(async {
            let first = Matcher::select(&request, &descriptors, None, 0.0).await;
            let second = Matcher::select(&request, &descriptors, None, 0.0).await;
            (first, second)
        });

        let first_ids: Vec<FunctionId> = first.iter().map(|m| m.descriptor.function_id).collect();
        let second_ids: Vec<FunctionId> = second.iter().map(|m| m.descriptor.function_id).collect();
        prop_assert_eq!(first_ids, second_ids);

        for result in &first {
            prop_assert!((0.0..=1.0).contains(&result.score));
        }
    }

    /// Property 3: a number parameter's `minimum`/`maximum` bounds are
    /// enforced exactly — a call is accepted iff the argument falls within
    /// `[minimum, maximum]`, exercised through a real `Service`/`ServiceClient`
    /// round trip rather than the private validator directly.
    #[test]
    fn schema_enforcement_matches_declared_number_bounds(
        (minimum, maximum) in arb_number_bounds(),
        candidate in -2000.0f64..2000.0,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let accepted = runtime.block_on(async move {
            let bus = LocalTransport::new(Duration::from_secs(5));
            let provider: Arc<dyn Transport> = Arc::new(bus.join_mesh());
            let monitoring = Arc::new(MonitoringEmitter::new(provider.clone(), ComponentType::Agent));
            let catalogue = Arc::new(Catalogue::new(provider.clone(), monitoring.clone()));
            let service = Service::new(
                ServiceName::try_new("Bounded").unwrap(),
                catalogue,
                provider.clone(),
                monitoring,
            );

            let mut schema = HashMap::new();
            schema.insert(
                "value".to_string(),
                ParameterSpec {
                    kind: ParameterKind::Number,
                    required: true,
                    min_length: None,
                    max_length: None,
                    pattern: None,
                    minimum: Some(minimum),
                    maximum: Some(maximum),
                },
            );
            service
                .register_function("echo", "echoes its input", schema, vec![], HashMap::new(), Arc::new(Echo))
                .await
                .unwrap();
            service.start().await.unwrap();

            let consumer: Arc<dyn Transport> = Arc::new(bus.join_mesh());
            let client = ServiceClient::connect("Bounded", consumer, Duration::from_secs(1)).await.unwrap();
            client.call("echo", serde_json::json!({"value": candidate})).await.is_ok()
        });

        let should_be_accepted = candidate >= minimum && candidate <= maximum;
        prop_assert_eq!(accepted, should_be_accepted);
    }
}
