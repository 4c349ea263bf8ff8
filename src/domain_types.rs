//! Strongly-typed domain identifiers and value objects
//!
//! Mirrors the "make illegal states unrepresentable" approach the rest of this
//! crate follows: every identifier that crosses a component boundary is a
//! distinct `nutype`-wrapped value rather than a bare `String`/`Uuid`, so a
//! `FunctionId` can never be passed where a `ProviderId` is expected.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a registered function, assigned at registration.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into
))]
pub struct FunctionId(Uuid);

impl FunctionId {
    /// Creates a new random function identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Stable identifier of a hosting process, derived from transport identity.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into
))]
pub struct ProviderId(Uuid);

impl ProviderId {
    /// Creates a new random provider identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Correlator echoed between an `RPCRequest` and its `RPCReply`.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into
))]
pub struct CallId(Uuid);

impl CallId {
    /// Creates a new random call identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Correlates a single user request across multiple component hops.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into
))]
pub struct ChainId(Uuid);

impl ChainId {
    /// Creates a new random chain identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier for one emitted monitoring/lifecycle event.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into
))]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier for one running process instance of an agent/interface.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into
))]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Creates a new random instance identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Monotonic timestamp, milliseconds since the Unix epoch.
///
/// Spec requires IEEE-754-comparable millisecond timestamps on the wire;
/// this wraps `i64` (not `SystemTime`) so it serializes directly as a JSON
/// number and compares with ordinary integer ordering.
#[nutype(derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into
))]
pub struct MillisTimestamp(i64);

impl MillisTimestamp {
    /// Captures the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::new(chrono::Utc::now().timestamp_millis())
    }
}

/// Logical service a function belongs to (also the request/reply topic root).
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 200),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct ServiceName(String);

/// Human-visible function name, unique per provider.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 200),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct FunctionName(String);

/// A single capability/category tag used for category indexing.
#[nutype(
    sanitize(trim, lowercase),
    validate(len_char_min = 1, len_char_max = 100),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct Category(String);

/// Well-known transport topic names, stable across the mesh.
pub mod topics {
    /// Durable, reliable topic carrying `CapabilityAdvertisement` samples.
    pub const FUNCTION_CAPABILITY: &str = "FunctionCapability";
    /// Durable, reliable topic carrying agent/interface registration announcements.
    pub const GENESIS_REGISTRATION: &str = "GenesisRegistration";
    /// Reliable, non-durable topic for `AGENT_*` monitoring events.
    pub const MONITORING_EVENT: &str = "MonitoringEvent";
    /// Reliable, non-durable topic for component lifecycle state transitions.
    pub const COMPONENT_LIFECYCLE_EVENT: &str = "ComponentLifecycleEvent";
    /// Reliable, non-durable topic correlating a request across component hops.
    pub const CHAIN_EVENT: &str = "ChainEvent";
    /// Reliable, non-durable topic for provider liveliness transitions.
    pub const LIVELINESS_UPDATE: &str = "LivelinessUpdate";

    /// Request topic name for a given service: `"<ServiceName>Request"`.
    #[must_use]
    pub fn request_topic(service_name: &str) -> String {
        format!("{service_name}Request")
    }

    /// Reply topic name for a given service: `"<ServiceName>Reply"`.
    #[must_use]
    pub fn reply_topic(service_name: &str) -> String {
        format!("{service_name}Reply")
    }
}

/// The well-known function name that every service must answer without
/// dispatching to a handler or running schema validation.
pub const DISCOVERY_FUNCTION_NAME: &str = "discovery";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_id_generate_produces_distinct_values() {
        assert_ne!(FunctionId::generate(), FunctionId::generate());
    }

    #[test]
    fn millis_timestamp_orders_like_wall_clock() {
        let first = MillisTimestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MillisTimestamp::now();
        assert!(second >= first);
    }

    #[test]
    fn service_name_rejects_empty() {
        assert!(ServiceName::try_new("").is_err());
    }

    #[test]
    fn category_is_lowercased_on_construction() {
        let category = Category::try_new("Math").unwrap();
        assert_eq!(category.as_ref(), "math");
    }

    #[test]
    fn topic_helpers_match_spec_naming() {
        assert_eq!(topics::request_topic("Calculator"), "CalculatorRequest");
        assert_eq!(topics::reply_topic("Calculator"), "CalculatorReply");
    }
}
