//! Error taxonomy for the fabric
//!
//! One variant per the error taxonomy `spec.md` §7 names, plus the supporting
//! errors the lower layers (transport, catalogue, configuration) surface
//! through them.

use thiserror::Error;

/// Errors surfaced to callers of the RPC client, matching spec §7 exactly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FabricError {
    /// The named function is not known to the addressed service.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// JSON decode or schema validation failure; message names the offending parameter.
    #[error("{0}")]
    InvalidArguments(String),

    /// Handler-reported, semantically meaningful failure (not a service failure).
    #[error("{0}")]
    DomainError(String),

    /// Uncaught internal error in the handler.
    #[error("Error executing function: {0}")]
    HandlerFailure(String),

    /// No reply within the call's deadline.
    #[error("Timeout waiting for reply after {0:?}")]
    Timeout(std::time::Duration),

    /// `wait_for_service` exhausted its deadline without any matching provider.
    #[error("No provider for service: {0}")]
    NoProvider(String),
}

/// Errors from the Transport Abstraction (§4.1).
#[derive(Error, Debug)]
pub enum TransportError {
    /// No subscriber/endpoint exists for the named topic.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The call's correlator was never matched to a reply before timing out.
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The reply channel was dropped before a reply arrived.
    #[error("Reply channel closed before a reply arrived")]
    ChannelClosed,

    /// Payload failed to serialize/deserialize at the transport boundary.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the Capability Catalogue (§4.2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogueError {
    /// A local registration reused a name already registered by this provider.
    #[error("Duplicate function name for this provider: {0}")]
    DuplicateName(String),

    /// The supplied parameter schema did not validate against the meta-schema.
    #[error("Invalid parameter schema for parameter '{0}': {1}")]
    InvalidSchema(String, String),
}

/// Errors from loading or validating `FabricConfig` (§4.7).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration source could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A loaded value violated a domain-type constraint.
    #[error("Invalid configuration value for '{field}': {reason}")]
    Validation {
        /// Name of the offending configuration field.
        field: String,
        /// Human-readable explanation of the constraint violated.
        reason: String,
    },
}

/// Errors a [`crate::service::FunctionHandler`] may return from `call` (§4.4).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// A semantically meaningful failure the handler recognizes as its own
    /// domain's business rule (e.g. "Cannot divide by zero"). Reported as
    /// `success=false` but never logged as a service failure.
    #[error("{0}")]
    Domain(String),

    /// An uncaught internal error; the service logs it and reports
    /// `success=false, error="Error executing function: …"`.
    #[error("{0}")]
    Internal(String),
}

/// Errors raised while invoking the optional `Oracle` during matching (§4.3).
#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle's response could not be parsed as the expected structured list.
    #[error("Unparseable oracle response: {0}")]
    Unparseable(String),

    /// The oracle call itself failed (network, rate limit, etc.).
    #[error("Oracle invocation failed: {0}")]
    InvocationFailed(String),
}
