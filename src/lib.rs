//! # genesis-fabric
//!
//! Core of a distributed function-call fabric: capability discovery with
//! late-joiner durability, semantic function matching (oracle or lexical
//! fallback), a schema-validating RPC service loop, and a lifecycle/chain
//! monitoring event protocol that lets a separate observer reconstruct the
//! live agent/function/interface topology.
//!
//! Five components cooperate, leaves first: [`transport`] (pub/sub with
//! durability, reliability, and liveliness), [`catalogue`] (the per-process
//! function registry), [`matcher`] (natural-language function selection),
//! [`service`] (the validating RPC loop), [`monitoring`] (the event
//! emitter), and [`agent`] (the discoverable shell binding the rest
//! together). [`config`] and [`admin`] are the ambient configuration and
//! operational surface every process carries alongside the core.
//!
//! ```no_run
//! use genesis_fabric::config::FabricConfig;
//! use genesis_fabric::transport::local::LocalTransport;
//! use genesis_fabric::transport::Transport;
//! use genesis_fabric::catalogue::Catalogue;
//! use genesis_fabric::monitoring::{ComponentType, MonitoringEmitter};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = FabricConfig::development();
//! let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(config.liveliness_lease()));
//! let monitoring = Arc::new(MonitoringEmitter::new(transport.clone(), ComponentType::Agent));
//! let catalogue = Arc::new(Catalogue::new(transport, monitoring));
//! let _ = catalogue.all();
//! # }
//! ```

pub mod admin;
pub mod agent;
pub mod catalogue;
pub mod config;
pub mod domain_types;
pub mod error;
pub mod matcher;
pub mod monitoring;
pub mod service;
pub mod transport;

pub use crate::error::FabricError;
