//! Dorado Provisioner - SAN Host Mapping Reconciler
//!
//! Provisions volumes on a dual-controller Dorado block storage array and
//! wires compute hosts to them through the array's mapping objects.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Reconciliation                              │
//! │  ┌───────────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  HostMapper               │   │  VolumeService              │  │
//! │  │  (host group, view, map)  │   │  (LUN, snapshot, polling)   │  │
//! │  └─────────────┬─────────────┘   └──────────────┬──────────────┘  │
//! │                └───────────────┬─────────────────┘                 │
//! ├────────────────────────────────┴──────────────────────────────────┤
//! │                     Entity Repositories                            │
//! │   Host  HostGroup  LUN  LUNGroup  PortGroup  MappingView  ...      │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                   ArrayClient port                                 │
//! │  ┌──────────────────────────┐   ┌──────────────────────────────┐  │
//! │  │  DoradoClient (REST)     │   │  InMemoryArray (dry run)     │  │
//! │  └──────────────────────────┘   └──────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The mapping graph for one host is
//! `Host -> HostGroup -> MappingView <- {LUNGroup, PortGroup}`.
//!
//! # Modules
//!
//! - [`array`]: Array adapters (REST transport, in-memory)
//! - [`config`]: Connection and polling configuration
//! - [`domain`]: Entity records and the array port
//! - [`error`]: Error types and handling
//! - [`metrics`]: Prometheus counters
//! - [`naming`]: Array NAME field encoding
//! - [`reconcile`]: Host-mapping reconciler and volume lifecycle
//! - [`repository`]: Typed per-kind facades over the array port

pub mod array;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod reconcile;
pub mod repository;

// Re-export commonly used types
pub use array::{ArrayFactory, DoradoClient, InMemoryArray};
pub use config::{ArrayConfig, PollConfig};

pub use domain::entities::{
    Host, HostGroup, HyperMetroDomain, Lun, LunGroup, MappingView, PortGroup, Snapshot,
    StoragePool, TargetPort,
};
pub use domain::ports::{
    ArrayClient, ArrayClientRef, Association, ImportantPassword, Listing, ObjectKind,
    PowerOperation, SearchQuery,
};

pub use error::{Error, ErrorAction, Result};
pub use metrics::Metrics;

pub use reconcile::{HostMapper, PollPolicy, ReconcileStep, SagaStep, VolumeService};
pub use repository::Repositories;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
