//! Reconciliation Layer
//!
//! Idempotent construction of the host-mapping graph and the volume
//! lifecycle helpers, on top of the entity repositories.

pub mod host_mapping;
pub mod poller;
pub mod saga;
pub mod volume;

pub use host_mapping::HostMapper;
pub use poller::{wait_ready, PollOutcome, PollPolicy};
pub use saga::{ReconcileStep, Saga, SagaEffect, SagaStep};
pub use volume::VolumeService;
