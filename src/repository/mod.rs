//! Entity Repositories
//!
//! One typed facade per array object kind over the [`ArrayClient`] port.
//! Repositories decode records, build create payloads in protocol spelling
//! and turn empty searches into [`Listing::Empty`].

pub mod host;
pub mod host_group;
pub mod hypermetro;
pub mod lun;
pub mod lun_group;
pub mod mapping_view;
pub mod port_group;
pub mod snapshot;
pub mod storage_pool;
pub mod system;
pub mod target_port;

pub use host::HostRepository;
pub use host_group::HostGroupRepository;
pub use hypermetro::HyperMetroDomainRepository;
pub use lun::{CreateLunParams, LunRepository};
pub use lun_group::LunGroupRepository;
pub use mapping_view::MappingViewRepository;
pub use port_group::PortGroupRepository;
pub use snapshot::SnapshotRepository;
pub use storage_pool::StoragePoolRepository;
pub use system::SystemRepository;
pub use target_port::TargetPortRepository;

use crate::domain::ports::{ArrayClientRef, Listing};
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn decode_listing<T: DeserializeOwned>(values: Vec<Value>) -> Result<Listing<T>> {
    let items = values
        .into_iter()
        .map(decode)
        .collect::<Result<Vec<T>>>()?;
    Ok(Listing::from_vec(items))
}

/// All repositories over one array client
#[derive(Clone)]
pub struct Repositories {
    pub hosts: HostRepository,
    pub host_groups: HostGroupRepository,
    pub luns: LunRepository,
    pub lun_groups: LunGroupRepository,
    pub port_groups: PortGroupRepository,
    pub mapping_views: MappingViewRepository,
    pub snapshots: SnapshotRepository,
    pub storage_pools: StoragePoolRepository,
    pub target_ports: TargetPortRepository,
    pub hypermetro_domains: HyperMetroDomainRepository,
    pub system: SystemRepository,
}

impl Repositories {
    pub fn new(client: ArrayClientRef) -> Self {
        Self {
            hosts: HostRepository::new(client.clone()),
            host_groups: HostGroupRepository::new(client.clone()),
            luns: LunRepository::new(client.clone()),
            lun_groups: LunGroupRepository::new(client.clone()),
            port_groups: PortGroupRepository::new(client.clone()),
            mapping_views: MappingViewRepository::new(client.clone()),
            snapshots: SnapshotRepository::new(client.clone()),
            storage_pools: StoragePoolRepository::new(client.clone()),
            target_ports: TargetPortRepository::new(client.clone()),
            hypermetro_domains: HyperMetroDomainRepository::new(client.clone()),
            system: SystemRepository::new(client),
        }
    }
}
