//! Array entity records
//!
//! Typed views over the array's JSON records. Field names follow the
//! management protocol spelling; only the fields the provisioner reads are
//! modelled, everything else is ignored on decode.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Health and running status codes reported by the array
pub mod status {
    pub const HEALTHY: &str = "1";
    pub const FAULTED: &str = "2";

    pub const VOLUME_READY: &str = "27";
    pub const SNAPSHOT_ACTIVE: &str = "43";
    pub const SNAPSHOT_INACTIVE: &str = "45";
}

/// Sectors (512 bytes) per GiB, the unit of LUN `CAPACITY`
pub const CAPACITY_UNIT: u64 = 2 * 1024 * 1024;

// =============================================================================
// Field Codecs
// =============================================================================

/// IDs arrive as strings or integers depending on the endpoint generation.
mod object_id {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Raw::deserialize(d)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        })
    }

    pub fn serialize<S: Serializer>(id: &str, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(id)
    }
}

/// `ISADD2*` flags are the strings "true"/"false".
mod flag {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Bool(b) => Ok(b),
            Raw::Text(s) => match s.as_str() {
                "true" => Ok(true),
                "false" | "" => Ok(false),
                other => Err(D::Error::custom(format!("invalid flag value: {}", other))),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if *value { "true" } else { "false" })
    }
}

// =============================================================================
// Host Mapping Objects
// =============================================================================

/// Hypervisor (compute node) initiator record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "HEALTHSTATUS", default)]
    pub health_status: String,
    #[serde(rename = "RUNNINGSTATUS", default)]
    pub running_status: String,
    #[serde(rename = "OPERATIONSYSTEM", default)]
    pub operation_system: String,
    #[serde(rename = "INITIATORNUM", default)]
    pub initiator_num: String,
    #[serde(rename = "ISADD2HOSTGROUP", with = "flag", default)]
    pub added_to_host_group: bool,
}

/// Container binding one host for mapping purposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "ISADD2MAPPINGVIEW", with = "flag", default)]
    pub added_to_mapping_view: bool,
}

/// Container of LUNs exposed together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunGroup {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "ISADD2MAPPINGVIEW", with = "flag", default)]
    pub added_to_mapping_view: bool,
}

/// Set of physical target ports (Ethernet, Fibre Channel)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortGroup {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
}

/// Grants a host group visibility to a LUN group through a port group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingView {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
}

// =============================================================================
// Volumes
// =============================================================================

/// Provisioned block volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lun {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "HEALTHSTATUS", default)]
    pub health_status: String,
    #[serde(rename = "RUNNINGSTATUS", default)]
    pub running_status: String,
    #[serde(rename = "ISADD2LUNGROUP", with = "flag", default)]
    pub added_to_lun_group: bool,
    /// Capacity in sectors
    #[serde(rename = "CAPACITY", default)]
    pub capacity: String,
    #[serde(rename = "PARENTID", default)]
    pub parent_id: String,
    #[serde(rename = "PARENTNAME", default)]
    pub parent_name: String,
    #[serde(rename = "WWN", default)]
    pub wwn: String,
    /// Per-association JSON blob, populated by associate queries
    #[serde(rename = "ASSOCIATEMETADATA", default)]
    pub associate_metadata: String,
}

impl Lun {
    /// Healthy and online
    pub fn is_ready(&self) -> bool {
        self.health_status == status::HEALTHY && self.running_status == status::VOLUME_READY
    }
}

/// Point-in-time copy of one LUN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "HEALTHSTATUS", default)]
    pub health_status: String,
    #[serde(rename = "RUNNINGSTATUS", default)]
    pub running_status: String,
    #[serde(rename = "PARENTID", default)]
    pub parent_lun_id: String,
    #[serde(rename = "PARENTNAME", default)]
    pub parent_name: String,
    #[serde(rename = "USERCAPACITY", default)]
    pub user_capacity: String,
    #[serde(rename = "WWN", default)]
    pub wwn: String,
}

impl Snapshot {
    /// Readiness of a snapshot. An unhealthy snapshot is a hard failure,
    /// not a "not yet".
    pub fn readiness(&self) -> Result<bool> {
        if self.health_status != status::HEALTHY {
            return Err(Error::NotReady {
                kind: "Snapshot".into(),
                id: self.id.clone(),
                health_status: self.health_status.clone(),
                running_status: self.running_status.clone(),
            });
        }

        Ok(self.running_status == status::SNAPSHOT_ACTIVE
            || self.running_status == status::SNAPSHOT_INACTIVE)
    }
}

/// Per-association metadata attached to LUNs by host associate queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociateMetadata {
    #[serde(rename = "HostLUNID")]
    pub host_lun_id: u32,
}

// =============================================================================
// Read-Only Objects
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePool {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "HEALTHSTATUS", default)]
    pub health_status: String,
    #[serde(rename = "RUNNINGSTATUS", default)]
    pub running_status: String,
    #[serde(rename = "USERTOTALCAPACITY", default)]
    pub user_total_capacity: String,
    #[serde(rename = "USERFREECAPACITY", default)]
    pub user_free_capacity: String,
}

/// iSCSI target port. The ID embeds the target IQN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPort {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "ETHPORTID", default)]
    pub eth_port_id: String,
    #[serde(rename = "TPGT", default)]
    pub tpgt: String,
}

/// HyperMetro domain, shared between the local and remote array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperMetroDomain {
    #[serde(rename = "ID", with = "object_id")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default)]
    pub description: String,
    #[serde(rename = "DOMAINTYPE", default)]
    pub domain_type: String,
    #[serde(rename = "RUNNINGSTATUS", default)]
    pub running_status: String,
    #[serde(rename = "REMOTEDEVICES", default)]
    pub remote_devices: String,
}
