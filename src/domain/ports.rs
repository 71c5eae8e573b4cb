//! Domain Ports - The array capability surface consumed by the reconciler
//!
//! The reconciler and repositories only talk to the array through
//! [`ArrayClient`]. Adapters (REST transport, in-memory array) implement it.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// =============================================================================
// Object Kinds
// =============================================================================

/// Object kinds managed through the array's management API.
///
/// Type codes are fixed by the array protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Lun,
    HostGroup,
    Host,
    Snapshot,
    StoragePool,
    MappingView,
    TargetPort,
    LunGroup,
    PortGroup,
    HyperMetroDomain,
}

impl ObjectKind {
    /// Protocol type code of this object kind
    pub fn type_code(self) -> u32 {
        match self {
            ObjectKind::Lun => 11,
            ObjectKind::HostGroup => 14,
            ObjectKind::Host => 21,
            ObjectKind::Snapshot => 27,
            ObjectKind::StoragePool => 216,
            ObjectKind::MappingView => 245,
            ObjectKind::TargetPort => 249,
            ObjectKind::LunGroup => 256,
            ObjectKind::PortGroup => 257,
            ObjectKind::HyperMetroDomain => 15362,
        }
    }

    /// REST resource path of this object kind
    pub fn resource_path(self) -> &'static str {
        match self {
            ObjectKind::Lun => "/lun",
            ObjectKind::HostGroup => "/hostgroup",
            ObjectKind::Host => "/host",
            ObjectKind::Snapshot => "/snapshot",
            ObjectKind::StoragePool => "/storagepool",
            ObjectKind::MappingView => "/mappingview",
            ObjectKind::TargetPort => "/iscsi_tgt_port",
            ObjectKind::LunGroup => "/lungroup",
            ObjectKind::PortGroup => "/portgroup",
            ObjectKind::HyperMetroDomain => "/HyperMetroDomain",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Lun => write!(f, "LUN"),
            ObjectKind::HostGroup => write!(f, "HostGroup"),
            ObjectKind::Host => write!(f, "Host"),
            ObjectKind::Snapshot => write!(f, "Snapshot"),
            ObjectKind::StoragePool => write!(f, "StoragePool"),
            ObjectKind::MappingView => write!(f, "MappingView"),
            ObjectKind::TargetPort => write!(f, "TargetPort"),
            ObjectKind::LunGroup => write!(f, "LUNGroup"),
            ObjectKind::PortGroup => write!(f, "PortGroup"),
            ObjectKind::HyperMetroDomain => write!(f, "HyperMetroDomain"),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Search parameters for list and associate queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Filter expression, e.g. `NAME::compute-07`
    pub filter: Option<String>,
    /// Result window, e.g. `[0-100]`
    pub range: Option<String>,
    /// Associated object type code
    pub associate_obj_type: Option<u32>,
    /// Associated object ID
    pub associate_obj_id: Option<String>,
}

impl SearchQuery {
    /// Exact-match search on the NAME field
    pub fn by_name(name: &str) -> Self {
        Self {
            filter: Some(format!("NAME::{}", name)),
            ..Default::default()
        }
    }

    /// Search for objects associated to the given object
    pub fn associated_with(kind: ObjectKind, id: &str) -> Self {
        Self {
            associate_obj_type: Some(kind.type_code()),
            associate_obj_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    /// Exact name carried by a `NAME::` filter
    pub fn name_filter(&self) -> Option<&str> {
        self.filter.as_deref().and_then(|f| f.strip_prefix("NAME::"))
    }

    /// Render as query-string pairs in protocol spelling
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.clone()));
        }
        if let Some(range) = &self.range {
            pairs.push(("range", range.clone()));
        }
        if let Some(t) = self.associate_obj_type {
            pairs.push(("ASSOCIATEOBJTYPE", t.to_string()));
        }
        if let Some(id) = &self.associate_obj_id {
            pairs.push(("ASSOCIATEOBJID", id.clone()));
        }
        pairs
    }
}

/// Membership edge between a container object and one of its members
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    /// Container kind (HostGroup, LUNGroup, MappingView)
    pub parent: ObjectKind,
    pub parent_id: String,
    /// Member kind
    pub member: ObjectKind,
    pub member_id: String,
}

impl Association {
    pub fn new(
        parent: ObjectKind,
        parent_id: impl Into<String>,
        member: ObjectKind,
        member_id: impl Into<String>,
    ) -> Self {
        Self {
            parent,
            parent_id: parent_id.into(),
            member,
            member_id: member_id.into(),
        }
    }
}

impl std::fmt::Display for Association {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {} {}",
            self.member, self.member_id, self.parent, self.parent_id
        )
    }
}

/// Whole-array power operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerOperation {
    PowerOff,
    Reboot,
}

impl std::fmt::Display for PowerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerOperation::PowerOff => write!(f, "power off"),
            PowerOperation::Reboot => write!(f, "reboot"),
        }
    }
}

/// Super administrator password confirming a power operation.
///
/// Never shown in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ImportantPassword(String);

impl ImportantPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ImportantPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ImportantPassword(***)")
    }
}

/// Non-CRUD actions exposed by the array
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayAction {
    /// Grow a LUN to the given capacity in sectors
    ExpandLun { lun_id: String, capacity: u64 },
    /// Activate a snapshot
    ActivateSnapshot { snapshot_id: String },
    /// Stop (deactivate) a snapshot
    StopSnapshot { snapshot_id: String },
    /// Power off or reboot both controllers
    Power {
        operation: PowerOperation,
        important_password: ImportantPassword,
    },
}

// =============================================================================
// Listing
// =============================================================================

/// Result of a search: either some records or nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<T> {
    Found(Vec<T>),
    Empty,
}

impl<T> Listing<T> {
    pub fn from_vec(items: Vec<T>) -> Self {
        if items.is_empty() {
            Listing::Empty
        } else {
            Listing::Found(items)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Listing::Found(items) => items.len(),
            Listing::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Listing::Empty)
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Found(items) => items,
            Listing::Empty => Vec::new(),
        }
    }

    /// Zero or one record; more than one violates the uniqueness invariant
    pub fn at_most_one(self, kind: ObjectKind, name: &str) -> Result<Option<T>> {
        match self {
            Listing::Empty => Ok(None),
            Listing::Found(mut items) if items.len() == 1 => Ok(items.pop()),
            Listing::Found(items) => Err(Error::ConsistencyViolation {
                kind: kind.to_string(),
                name: name.to_string(),
                count: items.len(),
            }),
        }
    }

    /// Exactly one record
    pub fn exactly_one(self, kind: ObjectKind, name: &str) -> Result<T> {
        let count = self.len();
        self.at_most_one(kind, name)?
            .ok_or_else(|| Error::ConsistencyViolation {
                kind: kind.to_string(),
                name: name.to_string(),
                count,
            })
    }
}

// =============================================================================
// Array Client Port
// =============================================================================

/// Port for the array management API.
///
/// Records travel as raw JSON in protocol field spelling; repositories own
/// the typed view. `list` returns an empty vector for zero results, never an
/// error.
#[async_trait]
pub trait ArrayClient: Send + Sync {
    /// Search objects of a kind
    async fn list(&self, kind: ObjectKind, query: &SearchQuery) -> Result<Vec<Value>>;

    /// Fetch one object by ID
    async fn get(&self, kind: ObjectKind, id: &str) -> Result<Value>;

    /// Create an object, returning the array's record of it
    async fn create(&self, kind: ObjectKind, payload: Value) -> Result<Value>;

    /// Delete an object by ID
    async fn delete(&self, kind: ObjectKind, id: &str) -> Result<()>;

    /// Add a member to a container object
    async fn associate(&self, association: &Association) -> Result<()>;

    /// Remove a member from a container object
    async fn disassociate(&self, association: &Association) -> Result<()>;

    /// List objects of a kind associated to the object named in the query
    async fn list_associated(&self, kind: ObjectKind, query: &SearchQuery) -> Result<Vec<Value>>;

    /// Run a non-CRUD action
    async fn invoke(&self, action: ArrayAction) -> Result<()>;

    /// Adapter name for logs
    fn adapter_name(&self) -> &str;
}

pub type ArrayClientRef = Arc<dyn ArrayClient>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_type_codes() {
        assert_eq!(ObjectKind::Host.type_code(), 21);
        assert_eq!(ObjectKind::HostGroup.type_code(), 14);
        assert_eq!(ObjectKind::LunGroup.type_code(), 256);
        assert_eq!(ObjectKind::PortGroup.type_code(), 257);
        assert_eq!(ObjectKind::MappingView.type_code(), 245);
    }

    #[test]
    fn test_search_query_pairs() {
        let q = SearchQuery::by_name("compute-07");
        assert_eq!(q.name_filter(), Some("compute-07"));
        assert_eq!(q.to_pairs(), vec![("filter", "NAME::compute-07".to_string())]);

        let q = SearchQuery::associated_with(ObjectKind::Host, "5");
        assert_eq!(
            q.to_pairs(),
            vec![
                ("ASSOCIATEOBJTYPE", "21".to_string()),
                ("ASSOCIATEOBJID", "5".to_string())
            ]
        );
    }

    #[test]
    fn test_listing_uniqueness() {
        let empty: Listing<u32> = Listing::from_vec(vec![]);
        assert_eq!(empty.clone().at_most_one(ObjectKind::Host, "h").unwrap(), None);
        assert_matches!(
            empty.exactly_one(ObjectKind::Host, "h"),
            Err(Error::ConsistencyViolation { count: 0, .. })
        );

        let two = Listing::from_vec(vec![1, 2]);
        assert_matches!(
            two.at_most_one(ObjectKind::HostGroup, "h"),
            Err(Error::ConsistencyViolation { count: 2, .. })
        );

        let one = Listing::from_vec(vec![7]);
        assert_eq!(one.exactly_one(ObjectKind::Host, "h").unwrap(), 7);
    }
}
