//! In-Memory Array Adapter
//!
//! Implements [`ArrayClient`] against process memory. Used for dry runs and
//! as the test double for repositories and the reconciler: it keeps a call
//! log, flips the `ISADD2*` flags on association, numbers host-visible LUNs,
//! replays scripted status sequences and injects one-shot faults.

use crate::domain::ports::{ArrayAction, ArrayClient, Association, ObjectKind, SearchQuery};
use crate::domain::entities::status;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

// =============================================================================
// Call Log
// =============================================================================

/// Operation class, used for fault injection and call filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayOp {
    List,
    Get,
    Create,
    Delete,
    Associate,
    Disassociate,
    ListAssociated,
    Invoke,
}

/// One call received by the in-memory array
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayCall {
    List(ObjectKind),
    Get(ObjectKind, String),
    Create(ObjectKind),
    Delete(ObjectKind, String),
    Associate(Association),
    Disassociate(Association),
    ListAssociated(ObjectKind),
    Invoke(ArrayAction),
}

impl ArrayCall {
    pub fn op(&self) -> ArrayOp {
        match self {
            ArrayCall::List(_) => ArrayOp::List,
            ArrayCall::Get(..) => ArrayOp::Get,
            ArrayCall::Create(_) => ArrayOp::Create,
            ArrayCall::Delete(..) => ArrayOp::Delete,
            ArrayCall::Associate(_) => ArrayOp::Associate,
            ArrayCall::Disassociate(_) => ArrayOp::Disassociate,
            ArrayCall::ListAssociated(_) => ArrayOp::ListAssociated,
            ArrayCall::Invoke(_) => ArrayOp::Invoke,
        }
    }

    /// Whether the call changes array state
    pub fn is_write(&self) -> bool {
        !matches!(
            self.op(),
            ArrayOp::List | ArrayOp::Get | ArrayOp::ListAssociated
        )
    }
}

/// Failure returned by an injected fault
#[derive(Debug, Clone)]
pub enum Fault {
    Api { code: i64, description: String },
    Transport(String),
    NotFound,
}

#[derive(Debug, Clone)]
struct PendingFault {
    op: ArrayOp,
    kind: ObjectKind,
    fault: Fault,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Default)]
struct ArrayState {
    next_id: u64,
    objects: BTreeMap<ObjectKind, Vec<Value>>,
    /// Memberships in association order
    members: Vec<Association>,
    calls: Vec<ArrayCall>,
    faults: Vec<PendingFault>,
    /// Status sequence for the next object created of a kind
    pending_scripts: BTreeMap<ObjectKind, VecDeque<(String, String)>>,
    /// Status sequence replayed by `get` of a specific object
    scripts: BTreeMap<(ObjectKind, String), VecDeque<(String, String)>>,
}

impl ArrayState {
    fn take_fault(&mut self, op: ArrayOp, kind: ObjectKind, name: &str) -> Result<()> {
        let Some(pos) = self
            .faults
            .iter()
            .position(|f| f.op == op && f.kind == kind)
        else {
            return Ok(());
        };

        Err(match self.faults.remove(pos).fault {
            Fault::Api { code, description } => Error::Api { code, description },
            Fault::Transport(reason) => Error::Transport(reason),
            Fault::NotFound => Error::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
        })
    }

    fn records(&self, kind: ObjectKind) -> &[Value] {
        self.objects.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    fn find(&self, kind: ObjectKind, id: &str) -> Option<&Value> {
        self.records(kind).iter().find(|v| record_id(v) == id)
    }

    fn find_mut(&mut self, kind: ObjectKind, id: &str) -> Option<&mut Value> {
        self.objects
            .get_mut(&kind)
            .and_then(|records| records.iter_mut().find(|v| record_id(v) == id))
    }

    fn require(&self, kind: ObjectKind, id: &str) -> Result<&Value> {
        self.find(kind, id).ok_or_else(|| Error::NotFound {
            kind: kind.to_string(),
            name: id.to_string(),
        })
    }

    fn set_field(&mut self, kind: ObjectKind, id: &str, field: &str, value: &str) {
        if let Some(Value::Object(record)) = self.find_mut(kind, id) {
            record.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    fn insert(&mut self, kind: ObjectKind, mut record: Map<String, Value>) -> Value {
        let id = match record.get("ID") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => {
                self.next_id += 1;
                self.next_id.to_string()
            }
        };
        record.insert("ID".into(), Value::String(id));
        let value = Value::Object(record);
        self.objects.entry(kind).or_default().push(value.clone());
        value
    }

    /// Flag on the member that reflects membership in this parent kind
    fn membership_flag(association: &Association) -> Option<&'static str> {
        match (association.parent, association.member) {
            (ObjectKind::HostGroup, ObjectKind::Host) => Some("ISADD2HOSTGROUP"),
            (ObjectKind::MappingView, ObjectKind::HostGroup) => Some("ISADD2MAPPINGVIEW"),
            (ObjectKind::MappingView, ObjectKind::LunGroup) => Some("ISADD2MAPPINGVIEW"),
            (ObjectKind::LunGroup, ObjectKind::Lun) => Some("ISADD2LUNGROUP"),
            _ => None,
        }
    }

    fn is_referenced(&self, kind: ObjectKind, id: &str) -> bool {
        self.members.iter().any(|a| {
            (a.parent == kind && a.parent_id == id) || (a.member == kind && a.member_id == id)
        })
    }

    fn members_of(&self, parent: ObjectKind, parent_id: &str, member: ObjectKind) -> Vec<String> {
        self.members
            .iter()
            .filter(|a| a.parent == parent && a.parent_id == parent_id && a.member == member)
            .map(|a| a.member_id.clone())
            .collect()
    }

    fn parents_of(&self, member: ObjectKind, member_id: &str, parent: ObjectKind) -> Vec<String> {
        self.members
            .iter()
            .filter(|a| a.member == member && a.member_id == member_id && a.parent == parent)
            .map(|a| a.parent_id.clone())
            .collect()
    }

    /// LUNs visible to a host through its mapping views, with host LUN IDs
    fn host_luns(&self, host_id: &str) -> Vec<Value> {
        let mut luns = Vec::new();
        for hg in self.parents_of(ObjectKind::Host, host_id, ObjectKind::HostGroup) {
            for mv in self.parents_of(ObjectKind::HostGroup, &hg, ObjectKind::MappingView) {
                for lg in self.members_of(ObjectKind::MappingView, &mv, ObjectKind::LunGroup) {
                    for (idx, lun_id) in self
                        .members_of(ObjectKind::LunGroup, &lg, ObjectKind::Lun)
                        .iter()
                        .enumerate()
                    {
                        if let Some(Value::Object(record)) = self.find(ObjectKind::Lun, lun_id) {
                            let mut record = record.clone();
                            record.entry("ASSOCIATEMETADATA").or_insert_with(|| {
                                Value::String(json!({ "HostLUNID": idx + 1 }).to_string())
                            });
                            luns.push(Value::Object(record));
                        }
                    }
                }
            }
        }
        luns
    }
}

fn record_id(value: &Value) -> &str {
    value.get("ID").and_then(Value::as_str).unwrap_or_default()
}

/// The array reports scalar fields as strings
fn normalize(payload: Value) -> Map<String, Value> {
    let Value::Object(map) = payload else {
        return Map::new();
    };
    map.into_iter()
        .map(|(k, v)| match v {
            Value::Number(n) => (k, Value::String(n.to_string())),
            other => (k, other),
        })
        .collect()
}

fn defaults(kind: ObjectKind) -> Vec<(&'static str, &'static str)> {
    match kind {
        ObjectKind::Host => vec![
            ("ISADD2HOSTGROUP", "false"),
            ("HEALTHSTATUS", status::HEALTHY),
            ("RUNNINGSTATUS", "1"),
        ],
        ObjectKind::HostGroup | ObjectKind::LunGroup => vec![("ISADD2MAPPINGVIEW", "false")],
        ObjectKind::Lun => vec![
            ("ISADD2LUNGROUP", "false"),
            ("HEALTHSTATUS", status::HEALTHY),
            ("RUNNINGSTATUS", status::VOLUME_READY),
        ],
        ObjectKind::Snapshot => vec![
            ("HEALTHSTATUS", status::HEALTHY),
            ("RUNNINGSTATUS", status::SNAPSHOT_INACTIVE),
        ],
        _ => vec![],
    }
}

// =============================================================================
// In-Memory Array
// =============================================================================

/// Array adapter backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryArray {
    state: Mutex<ArrayState>,
}

impl InMemoryArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw record, bypassing name checks. Returns its ID.
    pub fn seed(&self, kind: ObjectKind, record: Value) -> String {
        let mut state = self.state.lock();
        let value = state.insert(kind, normalize(record));
        record_id(&value).to_string()
    }

    /// Insert a raw membership edge without touching flags
    pub fn seed_association(&self, association: Association) {
        self.state.lock().members.push(association);
    }

    /// Overwrite one field of a stored record
    pub fn set_field(&self, kind: ObjectKind, id: &str, field: &str, value: &str) {
        self.state.lock().set_field(kind, id, field, value);
    }

    /// Read a stored record without logging a call
    pub fn record(&self, kind: ObjectKind, id: &str) -> Option<Value> {
        self.state.lock().find(kind, id).cloned()
    }

    /// Number of stored records of a kind
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.state.lock().records(kind).len()
    }

    /// Whether a membership edge exists
    pub fn is_associated(&self, association: &Association) -> bool {
        self.state.lock().members.contains(association)
    }

    /// Make the next matching call fail once
    pub fn inject_fault(&self, op: ArrayOp, kind: ObjectKind, fault: Fault) {
        self.state.lock().faults.push(PendingFault { op, kind, fault });
    }

    /// Status pairs `(HEALTHSTATUS, RUNNINGSTATUS)` returned by successive
    /// `get` calls of the next object created of `kind`. The last pair sticks.
    pub fn script_statuses(&self, kind: ObjectKind, statuses: &[(&str, &str)]) {
        self.state.lock().pending_scripts.insert(
            kind,
            statuses
                .iter()
                .map(|(h, r)| (h.to_string(), r.to_string()))
                .collect(),
        );
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<ArrayCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one operation class
    pub fn calls_of(&self, op: ArrayOp) -> Vec<ArrayCall> {
        self.calls().into_iter().filter(|c| c.op() == op).collect()
    }

    /// Associations requested so far, in order
    pub fn associations(&self) -> Vec<Association> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ArrayCall::Associate(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    /// Number of state-changing calls so far
    pub fn write_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

#[async_trait]
impl ArrayClient for InMemoryArray {
    async fn list(&self, kind: ObjectKind, query: &SearchQuery) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::List(kind));
        state.take_fault(ArrayOp::List, kind, query.name_filter().unwrap_or_default())?;

        let records = state.records(kind);
        Ok(match query.name_filter() {
            Some(name) => records
                .iter()
                .filter(|v| v.get("NAME").and_then(Value::as_str) == Some(name))
                .cloned()
                .collect(),
            None => records.to_vec(),
        })
    }

    async fn get(&self, kind: ObjectKind, id: &str) -> Result<Value> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::Get(kind, id.to_string()));
        state.take_fault(ArrayOp::Get, kind, id)?;
        state.require(kind, id)?;

        let key = (kind, id.to_string());
        let next = state.scripts.get_mut(&key).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });
        if let Some((health, running)) = next {
            state.set_field(kind, id, "HEALTHSTATUS", &health);
            state.set_field(kind, id, "RUNNINGSTATUS", &running);
        }

        state.require(kind, id).cloned()
    }

    async fn create(&self, kind: ObjectKind, payload: Value) -> Result<Value> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::Create(kind));

        let mut record = normalize(payload);
        let name = record
            .get("NAME")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        state.take_fault(ArrayOp::Create, kind, &name)?;

        if !name.is_empty()
            && state
                .records(kind)
                .iter()
                .any(|v| v.get("NAME").and_then(Value::as_str) == Some(name.as_str()))
        {
            return Err(Error::Api {
                code: -1,
                description: format!("{} name already exists: {}", kind, name),
            });
        }

        for (field, value) in defaults(kind) {
            record
                .entry(field)
                .or_insert_with(|| Value::String(value.to_string()));
        }
        record.remove("ID");

        let value = state.insert(kind, record);
        let id = record_id(&value).to_string();
        if let Some(script) = state.pending_scripts.remove(&kind) {
            state.scripts.insert((kind, id.clone()), script);
        }

        debug!("In-memory array created {} {}", kind, id);
        Ok(value)
    }

    async fn delete(&self, kind: ObjectKind, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::Delete(kind, id.to_string()));
        state.take_fault(ArrayOp::Delete, kind, id)?;
        state.require(kind, id)?;

        if state.is_referenced(kind, id) {
            return Err(Error::Api {
                code: -1,
                description: format!("{} {} is still associated", kind, id),
            });
        }

        if let Some(records) = state.objects.get_mut(&kind) {
            records.retain(|v| record_id(v) != id);
        }
        state.scripts.remove(&(kind, id.to_string()));
        Ok(())
    }

    async fn associate(&self, association: &Association) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::Associate(association.clone()));
        state.take_fault(ArrayOp::Associate, association.member, &association.member_id)?;
        state.require(association.parent, &association.parent_id)?;
        state.require(association.member, &association.member_id)?;

        if state.members.contains(association) {
            return Err(Error::Api {
                code: -1,
                description: format!("already associated: {}", association),
            });
        }

        state.members.push(association.clone());
        if let Some(flag) = ArrayState::membership_flag(association) {
            state.set_field(association.member, &association.member_id, flag, "true");
        }
        Ok(())
    }

    async fn disassociate(&self, association: &Association) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::Disassociate(association.clone()));
        state.take_fault(ArrayOp::Disassociate, association.member, &association.member_id)?;

        let Some(pos) = state.members.iter().position(|a| a == association) else {
            return Err(Error::NotFound {
                kind: "Association".into(),
                name: association.to_string(),
            });
        };
        state.members.remove(pos);

        if let Some(flag) = ArrayState::membership_flag(association) {
            let still_member = !state
                .parents_of(association.member, &association.member_id, association.parent)
                .is_empty();
            if !still_member {
                state.set_field(association.member, &association.member_id, flag, "false");
            }
        }
        Ok(())
    }

    async fn list_associated(&self, kind: ObjectKind, query: &SearchQuery) -> Result<Vec<Value>> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::ListAssociated(kind));

        let (Some(type_code), Some(assoc_id)) =
            (query.associate_obj_type, query.associate_obj_id.clone())
        else {
            return Err(Error::Api {
                code: -1,
                description: "associate query needs ASSOCIATEOBJTYPE and ASSOCIATEOBJID".into(),
            });
        };
        state.take_fault(ArrayOp::ListAssociated, kind, &assoc_id)?;

        if kind == ObjectKind::Lun && type_code == ObjectKind::Host.type_code() {
            return Ok(state.host_luns(&assoc_id));
        }

        let ids: Vec<String> = state
            .members
            .iter()
            .filter_map(|a| {
                if a.parent.type_code() == type_code && a.parent_id == assoc_id && a.member == kind
                {
                    Some(a.member_id.clone())
                } else if a.member.type_code() == type_code
                    && a.member_id == assoc_id
                    && a.parent == kind
                {
                    Some(a.parent_id.clone())
                } else {
                    None
                }
            })
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| state.find(kind, id).cloned())
            .collect())
    }

    async fn invoke(&self, action: ArrayAction) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ArrayCall::Invoke(action.clone()));

        match action {
            ArrayAction::ExpandLun { lun_id, capacity } => {
                state.take_fault(ArrayOp::Invoke, ObjectKind::Lun, &lun_id)?;
                state.require(ObjectKind::Lun, &lun_id)?;
                state.set_field(ObjectKind::Lun, &lun_id, "CAPACITY", &capacity.to_string());
            }
            ArrayAction::ActivateSnapshot { snapshot_id } => {
                state.take_fault(ArrayOp::Invoke, ObjectKind::Snapshot, &snapshot_id)?;
                state.require(ObjectKind::Snapshot, &snapshot_id)?;
                state.set_field(
                    ObjectKind::Snapshot,
                    &snapshot_id,
                    "RUNNINGSTATUS",
                    status::SNAPSHOT_ACTIVE,
                );
            }
            ArrayAction::StopSnapshot { snapshot_id } => {
                state.take_fault(ArrayOp::Invoke, ObjectKind::Snapshot, &snapshot_id)?;
                state.require(ObjectKind::Snapshot, &snapshot_id)?;
                state.set_field(
                    ObjectKind::Snapshot,
                    &snapshot_id,
                    "RUNNINGSTATUS",
                    status::SNAPSHOT_INACTIVE,
                );
            }
            // Nothing to model; the call log records it
            ArrayAction::Power { .. } => {}
        }
        Ok(())
    }

    fn adapter_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_create_assigns_ids_and_defaults() {
        let array = InMemoryArray::new();
        let host = array
            .create(ObjectKind::Host, json!({"NAME": "h1", "TYPE": 21}))
            .await
            .unwrap();

        assert_eq!(host["ID"], "1");
        assert_eq!(host["TYPE"], "21");
        assert_eq!(host["ISADD2HOSTGROUP"], "false");

        let dup = array.create(ObjectKind::Host, json!({"NAME": "h1"})).await;
        assert_matches!(dup, Err(Error::Api { .. }));
    }

    #[tokio::test]
    async fn test_association_flips_flags() {
        let array = InMemoryArray::new();
        let host = array.seed(ObjectKind::Host, json!({"NAME": "h", "ISADD2HOSTGROUP": "false"}));
        let hg = array.seed(ObjectKind::HostGroup, json!({"NAME": "h"}));
        let edge = Association::new(ObjectKind::HostGroup, &hg, ObjectKind::Host, &host);

        array.associate(&edge).await.unwrap();
        assert_eq!(array.record(ObjectKind::Host, &host).unwrap()["ISADD2HOSTGROUP"], "true");

        array.disassociate(&edge).await.unwrap();
        assert_eq!(array.record(ObjectKind::Host, &host).unwrap()["ISADD2HOSTGROUP"], "false");
    }

    #[tokio::test]
    async fn test_delete_refuses_associated_objects() {
        let array = InMemoryArray::new();
        let host = array.seed(ObjectKind::Host, json!({"NAME": "h"}));
        let hg = array.seed(ObjectKind::HostGroup, json!({"NAME": "h"}));
        array.seed_association(Association::new(ObjectKind::HostGroup, &hg, ObjectKind::Host, &host));

        assert_matches!(array.delete(ObjectKind::Host, &host).await, Err(Error::Api { .. }));
        assert_matches!(
            array.delete(ObjectKind::Host, "404").await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let array = InMemoryArray::new();
        array.inject_fault(ArrayOp::List, ObjectKind::Host, Fault::Transport("reset".into()));

        assert_matches!(
            array.list(ObjectKind::Host, &SearchQuery::default()).await,
            Err(Error::Transport(_))
        );
        assert!(array.list(ObjectKind::Host, &SearchQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_statuses() {
        let array = InMemoryArray::new();
        array.script_statuses(ObjectKind::Lun, &[("1", "53"), ("1", "27")]);
        let lun = array.create(ObjectKind::Lun, json!({"NAME": "l"})).await.unwrap();
        let id = record_id(&lun).to_string();

        assert_eq!(array.get(ObjectKind::Lun, &id).await.unwrap()["RUNNINGSTATUS"], "53");
        assert_eq!(array.get(ObjectKind::Lun, &id).await.unwrap()["RUNNINGSTATUS"], "27");
        assert_eq!(array.get(ObjectKind::Lun, &id).await.unwrap()["RUNNINGSTATUS"], "27");
    }
}
