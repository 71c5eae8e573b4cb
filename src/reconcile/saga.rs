//! Reconciliation Saga
//!
//! The host-mapping graph spans several array objects with no transaction
//! around them. Every write a reconciliation performs is recorded here so a
//! failure can report exactly what had already been applied. Nothing is
//! compensated automatically.

use crate::domain::ports::ObjectKind;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Named step of a reconciliation, used in error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileStep {
    SearchHostGroup,
    SearchHost,
    CreateHost,
    CreateHostGroup,
    AssociateHost,
    SearchMappingView,
    CreateMappingView,
    SearchLunGroup,
    CreateLunGroup,
    AssociateHostGroup,
    AssociateLunGroup,
    CheckPortGroup,
    AssociatePortGroup,
    CheckLunMembership,
    AttachLun,
    DetachLun,
    RemovePortGroup,
    RemoveLunGroup,
    RemoveHostGroup,
    DeleteMappingView,
    GetHostGroup,
    DisassociateHost,
    DeleteHost,
    DeleteHostGroup,
    ResolveStoragePool,
    CreateLun,
    WaitLunReady,
    CreateSnapshot,
    WaitSnapshotReady,
}

impl std::fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReconcileStep::SearchHostGroup => "search hostgroup",
            ReconcileStep::SearchHost => "search host",
            ReconcileStep::CreateHost => "create host",
            ReconcileStep::CreateHostGroup => "create hostgroup",
            ReconcileStep::AssociateHost => "associate host to hostgroup",
            ReconcileStep::SearchMappingView => "search mapping view",
            ReconcileStep::CreateMappingView => "create mapping view",
            ReconcileStep::SearchLunGroup => "search lungroup",
            ReconcileStep::CreateLunGroup => "create lungroup",
            ReconcileStep::AssociateHostGroup => "associate hostgroup",
            ReconcileStep::AssociateLunGroup => "associate lungroup",
            ReconcileStep::CheckPortGroup => "get portgroup",
            ReconcileStep::AssociatePortGroup => "associate portgroup",
            ReconcileStep::CheckLunMembership => "get lungroup members",
            ReconcileStep::AttachLun => "associate LUN to lungroup",
            ReconcileStep::DetachLun => "disassociate LUN from lungroup",
            ReconcileStep::RemovePortGroup => "remove portgroup",
            ReconcileStep::RemoveLunGroup => "remove lungroup",
            ReconcileStep::RemoveHostGroup => "remove hostgroup",
            ReconcileStep::DeleteMappingView => "delete mapping view",
            ReconcileStep::GetHostGroup => "search hostgroup by ID",
            ReconcileStep::DisassociateHost => "disassociate host from hostgroup",
            ReconcileStep::DeleteHost => "delete host",
            ReconcileStep::DeleteHostGroup => "delete hostgroup",
            ReconcileStep::ResolveStoragePool => "get storagepool",
            ReconcileStep::CreateLun => "create LUN",
            ReconcileStep::WaitLunReady => "wait that LUN is ready",
            ReconcileStep::CreateSnapshot => "create snapshot",
            ReconcileStep::WaitSnapshotReady => "wait that snapshot is ready",
        };
        f.write_str(s)
    }
}

/// Effect a completed step had on the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaEffect {
    Created,
    Associated,
    Disassociated,
    Deleted,
}

impl SagaEffect {
    /// Operation label used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaEffect::Created => "create",
            SagaEffect::Associated => "associate",
            SagaEffect::Disassociated => "disassociate",
            SagaEffect::Deleted => "delete",
        }
    }
}

/// One applied write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStep {
    pub step: ReconcileStep,
    pub effect: SagaEffect,
    pub kind: ObjectKind,
    pub id: String,
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {} {}", self.effect, self.kind, self.id)
    }
}

/// Journal of the writes applied by one reconciliation call
#[derive(Debug, Clone, Default)]
pub struct Saga {
    steps: Vec<SagaStep>,
}

impl Saga {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied write
    pub fn record(
        &mut self,
        step: ReconcileStep,
        effect: SagaEffect,
        kind: ObjectKind,
        id: impl Into<String>,
    ) {
        self.steps.push(SagaStep {
            step,
            effect,
            kind,
            id: id.into(),
        });
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<SagaStep> {
        self.steps
    }

    /// Wrap a failure of `step` with the writes applied so far
    pub fn fail(&self, step: ReconcileStep, target: impl Into<String>, source: Error) -> Error {
        Error::StepFailed {
            step,
            target: target.into(),
            completed: self.steps.clone(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_completed_steps() {
        let mut saga = Saga::new();
        saga.record(ReconcileStep::CreateHost, SagaEffect::Created, ObjectKind::Host, "1");
        saga.record(
            ReconcileStep::CreateHostGroup,
            SagaEffect::Created,
            ObjectKind::HostGroup,
            "2",
        );

        let err = saga.fail(
            ReconcileStep::AssociateHost,
            "hostgroup 2",
            Error::Transport("reset".into()),
        );

        assert_eq!(err.completed_steps().len(), 2);
        assert_eq!(err.completed_steps()[1].kind, ObjectKind::HostGroup);
        assert_eq!(
            err.to_string(),
            "Failed to associate host to hostgroup (hostgroup 2): Array transport error: reset"
        );
    }
}
