//! Host-Mapping Reconciler
//!
//! Establishes and tears down the visibility path
//! Host -> HostGroup -> MappingView <- {LUNGroup, PortGroup} for one compute
//! host. Every object is searched by the encoded host name first; an empty
//! search means "create it", more than one result is a consistency error and
//! nothing is written.
//!
//! Steps run strictly in order and each write is attempted at most once. On
//! failure the returned [`Error::StepFailed`] names the step and carries the
//! writes already applied. Nothing is rolled back.

use super::saga::{ReconcileStep, Saga, SagaEffect, SagaStep};
use crate::domain::entities::{Host, HostGroup, LunGroup, MappingView};
use crate::domain::ports::ObjectKind;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::naming::encode_host_name;
use crate::repository::Repositories;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconciles the host-mapping graph on one array
#[derive(Clone)]
pub struct HostMapper {
    repos: Repositories,
    metrics: Option<Arc<Metrics>>,
}

impl HostMapper {
    pub fn new(repos: Repositories) -> Self {
        Self {
            repos,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(
        &self,
        saga: &mut Saga,
        step: ReconcileStep,
        effect: SagaEffect,
        kind: ObjectKind,
        id: &str,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.record_write(kind, effect.as_str());
        }
        saga.record(step, effect, kind, id);
    }

    // =========================================================================
    // Host Group
    // =========================================================================

    /// Find or create the host group of `hostname` together with its host.
    ///
    /// The returned host reflects an association performed by this call.
    pub async fn ensure_host_group(&self, hostname: &str) -> Result<(HostGroup, Host)> {
        let mut saga = Saga::new();
        let name = encode_host_name(hostname);

        let existing = self
            .repos
            .host_groups
            .find_by_hostname(hostname)
            .await
            .and_then(|groups| groups.at_most_one(ObjectKind::HostGroup, &name))
            .map_err(|e| saga.fail(ReconcileStep::SearchHostGroup, &name, e))?;

        let Some(host_group) = existing else {
            return self.create_host_group_with_host(hostname, saga).await;
        };
        debug!("Found hostgroup {} (ID: {})", host_group.name, host_group.id);

        let mut host = self
            .repos
            .hosts
            .find_by_hostname(hostname)
            .await
            .and_then(|hosts| hosts.exactly_one(ObjectKind::Host, &name))
            .map_err(|e| saga.fail(ReconcileStep::SearchHost, &name, e))?;

        if host.added_to_host_group {
            debug!("Host {} is already in a hostgroup", host.id);
        } else {
            self.repos
                .host_groups
                .associate_host(&host_group.id, &host.id)
                .await
                .map_err(|e| {
                    saga.fail(
                        ReconcileStep::AssociateHost,
                        format!("hostgroup {}", host_group.id),
                        e,
                    )
                })?;
            self.record(
                &mut saga,
                ReconcileStep::AssociateHost,
                SagaEffect::Associated,
                ObjectKind::Host,
                &host.id,
            );
            host.added_to_host_group = true;
        }

        Ok((host_group, host))
    }

    async fn create_host_group_with_host(
        &self,
        hostname: &str,
        mut saga: Saga,
    ) -> Result<(HostGroup, Host)> {
        let name = encode_host_name(hostname);

        let mut host = self
            .repos
            .hosts
            .create(hostname)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CreateHost, &name, e))?;
        self.record(
            &mut saga,
            ReconcileStep::CreateHost,
            SagaEffect::Created,
            ObjectKind::Host,
            &host.id,
        );

        let host_group = self
            .repos
            .host_groups
            .create(hostname)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CreateHostGroup, &name, e))?;
        self.record(
            &mut saga,
            ReconcileStep::CreateHostGroup,
            SagaEffect::Created,
            ObjectKind::HostGroup,
            &host_group.id,
        );

        self.repos
            .host_groups
            .associate_host(&host_group.id, &host.id)
            .await
            .map_err(|e| {
                saga.fail(
                    ReconcileStep::AssociateHost,
                    format!("hostgroup {}", host_group.id),
                    e,
                )
            })?;
        self.record(
            &mut saga,
            ReconcileStep::AssociateHost,
            SagaEffect::Associated,
            ObjectKind::Host,
            &host.id,
        );
        host.added_to_host_group = true;

        info!(
            "Created hostgroup {} with host {} for {}",
            host_group.id, host.id, hostname
        );
        Ok((host_group, host))
    }

    // =========================================================================
    // Mapping View and LUN Group
    // =========================================================================

    /// Find or create the mapping view of `hostname`
    pub async fn ensure_mapping_view(&self, hostname: &str) -> Result<MappingView> {
        let mut saga = Saga::new();
        let name = encode_host_name(hostname);

        let existing = self
            .repos
            .mapping_views
            .find_by_hostname(hostname)
            .await
            .and_then(|views| views.at_most_one(ObjectKind::MappingView, &name))
            .map_err(|e| saga.fail(ReconcileStep::SearchMappingView, &name, e))?;

        if let Some(view) = existing {
            debug!("Found mapping view {} (ID: {})", view.name, view.id);
            return Ok(view);
        }

        let view = self
            .repos
            .mapping_views
            .create(hostname)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CreateMappingView, &name, e))?;
        self.record(
            &mut saga,
            ReconcileStep::CreateMappingView,
            SagaEffect::Created,
            ObjectKind::MappingView,
            &view.id,
        );
        Ok(view)
    }

    /// Find or create the LUN group of `hostname`
    pub async fn ensure_lun_group(&self, hostname: &str) -> Result<LunGroup> {
        let mut saga = Saga::new();
        let name = encode_host_name(hostname);

        let existing = self
            .repos
            .lun_groups
            .find_by_hostname(hostname)
            .await
            .and_then(|groups| groups.at_most_one(ObjectKind::LunGroup, &name))
            .map_err(|e| saga.fail(ReconcileStep::SearchLunGroup, &name, e))?;

        if let Some(group) = existing {
            debug!("Found lungroup {} (ID: {})", group.name, group.id);
            return Ok(group);
        }

        let group = self
            .repos
            .lun_groups
            .create(hostname)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CreateLunGroup, &name, e))?;
        self.record(
            &mut saga,
            ReconcileStep::CreateLunGroup,
            SagaEffect::Created,
            ObjectKind::LunGroup,
            &group.id,
        );
        Ok(group)
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    /// Attach the host group, the LUN group and the port group to the view.
    ///
    /// Objects already flagged (or, for the port group, already listed) as
    /// members are skipped. Returns the associations performed.
    pub async fn map(
        &self,
        mapping_view: &MappingView,
        host_group: &HostGroup,
        lun_group: Option<&LunGroup>,
        port_group_id: &str,
    ) -> Result<Vec<SagaStep>> {
        let mut saga = Saga::new();
        let view = mapping_view.id.as_str();
        let target = format!("mapping view {}", view);

        if host_group.added_to_mapping_view {
            debug!("Hostgroup {} is already in a mapping view", host_group.id);
        } else {
            self.repos
                .mapping_views
                .associate(view, ObjectKind::HostGroup, &host_group.id)
                .await
                .map_err(|e| saga.fail(ReconcileStep::AssociateHostGroup, &target, e))?;
            self.record(
                &mut saga,
                ReconcileStep::AssociateHostGroup,
                SagaEffect::Associated,
                ObjectKind::HostGroup,
                &host_group.id,
            );
        }

        if let Some(lun_group) = lun_group {
            if lun_group.added_to_mapping_view {
                debug!("Lungroup {} is already in a mapping view", lun_group.id);
            } else {
                self.repos
                    .mapping_views
                    .associate(view, ObjectKind::LunGroup, &lun_group.id)
                    .await
                    .map_err(|e| saga.fail(ReconcileStep::AssociateLunGroup, &target, e))?;
                self.record(
                    &mut saga,
                    ReconcileStep::AssociateLunGroup,
                    SagaEffect::Associated,
                    ObjectKind::LunGroup,
                    &lun_group.id,
                );
            }
        }

        let present = self
            .repos
            .port_groups
            .is_added_to_mapping_view(view, port_group_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CheckPortGroup, &target, e))?;

        if present {
            debug!("Portgroup {} is already in mapping view {}", port_group_id, view);
        } else {
            self.repos
                .mapping_views
                .associate(view, ObjectKind::PortGroup, port_group_id)
                .await
                .map_err(|e| saga.fail(ReconcileStep::AssociatePortGroup, &target, e))?;
            self.record(
                &mut saga,
                ReconcileStep::AssociatePortGroup,
                SagaEffect::Associated,
                ObjectKind::PortGroup,
                port_group_id,
            );
        }

        info!(
            "Mapping view {} reconciled ({} association(s))",
            view,
            saga.steps().len()
        );
        Ok(saga.into_steps())
    }

    /// Reverse of [`HostMapper::map`]: detach port group, LUN group and host
    /// group, then delete the view.
    pub async fn unmap(
        &self,
        mapping_view: &MappingView,
        host_group: &HostGroup,
        lun_group: Option<&LunGroup>,
        port_group_id: &str,
    ) -> Result<Vec<SagaStep>> {
        let mut saga = Saga::new();
        let view = mapping_view.id.as_str();
        let target = format!("mapping view {}", view);

        let present = self
            .repos
            .port_groups
            .is_added_to_mapping_view(view, port_group_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CheckPortGroup, &target, e))?;
        if present {
            self.repos
                .mapping_views
                .disassociate(view, ObjectKind::PortGroup, port_group_id)
                .await
                .map_err(|e| saga.fail(ReconcileStep::RemovePortGroup, &target, e))?;
            self.record(
                &mut saga,
                ReconcileStep::RemovePortGroup,
                SagaEffect::Disassociated,
                ObjectKind::PortGroup,
                port_group_id,
            );
        }

        if let Some(lun_group) = lun_group.filter(|g| g.added_to_mapping_view) {
            self.repos
                .mapping_views
                .disassociate(view, ObjectKind::LunGroup, &lun_group.id)
                .await
                .map_err(|e| saga.fail(ReconcileStep::RemoveLunGroup, &target, e))?;
            self.record(
                &mut saga,
                ReconcileStep::RemoveLunGroup,
                SagaEffect::Disassociated,
                ObjectKind::LunGroup,
                &lun_group.id,
            );
        }

        if host_group.added_to_mapping_view {
            self.repos
                .mapping_views
                .disassociate(view, ObjectKind::HostGroup, &host_group.id)
                .await
                .map_err(|e| saga.fail(ReconcileStep::RemoveHostGroup, &target, e))?;
            self.record(
                &mut saga,
                ReconcileStep::RemoveHostGroup,
                SagaEffect::Disassociated,
                ObjectKind::HostGroup,
                &host_group.id,
            );
        }

        self.repos
            .mapping_views
            .delete(view)
            .await
            .map_err(|e| saga.fail(ReconcileStep::DeleteMappingView, &target, e))?;
        self.record(
            &mut saga,
            ReconcileStep::DeleteMappingView,
            SagaEffect::Deleted,
            ObjectKind::MappingView,
            view,
        );

        Ok(saga.into_steps())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Remove a host group and its single host
    pub async fn teardown(&self, host_group_id: &str) -> Result<Vec<SagaStep>> {
        let mut saga = Saga::new();
        let target = format!("hostgroup {}", host_group_id);

        let host_group = self
            .repos
            .host_groups
            .get(host_group_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::GetHostGroup, &target, e))?;

        let host = self
            .repos
            .hosts
            .find_by_name(&host_group.name)
            .await
            .and_then(|hosts| hosts.exactly_one(ObjectKind::Host, &host_group.name))
            .map_err(|e| saga.fail(ReconcileStep::SearchHost, &host_group.name, e))?;

        self.repos
            .host_groups
            .disassociate_host(&host_group.id, &host.id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::DisassociateHost, &target, e))?;
        self.record(
            &mut saga,
            ReconcileStep::DisassociateHost,
            SagaEffect::Disassociated,
            ObjectKind::Host,
            &host.id,
        );

        self.repos
            .hosts
            .delete(&host.id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::DeleteHost, format!("host {}", host.id), e))?;
        self.record(
            &mut saga,
            ReconcileStep::DeleteHost,
            SagaEffect::Deleted,
            ObjectKind::Host,
            &host.id,
        );

        self.repos
            .host_groups
            .delete(&host_group.id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::DeleteHostGroup, &target, e))?;
        self.record(
            &mut saga,
            ReconcileStep::DeleteHostGroup,
            SagaEffect::Deleted,
            ObjectKind::HostGroup,
            &host_group.id,
        );

        info!("Tore down hostgroup {} and host {}", host_group.id, host.id);
        Ok(saga.into_steps())
    }

    // =========================================================================
    // LUN Membership
    // =========================================================================

    /// Add a LUN to the group unless it is already a member.
    /// Returns whether an association was made.
    pub async fn attach_lun(&self, lun_group: &LunGroup, lun_id: &str) -> Result<bool> {
        let mut saga = Saga::new();
        let target = format!("lungroup {}", lun_group.id);

        let member = self
            .repos
            .lun_groups
            .contains_lun(&lun_group.id, lun_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CheckLunMembership, &target, e))?;
        if member {
            debug!("LUN {} is already in lungroup {}", lun_id, lun_group.id);
            return Ok(false);
        }

        self.repos
            .lun_groups
            .associate_lun(&lun_group.id, lun_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::AttachLun, &target, e))?;
        self.record(
            &mut saga,
            ReconcileStep::AttachLun,
            SagaEffect::Associated,
            ObjectKind::Lun,
            lun_id,
        );
        Ok(true)
    }

    /// Remove a LUN from the group if it is a member.
    /// Returns whether a disassociation was made.
    pub async fn detach_lun(&self, lun_group: &LunGroup, lun_id: &str) -> Result<bool> {
        let mut saga = Saga::new();
        let target = format!("lungroup {}", lun_group.id);

        let member = self
            .repos
            .lun_groups
            .contains_lun(&lun_group.id, lun_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CheckLunMembership, &target, e))?;
        if !member {
            debug!("LUN {} is not in lungroup {}", lun_id, lun_group.id);
            return Ok(false);
        }

        self.repos
            .lun_groups
            .disassociate_lun(&lun_group.id, lun_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::DetachLun, &target, e))?;
        self.record(
            &mut saga,
            ReconcileStep::DetachLun,
            SagaEffect::Disassociated,
            ObjectKind::Lun,
            lun_id,
        );
        Ok(true)
    }

    /// Host-visible LUN number of `lun_id` on `host_id`
    pub async fn host_lun_id(&self, lun_id: &str, host_id: &str) -> Result<u32> {
        self.repos.luns.host_lun_id(lun_id, host_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::memory::{ArrayCall, ArrayOp, Fault, InMemoryArray};
    use crate::domain::ports::Association;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use prometheus::Registry;
    use serde_json::json;

    fn setup() -> (Arc<InMemoryArray>, HostMapper) {
        let array = Arc::new(InMemoryArray::new());
        let mapper = HostMapper::new(Repositories::new(array.clone()));
        (array, mapper)
    }

    #[tokio::test]
    async fn test_ensure_host_group_is_idempotent() {
        let (array, mapper) = setup();

        let (hg, host) = mapper.ensure_host_group("compute-07").await.unwrap();
        assert!(host.added_to_host_group);
        assert_eq!(hg.name, "compute-07");
        assert!(array.is_associated(&Association::new(
            ObjectKind::HostGroup,
            &hg.id,
            ObjectKind::Host,
            &host.id
        )));

        array.clear_calls();
        let (hg2, host2) = mapper.ensure_host_group("compute-07").await.unwrap();
        assert_eq!(hg2.id, hg.id);
        assert_eq!(host2.id, host.id);
        assert_eq!(array.write_count(), 0);
        assert_eq!(array.count(ObjectKind::Host), 1);
        assert_eq!(array.count(ObjectKind::HostGroup), 1);
    }

    #[tokio::test]
    async fn test_ensure_host_group_associates_loose_host() {
        let (array, mapper) = setup();
        let host = array.seed(
            ObjectKind::Host,
            json!({"NAME": "compute-07", "ISADD2HOSTGROUP": "false"}),
        );
        let hg = array.seed(ObjectKind::HostGroup, json!({"NAME": "compute-07"}));

        let (_, returned) = mapper.ensure_host_group("compute-07").await.unwrap();
        assert!(returned.added_to_host_group);
        assert_eq!(
            array.associations(),
            vec![Association::new(ObjectKind::HostGroup, &hg, ObjectKind::Host, &host)]
        );
    }

    #[tokio::test]
    async fn test_duplicate_host_groups_write_nothing() {
        let (array, mapper) = setup();
        array.seed(ObjectKind::HostGroup, json!({"NAME": "compute-07"}));
        array.seed(ObjectKind::HostGroup, json!({"NAME": "compute-07"}));

        let err = mapper.ensure_host_group("compute-07").await.unwrap_err();
        assert!(err.is_consistency_violation());
        assert_matches!(
            err,
            Error::StepFailed {
                step: ReconcileStep::SearchHostGroup,
                ..
            }
        );
        assert_eq!(array.write_count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_mapping_view_and_lun_group_reuse_existing() {
        let (array, mapper) = setup();

        let view = mapper.ensure_mapping_view("compute-07").await.unwrap();
        let group = mapper.ensure_lun_group("compute-07").await.unwrap();
        assert_eq!(view.name, "compute-07");
        assert_eq!(group.name, "compute-07");

        array.clear_calls();
        assert_eq!(mapper.ensure_mapping_view("compute-07").await.unwrap().id, view.id);
        assert_eq!(mapper.ensure_lun_group("compute-07").await.unwrap().id, group.id);
        assert_eq!(array.write_count(), 0);
        assert_eq!(array.count(ObjectKind::MappingView), 1);
        assert_eq!(array.count(ObjectKind::LunGroup), 1);
    }

    #[tokio::test]
    async fn test_duplicate_mapping_views_and_lun_groups_write_nothing() {
        let (array, mapper) = setup();
        for kind in [ObjectKind::MappingView, ObjectKind::LunGroup] {
            array.seed(kind, json!({"NAME": "compute-07"}));
            array.seed(kind, json!({"NAME": "compute-07"}));
        }

        let err = mapper.ensure_mapping_view("compute-07").await.unwrap_err();
        assert!(err.is_consistency_violation());
        assert_matches!(
            err,
            Error::StepFailed {
                step: ReconcileStep::SearchMappingView,
                ..
            }
        );

        let err = mapper.ensure_lun_group("compute-07").await.unwrap_err();
        assert!(err.is_consistency_violation());
        assert_matches!(
            err,
            Error::StepFailed {
                step: ReconcileStep::SearchLunGroup,
                ..
            }
        );
        assert_eq!(array.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_host_is_a_consistency_error() {
        let (array, mapper) = setup();
        array.seed(ObjectKind::HostGroup, json!({"NAME": "compute-07"}));

        let err = mapper.ensure_host_group("compute-07").await.unwrap_err();
        assert!(err.is_consistency_violation());
        assert_eq!(array.write_count(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_mapping() {
        let (array, mapper) = setup();
        let pg = array.seed(ObjectKind::PortGroup, json!({"NAME": "iscsi"}));

        let (hg, host) = mapper.ensure_host_group("compute-07").await.unwrap();
        assert_eq!(array.count(ObjectKind::Host), 1);
        assert_eq!(array.associations().len(), 1);

        let view = mapper.ensure_mapping_view("compute-07").await.unwrap();
        let lun_group = mapper.ensure_lun_group("compute-07").await.unwrap();
        assert_eq!(array.count(ObjectKind::MappingView), 1);

        array.clear_calls();
        let steps = mapper.map(&view, &hg, Some(&lun_group), &pg).await.unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(
            array.associations(),
            vec![
                Association::new(ObjectKind::MappingView, &view.id, ObjectKind::HostGroup, &hg.id),
                Association::new(ObjectKind::MappingView, &view.id, ObjectKind::LunGroup, &lun_group.id),
                Association::new(ObjectKind::MappingView, &view.id, ObjectKind::PortGroup, &pg),
            ]
        );

        // Fresh records carry the flags set by the first pass
        let hg = mapper.repos.host_groups.get(&hg.id).await.unwrap();
        let lun_group = mapper.repos.lun_groups.get(&lun_group.id).await.unwrap();
        array.clear_calls();
        let steps = mapper.map(&view, &hg, Some(&lun_group), &pg).await.unwrap();
        assert!(steps.is_empty());
        assert!(array.calls_of(ArrayOp::Associate).is_empty());

        let lun = array.seed(ObjectKind::Lun, json!({"NAME": "w-1"}));
        assert!(mapper.attach_lun(&lun_group, &lun).await.unwrap());
        assert!(!mapper.attach_lun(&lun_group, &lun).await.unwrap());
        assert_eq!(mapper.host_lun_id(&lun, &host.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_map_without_lun_group() {
        let (array, mapper) = setup();
        let pg = array.seed(ObjectKind::PortGroup, json!({"NAME": "iscsi"}));
        let (hg, _) = mapper.ensure_host_group("compute-07").await.unwrap();
        let view = mapper.ensure_mapping_view("compute-07").await.unwrap();

        array.clear_calls();
        mapper.map(&view, &hg, None, &pg).await.unwrap();
        let kinds: Vec<ObjectKind> = array.associations().iter().map(|a| a.member).collect();
        assert_eq!(kinds, vec![ObjectKind::HostGroup, ObjectKind::PortGroup]);
    }

    #[tokio::test]
    async fn test_map_failure_names_step_and_completed_writes() {
        let (array, mapper) = setup();
        let pg = array.seed(ObjectKind::PortGroup, json!({"NAME": "iscsi"}));
        let (hg, _) = mapper.ensure_host_group("compute-07").await.unwrap();
        let view = mapper.ensure_mapping_view("compute-07").await.unwrap();
        let lun_group = mapper.ensure_lun_group("compute-07").await.unwrap();

        array.inject_fault(
            ArrayOp::Associate,
            ObjectKind::LunGroup,
            Fault::Transport("connection reset".into()),
        );
        array.clear_calls();

        let err = mapper
            .map(&view, &hg, Some(&lun_group), &pg)
            .await
            .unwrap_err();
        assert_matches!(
            &err,
            Error::StepFailed {
                step: ReconcileStep::AssociateLunGroup,
                ..
            }
        );
        assert_eq!(err.completed_steps().len(), 1);
        assert_eq!(err.completed_steps()[0].kind, ObjectKind::HostGroup);
        // Port group is never attempted after the failure
        assert_eq!(array.calls_of(ArrayOp::Associate).len(), 2);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unmap_reverses_map() {
        let (array, mapper) = setup();
        let pg = array.seed(ObjectKind::PortGroup, json!({"NAME": "iscsi"}));
        let (hg, _) = mapper.ensure_host_group("compute-07").await.unwrap();
        let view = mapper.ensure_mapping_view("compute-07").await.unwrap();
        let lun_group = mapper.ensure_lun_group("compute-07").await.unwrap();
        mapper.map(&view, &hg, Some(&lun_group), &pg).await.unwrap();

        let hg = mapper.repos.host_groups.get(&hg.id).await.unwrap();
        let lun_group = mapper.repos.lun_groups.get(&lun_group.id).await.unwrap();
        let steps = mapper
            .unmap(&view, &hg, Some(&lun_group), &pg)
            .await
            .unwrap();

        let order: Vec<ReconcileStep> = steps.iter().map(|s| s.step).collect();
        assert_eq!(
            order,
            vec![
                ReconcileStep::RemovePortGroup,
                ReconcileStep::RemoveLunGroup,
                ReconcileStep::RemoveHostGroup,
                ReconcileStep::DeleteMappingView,
            ]
        );
        assert_eq!(array.count(ObjectKind::MappingView), 0);
        assert!(!mapper.repos.host_groups.get(&hg.id).await.unwrap().added_to_mapping_view);
    }

    #[tokio::test]
    async fn test_teardown_order_and_not_found() {
        let (array, mapper) = setup();
        let (hg, host) = mapper.ensure_host_group("compute-07").await.unwrap();

        array.clear_calls();
        mapper.teardown(&hg.id).await.unwrap();

        let writes: Vec<ArrayCall> = array.calls().into_iter().filter(|c| c.is_write()).collect();
        assert_eq!(
            writes,
            vec![
                ArrayCall::Disassociate(Association::new(
                    ObjectKind::HostGroup,
                    &hg.id,
                    ObjectKind::Host,
                    &host.id
                )),
                ArrayCall::Delete(ObjectKind::Host, host.id.clone()),
                ArrayCall::Delete(ObjectKind::HostGroup, hg.id.clone()),
            ]
        );

        let err = mapper.teardown(&hg.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert_matches!(
            err,
            Error::StepFailed {
                step: ReconcileStep::GetHostGroup,
                ..
            }
        );
    }

    #[tokio::test]
    async fn test_teardown_failure_carries_saga() {
        let (array, mapper) = setup();
        let (hg, host) = mapper.ensure_host_group("compute-07").await.unwrap();
        array.inject_fault(ArrayOp::Delete, ObjectKind::Host, Fault::Api {
            code: 1077948993,
            description: "host is busy".into(),
        });

        let err = mapper.teardown(&hg.id).await.unwrap_err();
        assert_matches!(
            &err,
            Error::StepFailed {
                step: ReconcileStep::DeleteHost,
                ..
            }
        );
        assert_eq!(err.completed_steps().len(), 1);
        assert_eq!(err.completed_steps()[0].id, host.id);
        assert_eq!(err.completed_steps()[0].effect, SagaEffect::Disassociated);
    }

    #[tokio::test]
    async fn test_writes_are_counted() {
        let array = Arc::new(InMemoryArray::new());
        let registry = Registry::new();
        let metrics = Arc::new(Metrics::register(&registry).unwrap());
        let mapper = HostMapper::new(Repositories::new(array.clone())).with_metrics(metrics.clone());

        mapper.ensure_host_group("compute-07").await.unwrap();
        assert_eq!(metrics.writes(ObjectKind::Host, "create"), 1);
        assert_eq!(metrics.writes(ObjectKind::HostGroup, "create"), 1);
        assert_eq!(metrics.writes(ObjectKind::Host, "associate"), 1);
    }
}
