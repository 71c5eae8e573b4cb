//! Volume Lifecycle
//!
//! LUN and snapshot creation with readiness waits. Creation on the array is
//! asynchronous: a new object is polled until it reports ready, then read
//! once more and that read is returned as the final state.
//!
//! A snapshot whose readiness wait fails is deleted before the error is
//! returned. LUNs are never deleted automatically.

use super::poller::{wait_ready, PollOutcome, PollPolicy};
use super::saga::{ReconcileStep, Saga, SagaEffect};
use crate::domain::entities::{Lun, Snapshot};
use crate::domain::ports::ObjectKind;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::repository::{CreateLunParams, Repositories};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Creates, grows and deletes volumes and snapshots
#[derive(Clone)]
pub struct VolumeService {
    repos: Repositories,
    poll: PollPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl VolumeService {
    pub fn new(repos: Repositories, poll: PollPolicy) -> Self {
        Self {
            repos,
            poll,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record(&self, saga: &mut Saga, step: ReconcileStep, effect: SagaEffect, kind: ObjectKind, id: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_write(kind, effect.as_str());
        }
        saga.record(step, effect, kind, id);
    }

    fn record_attempts(&self, kind: ObjectKind, outcome: &PollOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_readiness_attempts(kind, outcome.attempts());
        }
    }

    // =========================================================================
    // LUN
    // =========================================================================

    /// Create the LUN backing volume `id` in the pool named `pool_name`
    pub async fn create_lun(&self, id: &Uuid, capacity_gb: u64, pool_name: &str) -> Result<Lun> {
        let mut saga = Saga::new();
        self.create_lun_in(&mut saga, id, capacity_gb, pool_name).await
    }

    async fn create_lun_in(
        &self,
        saga: &mut Saga,
        id: &Uuid,
        capacity_gb: u64,
        pool_name: &str,
    ) -> Result<Lun> {
        let pool = self
            .repos
            .storage_pools
            .find_unique_by_name(pool_name)
            .await
            .map_err(|e| saga.fail(ReconcileStep::ResolveStoragePool, pool_name, e))?;

        let params = CreateLunParams::for_volume(id, &pool.id, capacity_gb);
        let lun = self
            .repos
            .luns
            .create(&params)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CreateLun, &params.name, e))?;
        self.record(saga, ReconcileStep::CreateLun, SagaEffect::Created, ObjectKind::Lun, &lun.id);
        Ok(lun)
    }

    /// Create a LUN and wait until it is online.
    ///
    /// Returns the record read after the wait, ready or not.
    pub async fn create_lun_with_wait(
        &self,
        id: &Uuid,
        capacity_gb: u64,
        pool_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Lun> {
        let mut saga = Saga::new();
        let lun = self.create_lun_in(&mut saga, id, capacity_gb, pool_name).await?;
        let target = format!("LUN {}", lun.id);

        let luns = &self.repos.luns;
        let lun_id = lun.id.as_str();
        let outcome = wait_ready(&self.poll, cancel, move || async move {
            Ok::<_, Error>(luns.get(lun_id).await?.is_ready())
        })
        .await
        .map_err(|e| saga.fail(ReconcileStep::WaitLunReady, &target, e))?;
        self.record_attempts(ObjectKind::Lun, &outcome);

        let lun = luns
            .get(lun_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::WaitLunReady, &target, e))?;
        if !outcome.is_ready() {
            warn!(
                "LUN {} not ready after {} attempt(s) (HEALTHSTATUS: {}, RUNNINGSTATUS: {})",
                lun.id,
                outcome.attempts(),
                lun.health_status,
                lun.running_status
            );
        }
        Ok(lun)
    }

    pub async fn expand_lun(&self, lun_id: &str, new_size_gb: u64) -> Result<()> {
        self.repos.luns.expand(lun_id, new_size_gb).await
    }

    pub async fn delete_lun(&self, lun_id: &str) -> Result<()> {
        self.repos.luns.delete(lun_id).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_write(ObjectKind::Lun, SagaEffect::Deleted.as_str());
        }
        Ok(())
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Snapshot `lun_id` under the name derived from `id`
    pub async fn create_snapshot(&self, lun_id: &str, id: &Uuid, description: &str) -> Result<Snapshot> {
        let mut saga = Saga::new();
        self.create_snapshot_in(&mut saga, lun_id, id, description).await
    }

    async fn create_snapshot_in(
        &self,
        saga: &mut Saga,
        lun_id: &str,
        id: &Uuid,
        description: &str,
    ) -> Result<Snapshot> {
        let snapshot = self
            .repos
            .snapshots
            .create(lun_id, id, description)
            .await
            .map_err(|e| saga.fail(ReconcileStep::CreateSnapshot, format!("LUN {}", lun_id), e))?;
        self.record(
            saga,
            ReconcileStep::CreateSnapshot,
            SagaEffect::Created,
            ObjectKind::Snapshot,
            &snapshot.id,
        );
        Ok(snapshot)
    }

    /// Create a snapshot and wait until it settles.
    ///
    /// If the wait fails (unhealthy snapshot, read error, cancellation) the
    /// snapshot is deleted once and the wait error is returned.
    pub async fn create_snapshot_with_wait(
        &self,
        lun_id: &str,
        id: &Uuid,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<Snapshot> {
        let mut saga = Saga::new();
        let snapshot = self
            .create_snapshot_in(&mut saga, lun_id, id, description)
            .await?;
        let target = format!("snapshot {}", snapshot.id);

        let snapshots = &self.repos.snapshots;
        let snapshot_id = snapshot.id.as_str();
        let waited = wait_ready(&self.poll, cancel, move || async move {
            snapshots.get(snapshot_id).await?.readiness()
        })
        .await;

        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Snapshot {} failed to become ready, deleting it: {}",
                    snapshot_id, e
                );
                match snapshots.delete(snapshot_id).await {
                    Ok(()) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_compensating_delete(ObjectKind::Snapshot);
                        }
                        self.record(
                            &mut saga,
                            ReconcileStep::WaitSnapshotReady,
                            SagaEffect::Deleted,
                            ObjectKind::Snapshot,
                            snapshot_id,
                        );
                    }
                    Err(delete_err) => {
                        warn!("Failed to delete snapshot {}: {}", snapshot_id, delete_err);
                    }
                }
                return Err(saga.fail(ReconcileStep::WaitSnapshotReady, &target, e));
            }
        };
        self.record_attempts(ObjectKind::Snapshot, &outcome);

        let snapshot = snapshots
            .get(snapshot_id)
            .await
            .map_err(|e| saga.fail(ReconcileStep::WaitSnapshotReady, &target, e))?;
        info!(
            "Snapshot {} of LUN {} settled after {} attempt(s)",
            snapshot.id,
            lun_id,
            outcome.attempts()
        );
        Ok(snapshot)
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.repos.snapshots.delete(snapshot_id).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_write(ObjectKind::Snapshot, SagaEffect::Deleted.as_str());
        }
        Ok(())
    }
}
