//! Snapshot repository

use super::{decode, decode_listing};
use crate::domain::entities::Snapshot;
use crate::domain::ports::{ArrayAction, ArrayClientRef, Listing, ObjectKind, SearchQuery};
use crate::error::Result;
use crate::naming::encode_snapshot_name;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct SnapshotRepository {
    client: ArrayClientRef,
}

impl SnapshotRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<Snapshot>> {
        decode_listing(self.client.list(ObjectKind::Snapshot, query).await?)
    }

    /// Search the snapshot backing a snapshot UUID
    pub async fn find_by_uuid(&self, id: &Uuid) -> Result<Listing<Snapshot>> {
        self.list(&SearchQuery::by_name(&encode_snapshot_name(id)))
            .await
    }

    pub async fn get(&self, snapshot_id: &str) -> Result<Snapshot> {
        decode(self.client.get(ObjectKind::Snapshot, snapshot_id).await?)
    }

    /// Take a snapshot of `lun_id`. The snapshot starts inactive.
    pub async fn create(&self, lun_id: &str, id: &Uuid, description: &str) -> Result<Snapshot> {
        let payload = json!({
            "TYPE": ObjectKind::Snapshot.type_code().to_string(),
            "NAME": encode_snapshot_name(id),
            "PARENTTYPE": ObjectKind::Lun.type_code().to_string(),
            "PARENTID": lun_id,
            "DESCRIPTION": description,
        });

        let snapshot: Snapshot = decode(self.client.create(ObjectKind::Snapshot, payload).await?)?;
        info!(
            "Created snapshot {} (ID: {}) of LUN {}",
            snapshot.name, snapshot.id, lun_id
        );
        Ok(snapshot)
    }

    pub async fn delete(&self, snapshot_id: &str) -> Result<()> {
        self.client.delete(ObjectKind::Snapshot, snapshot_id).await?;
        info!("Deleted snapshot {}", snapshot_id);
        Ok(())
    }

    pub async fn activate(&self, snapshot_id: &str) -> Result<()> {
        self.client
            .invoke(ArrayAction::ActivateSnapshot {
                snapshot_id: snapshot_id.to_string(),
            })
            .await?;
        info!("Activated snapshot {}", snapshot_id);
        Ok(())
    }

    pub async fn stop(&self, snapshot_id: &str) -> Result<()> {
        self.client
            .invoke(ArrayAction::StopSnapshot {
                snapshot_id: snapshot_id.to_string(),
            })
            .await?;
        info!("Stopped snapshot {}", snapshot_id);
        Ok(())
    }
}
