//! Mapping view repository

use super::{decode, decode_listing};
use crate::domain::entities::MappingView;
use crate::domain::ports::{ArrayClientRef, Association, Listing, ObjectKind, SearchQuery};
use crate::error::Result;
use crate::naming::encode_host_name;
use serde_json::json;
use tracing::info;

#[derive(Clone)]
pub struct MappingViewRepository {
    client: ArrayClientRef,
}

impl MappingViewRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<MappingView>> {
        decode_listing(self.client.list(ObjectKind::MappingView, query).await?)
    }

    pub async fn find_by_hostname(&self, hostname: &str) -> Result<Listing<MappingView>> {
        self.list(&SearchQuery::by_name(&encode_host_name(hostname)))
            .await
    }

    pub async fn get(&self, mapping_view_id: &str) -> Result<MappingView> {
        decode(self.client.get(ObjectKind::MappingView, mapping_view_id).await?)
    }

    pub async fn create(&self, hostname: &str) -> Result<MappingView> {
        let payload = json!({
            "TYPE": ObjectKind::MappingView.type_code().to_string(),
            "NAME": encode_host_name(hostname),
        });

        let view: MappingView = decode(self.client.create(ObjectKind::MappingView, payload).await?)?;
        info!("Created mapping view {} (ID: {})", view.name, view.id);
        Ok(view)
    }

    pub async fn delete(&self, mapping_view_id: &str) -> Result<()> {
        self.client.delete(ObjectKind::MappingView, mapping_view_id).await?;
        info!("Deleted mapping view {}", mapping_view_id);
        Ok(())
    }

    /// Add a host group, LUN group or port group to the view
    pub async fn associate(&self, mapping_view_id: &str, member: ObjectKind, member_id: &str) -> Result<()> {
        let association = Association::new(ObjectKind::MappingView, mapping_view_id, member, member_id);
        self.client.associate(&association).await?;
        info!("Associated {} {} to mapping view {}", member, member_id, mapping_view_id);
        Ok(())
    }

    pub async fn disassociate(&self, mapping_view_id: &str, member: ObjectKind, member_id: &str) -> Result<()> {
        let association = Association::new(ObjectKind::MappingView, mapping_view_id, member, member_id);
        self.client.disassociate(&association).await?;
        info!("Removed {} {} from mapping view {}", member, member_id, mapping_view_id);
        Ok(())
    }
}
