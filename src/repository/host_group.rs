//! Host group repository
//!
//! A mapping view needs a host group; in this deployment a host group holds
//! exactly one host.

use super::{decode, decode_listing};
use crate::domain::entities::HostGroup;
use crate::domain::ports::{ArrayClientRef, Association, Listing, ObjectKind, SearchQuery};
use crate::error::Result;
use crate::naming::encode_host_name;
use serde_json::json;
use tracing::info;

#[derive(Clone)]
pub struct HostGroupRepository {
    client: ArrayClientRef,
}

impl HostGroupRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<HostGroup>> {
        decode_listing(self.client.list(ObjectKind::HostGroup, query).await?)
    }

    pub async fn find_by_hostname(&self, hostname: &str) -> Result<Listing<HostGroup>> {
        self.list(&SearchQuery::by_name(&encode_host_name(hostname)))
            .await
    }

    pub async fn get(&self, host_group_id: &str) -> Result<HostGroup> {
        decode(self.client.get(ObjectKind::HostGroup, host_group_id).await?)
    }

    pub async fn create(&self, hostname: &str) -> Result<HostGroup> {
        let payload = json!({
            "NAME": encode_host_name(hostname),
            "DESCRIPTION": hostname,
        });

        let host_group: HostGroup =
            decode(self.client.create(ObjectKind::HostGroup, payload).await?)?;
        info!("Created hostgroup {} (ID: {})", host_group.name, host_group.id);
        Ok(host_group)
    }

    pub async fn delete(&self, host_group_id: &str) -> Result<()> {
        self.client.delete(ObjectKind::HostGroup, host_group_id).await?;
        info!("Deleted hostgroup {}", host_group_id);
        Ok(())
    }

    pub async fn associate_host(&self, host_group_id: &str, host_id: &str) -> Result<()> {
        self.client
            .associate(&Self::membership(host_group_id, host_id))
            .await?;
        info!("Associated host {} to hostgroup {}", host_id, host_group_id);
        Ok(())
    }

    pub async fn disassociate_host(&self, host_group_id: &str, host_id: &str) -> Result<()> {
        self.client
            .disassociate(&Self::membership(host_group_id, host_id))
            .await?;
        info!("Disassociated host {} from hostgroup {}", host_id, host_group_id);
        Ok(())
    }

    fn membership(host_group_id: &str, host_id: &str) -> Association {
        Association::new(ObjectKind::HostGroup, host_group_id, ObjectKind::Host, host_id)
    }
}
