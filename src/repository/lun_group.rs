//! LUN group repository

use super::{decode, decode_listing};
use crate::domain::entities::{Lun, LunGroup};
use crate::domain::ports::{ArrayClientRef, Association, Listing, ObjectKind, SearchQuery};
use crate::error::Result;
use crate::naming::encode_host_name;
use serde_json::json;
use tracing::info;

/// Application type "other"
const APP_TYPE: &str = "0";

#[derive(Clone)]
pub struct LunGroupRepository {
    client: ArrayClientRef,
}

impl LunGroupRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<LunGroup>> {
        decode_listing(self.client.list(ObjectKind::LunGroup, query).await?)
    }

    pub async fn find_by_hostname(&self, hostname: &str) -> Result<Listing<LunGroup>> {
        self.list(&SearchQuery::by_name(&encode_host_name(hostname)))
            .await
    }

    pub async fn get(&self, lun_group_id: &str) -> Result<LunGroup> {
        decode(self.client.get(ObjectKind::LunGroup, lun_group_id).await?)
    }

    pub async fn create(&self, hostname: &str) -> Result<LunGroup> {
        let payload = json!({
            "NAME": encode_host_name(hostname),
            "DESCRIPTION": hostname,
            "APPTYPE": APP_TYPE,
        });

        let lun_group: LunGroup = decode(self.client.create(ObjectKind::LunGroup, payload).await?)?;
        info!("Created lungroup {} (ID: {})", lun_group.name, lun_group.id);
        Ok(lun_group)
    }

    pub async fn delete(&self, lun_group_id: &str) -> Result<()> {
        self.client.delete(ObjectKind::LunGroup, lun_group_id).await?;
        info!("Deleted lungroup {}", lun_group_id);
        Ok(())
    }

    pub async fn associate_lun(&self, lun_group_id: &str, lun_id: &str) -> Result<()> {
        self.client
            .associate(&Self::membership(lun_group_id, lun_id))
            .await?;
        info!("Associated LUN {} to lungroup {}", lun_id, lun_group_id);
        Ok(())
    }

    pub async fn disassociate_lun(&self, lun_group_id: &str, lun_id: &str) -> Result<()> {
        self.client
            .disassociate(&Self::membership(lun_group_id, lun_id))
            .await?;
        info!("Disassociated LUN {} from lungroup {}", lun_id, lun_group_id);
        Ok(())
    }

    /// LUNs that are members of the group
    pub async fn members(&self, lun_group_id: &str) -> Result<Listing<Lun>> {
        let query = SearchQuery::associated_with(ObjectKind::LunGroup, lun_group_id);
        decode_listing(self.client.list_associated(ObjectKind::Lun, &query).await?)
    }

    /// Membership check; the LUN's own flag does not say which group
    pub async fn contains_lun(&self, lun_group_id: &str, lun_id: &str) -> Result<bool> {
        Ok(self
            .members(lun_group_id)
            .await?
            .into_vec()
            .iter()
            .any(|lun| lun.id == lun_id))
    }

    fn membership(lun_group_id: &str, lun_id: &str) -> Association {
        Association::new(ObjectKind::LunGroup, lun_group_id, ObjectKind::Lun, lun_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::memory::InMemoryArray;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lun_membership() {
        let array = Arc::new(InMemoryArray::new());
        let repo = LunGroupRepository::new(array.clone());
        let group = repo.create("compute-07").await.unwrap();
        let lun = array.seed(ObjectKind::Lun, json!({"NAME": "w-1", "ISADD2LUNGROUP": "false"}));

        assert!(!repo.contains_lun(&group.id, &lun).await.unwrap());
        repo.associate_lun(&group.id, &lun).await.unwrap();
        assert!(repo.contains_lun(&group.id, &lun).await.unwrap());
        assert_eq!(
            array.record(ObjectKind::Lun, &lun).unwrap()["ISADD2LUNGROUP"],
            "true"
        );

        repo.disassociate_lun(&group.id, &lun).await.unwrap();
        assert!(repo.members(&group.id).await.unwrap().is_empty());
    }
}
