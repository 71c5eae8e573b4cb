//! Port group repository
//!
//! Port groups are created by the storage administrator; the provisioner
//! only reads them and attaches them to mapping views.

use super::{decode, decode_listing};
use crate::domain::entities::PortGroup;
use crate::domain::ports::{ArrayClientRef, Listing, ObjectKind, SearchQuery};
use crate::error::Result;

#[derive(Clone)]
pub struct PortGroupRepository {
    client: ArrayClientRef,
}

impl PortGroupRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<PortGroup>> {
        decode_listing(self.client.list(ObjectKind::PortGroup, query).await?)
    }

    pub async fn get(&self, port_group_id: &str) -> Result<PortGroup> {
        decode(self.client.get(ObjectKind::PortGroup, port_group_id).await?)
    }

    /// Port groups attached to a mapping view
    pub async fn list_in_mapping_view(&self, mapping_view_id: &str) -> Result<Listing<PortGroup>> {
        let query = SearchQuery::associated_with(ObjectKind::MappingView, mapping_view_id);
        decode_listing(self.client.list_associated(ObjectKind::PortGroup, &query).await?)
    }

    /// Port groups carry no membership flag, so ask the view
    pub async fn is_added_to_mapping_view(&self, mapping_view_id: &str, port_group_id: &str) -> Result<bool> {
        Ok(self
            .list_in_mapping_view(mapping_view_id)
            .await?
            .into_vec()
            .iter()
            .any(|pg| pg.id == port_group_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::memory::InMemoryArray;
    use crate::domain::ports::Association;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_membership_check() {
        let array = Arc::new(InMemoryArray::new());
        let repo = PortGroupRepository::new(array.clone());
        let pg = array.seed(ObjectKind::PortGroup, json!({"ID": "PG1", "NAME": "iscsi"}));
        let mv = array.seed(ObjectKind::MappingView, json!({"NAME": "compute-07"}));

        assert!(!repo.is_added_to_mapping_view(&mv, &pg).await.unwrap());

        array.seed_association(Association::new(ObjectKind::MappingView, &mv, ObjectKind::PortGroup, &pg));
        assert!(repo.is_added_to_mapping_view(&mv, &pg).await.unwrap());
        assert_eq!(repo.get("PG1").await.unwrap().name, "iscsi");
    }
}
