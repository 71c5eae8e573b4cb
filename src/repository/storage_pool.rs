//! Storage pool repository

use super::{decode, decode_listing};
use crate::domain::entities::StoragePool;
use crate::domain::ports::{ArrayClientRef, Listing, ObjectKind, SearchQuery};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct StoragePoolRepository {
    client: ArrayClientRef,
}

impl StoragePoolRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<StoragePool>> {
        decode_listing(self.client.list(ObjectKind::StoragePool, query).await?)
    }

    pub async fn get(&self, pool_id: &str) -> Result<StoragePool> {
        decode(self.client.get(ObjectKind::StoragePool, pool_id).await?)
    }

    /// The single pool carrying `name`
    pub async fn find_unique_by_name(&self, name: &str) -> Result<StoragePool> {
        let pools = self.list(&SearchQuery::by_name(name)).await?;
        pools
            .at_most_one(ObjectKind::StoragePool, name)?
            .ok_or_else(|| Error::NotFound {
                kind: ObjectKind::StoragePool.to_string(),
                name: name.to_string(),
            })
    }
}
