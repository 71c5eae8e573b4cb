//! HyperMetro domain repository

use super::decode_listing;
use crate::domain::entities::HyperMetroDomain;
use crate::domain::ports::{ArrayClientRef, Listing, ObjectKind, SearchQuery};
use crate::error::Result;

#[derive(Clone)]
pub struct HyperMetroDomainRepository {
    client: ArrayClientRef,
}

impl HyperMetroDomainRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Listing<HyperMetroDomain>> {
        decode_listing(
            self.client
                .list(ObjectKind::HyperMetroDomain, &SearchQuery::default())
                .await?,
        )
    }
}
