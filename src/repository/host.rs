//! Host repository

use super::{decode, decode_listing};
use crate::domain::entities::Host;
use crate::domain::ports::{ArrayClientRef, Listing, ObjectKind, SearchQuery};
use crate::error::Result;
use crate::naming::encode_host_name;
use serde_json::json;
use tracing::info;

/// Hypervisor records on the array
#[derive(Clone)]
pub struct HostRepository {
    client: ArrayClientRef,
}

impl HostRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<Host>> {
        decode_listing(self.client.list(ObjectKind::Host, query).await?)
    }

    /// Search by the array-side NAME, taken verbatim
    pub async fn find_by_name(&self, name: &str) -> Result<Listing<Host>> {
        self.list(&SearchQuery::by_name(name)).await
    }

    /// Search by compute host name, encoded to fit the NAME field
    pub async fn find_by_hostname(&self, hostname: &str) -> Result<Listing<Host>> {
        self.find_by_name(&encode_host_name(hostname)).await
    }

    pub async fn get(&self, host_id: &str) -> Result<Host> {
        decode(self.client.get(ObjectKind::Host, host_id).await?)
    }

    /// Create a host. The full host name goes into DESCRIPTION.
    pub async fn create(&self, hostname: &str) -> Result<Host> {
        let payload = json!({
            "NAME": encode_host_name(hostname),
            "TYPE": ObjectKind::Host.type_code().to_string(),
            "OPERATIONSYSTEM": "0",
            "DESCRIPTION": hostname,
        });

        let host: Host = decode(self.client.create(ObjectKind::Host, payload).await?)?;
        info!("Created host {} (ID: {})", host.name, host.id);
        Ok(host)
    }

    pub async fn delete(&self, host_id: &str) -> Result<()> {
        self.client.delete(ObjectKind::Host, host_id).await?;
        info!("Deleted host {}", host_id);
        Ok(())
    }
}
