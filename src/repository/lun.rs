//! LUN repository

use super::{decode, decode_listing};
use crate::domain::entities::{AssociateMetadata, Lun, CAPACITY_UNIT};
use crate::domain::ports::{ArrayAction, ArrayClientRef, Listing, ObjectKind, SearchQuery};
use crate::error::{Error, Result};
use crate::naming::{encode_lun_name, volume_description};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

// =============================================================================
// Creation Policy
// =============================================================================

/// Write-back cache
const WRITE_POLICY: &str = "1";
const PREFETCH_POLICY: &str = "3";
const PREFETCH_VALUE: &str = "0";
/// Thin provisioning
const ALLOC_TYPE: u32 = 1;
const MIRROR_POLICY: &str = "1";
const DATA_TRANSFER_POLICY: &str = "0";
const WORKLOAD_TYPE_ID: &str = "0";

/// Caller-controlled part of a LUN create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLunParams {
    pub name: String,
    pub description: String,
    pub storage_pool_id: String,
    pub capacity_gb: u64,
}

impl CreateLunParams {
    /// Parameters for the LUN backing a volume UUID
    pub fn for_volume(id: &Uuid, storage_pool_id: &str, capacity_gb: u64) -> Self {
        Self {
            name: encode_lun_name(id),
            description: volume_description(id),
            storage_pool_id: storage_pool_id.to_string(),
            capacity_gb,
        }
    }
}

/// Size in GiB as 512-byte sectors
pub fn capacity_sectors(size_gb: u64) -> Result<u64> {
    size_gb
        .checked_mul(CAPACITY_UNIT)
        .ok_or(Error::InvalidCapacity { size_gb })
}

#[derive(Clone)]
pub struct LunRepository {
    client: ArrayClientRef,
}

impl LunRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &SearchQuery) -> Result<Listing<Lun>> {
        decode_listing(self.client.list(ObjectKind::Lun, query).await?)
    }

    pub async fn get(&self, lun_id: &str) -> Result<Lun> {
        decode(self.client.get(ObjectKind::Lun, lun_id).await?)
    }

    pub async fn create(&self, params: &CreateLunParams) -> Result<Lun> {
        let payload = json!({
            "NAME": params.name,
            "PARENTID": params.storage_pool_id,
            "DESCRIPTION": params.description,
            "CAPACITY": capacity_sectors(params.capacity_gb)?,
            "WRITEPOLICY": WRITE_POLICY,
            "PREFETCHVALUE": PREFETCH_VALUE,
            "ALLOCTYPE": ALLOC_TYPE,
            "MIRRORPOLICY": MIRROR_POLICY,
            "DATATRANSFERPOLICY": DATA_TRANSFER_POLICY,
            "WORKLOADTYPEID": WORKLOAD_TYPE_ID,
            "PREFETCHPOLICY": PREFETCH_POLICY,
        });

        let lun: Lun = decode(self.client.create(ObjectKind::Lun, payload).await?)?;
        info!(
            "Created LUN {} (ID: {}, {} GB, pool {})",
            lun.name, lun.id, params.capacity_gb, params.storage_pool_id
        );
        Ok(lun)
    }

    /// Delete a LUN together with its data
    pub async fn delete(&self, lun_id: &str) -> Result<()> {
        self.client.delete(ObjectKind::Lun, lun_id).await?;
        info!("Deleted LUN {}", lun_id);
        Ok(())
    }

    /// Grow a LUN to `new_size_gb`
    pub async fn expand(&self, lun_id: &str, new_size_gb: u64) -> Result<()> {
        let capacity = capacity_sectors(new_size_gb)?;
        self.client
            .invoke(ArrayAction::ExpandLun {
                lun_id: lun_id.to_string(),
                capacity,
            })
            .await?;
        info!("Expanded LUN {} to {} GB", lun_id, new_size_gb);
        Ok(())
    }

    /// LUNs associated to another object (host, LUN group)
    pub async fn list_associated(&self, query: &SearchQuery) -> Result<Listing<Lun>> {
        decode_listing(self.client.list_associated(ObjectKind::Lun, query).await?)
    }

    /// Host-visible SCSI LUN number of `lun_id` on `host_id`
    pub async fn host_lun_id(&self, lun_id: &str, host_id: &str) -> Result<u32> {
        let query = SearchQuery::associated_with(ObjectKind::Host, host_id);
        let luns = self.list_associated(&query).await?.into_vec();

        let lun = luns
            .into_iter()
            .find(|lun| lun.id == lun_id)
            .ok_or_else(|| Error::NotAssociated {
                lun_id: lun_id.to_string(),
                host_id: host_id.to_string(),
            })?;

        let metadata: AssociateMetadata = serde_json::from_str(&lun.associate_metadata)
            .map_err(|e| Error::MetadataParse {
                lun_id: lun_id.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            "LUN {} is host LUN {} on host {}",
            lun_id, metadata.host_lun_id, host_id
        );
        Ok(metadata.host_lun_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::memory::InMemoryArray;
    use crate::domain::ports::Association;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn volume() -> Uuid {
        Uuid::parse_str("4b2b6a5c-1d2e-4f60-8a9b-0c1d2e3f4a5b").unwrap()
    }

    #[tokio::test]
    async fn test_create_payload() {
        let array = Arc::new(InMemoryArray::new());
        let repo = LunRepository::new(array.clone());

        let lun = repo
            .create(&CreateLunParams::for_volume(&volume(), "0", 10))
            .await
            .unwrap();
        assert_eq!(lun.name, encode_lun_name(&volume()));
        assert_eq!(lun.capacity, (10 * CAPACITY_UNIT).to_string());
        assert_eq!(lun.parent_id, "0");

        let record = array.record(ObjectKind::Lun, &lun.id).unwrap();
        assert_eq!(record["ALLOCTYPE"], "1");
        assert_eq!(record["PREFETCHPOLICY"], "3");
        assert_eq!(record["DESCRIPTION"], "volume-4b2b6a5c-1d2e-4f60-8a9b-0c1d2e3f4a5b");

        let query = SearchQuery::by_name(&encode_lun_name(&volume()));
        assert_eq!(repo.list(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expand() {
        let array = Arc::new(InMemoryArray::new());
        let repo = LunRepository::new(array.clone());
        let lun = repo
            .create(&CreateLunParams::for_volume(&volume(), "0", 10))
            .await
            .unwrap();

        repo.expand(&lun.id, 20).await.unwrap();
        assert_eq!(repo.get(&lun.id).await.unwrap().capacity, "41943040");
    }

    #[tokio::test]
    async fn test_oversized_capacity_is_rejected() {
        let array = Arc::new(InMemoryArray::new());
        let repo = LunRepository::new(array.clone());
        let huge = u64::MAX / 1024;

        assert_matches!(
            repo.create(&CreateLunParams::for_volume(&volume(), "0", huge)).await,
            Err(Error::InvalidCapacity { size_gb }) if size_gb == huge
        );
        assert_eq!(array.count(ObjectKind::Lun), 0);

        let lun = repo
            .create(&CreateLunParams::for_volume(&volume(), "0", 10))
            .await
            .unwrap();
        array.clear_calls();
        assert_matches!(
            repo.expand(&lun.id, huge).await,
            Err(Error::InvalidCapacity { .. })
        );
        assert_eq!(array.write_count(), 0);
        assert_eq!(repo.get(&lun.id).await.unwrap().capacity, "20971520");
    }

    fn seed_mapped_lun(array: &InMemoryArray, metadata: Option<&str>) -> (String, String) {
        let host = array.seed(ObjectKind::Host, json!({"NAME": "h"}));
        let hg = array.seed(ObjectKind::HostGroup, json!({"NAME": "h"}));
        let mv = array.seed(ObjectKind::MappingView, json!({"NAME": "h"}));
        let lg = array.seed(ObjectKind::LunGroup, json!({"NAME": "h"}));
        let lun = match metadata {
            Some(m) => array.seed(ObjectKind::Lun, json!({"NAME": "l", "ASSOCIATEMETADATA": m})),
            None => array.seed(ObjectKind::Lun, json!({"NAME": "l"})),
        };
        array.seed_association(Association::new(ObjectKind::HostGroup, &hg, ObjectKind::Host, &host));
        array.seed_association(Association::new(ObjectKind::MappingView, &mv, ObjectKind::HostGroup, &hg));
        array.seed_association(Association::new(ObjectKind::MappingView, &mv, ObjectKind::LunGroup, &lg));
        array.seed_association(Association::new(ObjectKind::LunGroup, &lg, ObjectKind::Lun, &lun));
        (lun, host)
    }

    #[tokio::test]
    async fn test_host_lun_id() {
        let array = Arc::new(InMemoryArray::new());
        let (lun, host) = seed_mapped_lun(&array, None);
        let repo = LunRepository::new(array.clone());

        assert_eq!(repo.host_lun_id(&lun, &host).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_host_lun_id_errors_are_distinct() {
        let array = Arc::new(InMemoryArray::new());
        let (lun, host) = seed_mapped_lun(&array, Some("{not json"));
        let repo = LunRepository::new(array.clone());

        assert_matches!(
            repo.host_lun_id(&lun, &host).await,
            Err(Error::MetadataParse { .. })
        );
        assert_matches!(
            repo.host_lun_id("999", &host).await,
            Err(Error::NotAssociated { .. })
        );
    }
}
