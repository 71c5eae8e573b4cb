//! iSCSI target port repository
//!
//! A target port ID has the form `<n>+<iqn>,t,<tpgt>`, for example
//! `0+iqn.2006-08.com.huawei:oceanstor:2100:192.0.2.10,t,0x0001`.

use super::decode_listing;
use crate::domain::entities::TargetPort;
use crate::domain::ports::{ArrayClientRef, Listing, ObjectKind, SearchQuery};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct TargetPortRepository {
    client: ArrayClientRef,
}

impl TargetPortRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Listing<TargetPort>> {
        decode_listing(
            self.client
                .list(ObjectKind::TargetPort, &SearchQuery::default())
                .await?,
        )
    }

    /// Target IQNs of every iSCSI port, in listing order
    pub async fn target_iqns(&self) -> Result<Vec<String>> {
        self.list()
            .await?
            .into_vec()
            .iter()
            .map(|port| parse_target_port_id(&port.id))
            .collect()
    }
}

/// Extract the IQN from a target port ID
pub fn parse_target_port_id(id: &str) -> Result<String> {
    let invalid = || Error::InvalidTargetPort(id.to_string());

    let halves: Vec<&str> = id.split('+').collect();
    if halves.len() != 2 {
        return Err(invalid());
    }
    let parts: Vec<&str> = halves[1].split(',').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let iqn = parts[0];
    if !iqn.starts_with("iqn") {
        return Err(invalid());
    }
    Ok(iqn.to_string())
}
