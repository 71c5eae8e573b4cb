//! Array Adapters
//!
//! Implementations of the [`ArrayClient`](crate::domain::ports::ArrayClient) port:
//! - Dorado: REST transport to a real array
//! - Memory: in-process array for dry runs and tests

pub mod http;
pub mod memory;

pub use http::DoradoClient;
pub use memory::InMemoryArray;

use crate::config::ArrayConfig;
use crate::domain::ports::{ArrayClientRef, ObjectKind};
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Factory for creating array adapters
pub struct ArrayFactory;

impl ArrayFactory {
    /// Create an adapter by name
    pub fn create(name: &str, config: ArrayConfig) -> Result<ArrayClientRef> {
        match name.to_lowercase().as_str() {
            "dorado" | "rest" => Ok(Arc::new(DoradoClient::new(config)?)),
            "memory" | "dry-run" => Ok(Arc::new(InMemoryArray::new())),
            _ => Err(Error::Configuration(format!(
                "unknown array adapter: {}",
                name
            ))),
        }
    }

    /// Adapter for a run mode: REST, or for dry runs an in-memory array
    /// holding the `seed` records
    pub fn for_mode(
        dry_run: bool,
        config: ArrayConfig,
        seed: Vec<(ObjectKind, Value)>,
    ) -> Result<ArrayClientRef> {
        if !dry_run {
            return Self::create("dorado", config);
        }

        let array = InMemoryArray::new();
        for (kind, record) in seed {
            array.seed(kind, record);
        }
        Ok(Arc::new(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_factory() {
        let client = ArrayFactory::for_mode(true, ArrayConfig::default(), vec![]).unwrap();
        assert_eq!(client.adapter_name(), "memory");

        // REST adapter refuses a config without endpoints
        assert_matches!(
            ArrayFactory::for_mode(false, ArrayConfig::default(), vec![]).err(),
            Some(Error::Configuration(_))
        );
        assert_matches!(
            ArrayFactory::create("iscsi", ArrayConfig::default()).err(),
            Some(Error::Configuration(_))
        );
    }

    #[tokio::test]
    async fn test_dry_run_is_seeded() {
        let seed = vec![(ObjectKind::PortGroup, json!({"ID": "7", "NAME": "pg"}))];
        let client = ArrayFactory::for_mode(true, ArrayConfig::default(), seed).unwrap();

        let port_group = client.get(ObjectKind::PortGroup, "7").await.unwrap();
        assert_eq!(port_group["NAME"], "pg");
    }
}
