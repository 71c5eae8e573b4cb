//! Array system operations

use crate::domain::ports::{ArrayAction, ArrayClientRef, ImportantPassword, PowerOperation};
use crate::error::Result;
use tracing::warn;

#[derive(Clone)]
pub struct SystemRepository {
    client: ArrayClientRef,
}

impl SystemRepository {
    pub fn new(client: ArrayClientRef) -> Self {
        Self { client }
    }

    /// Power off or reboot the whole array. Every host mapped to it loses
    /// its storage.
    pub async fn power(
        &self,
        operation: PowerOperation,
        important_password: ImportantPassword,
    ) -> Result<()> {
        warn!("Requesting array {}", operation);
        self.client
            .invoke(ArrayAction::Power {
                operation,
                important_password,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::memory::{ArrayCall, ArrayOp, InMemoryArray};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_power_sends_password_but_hides_it() {
        let array = Arc::new(InMemoryArray::new());
        let repo = SystemRepository::new(array.clone());

        repo.power(PowerOperation::Reboot, ImportantPassword::new("s3cret"))
            .await
            .unwrap();

        let calls = array.calls_of(ArrayOp::Invoke);
        assert_eq!(calls.len(), 1);
        let ArrayCall::Invoke(ArrayAction::Power {
            operation,
            important_password,
        }) = &calls[0]
        else {
            panic!("unexpected call {:?}", calls[0]);
        };
        assert_eq!(*operation, PowerOperation::Reboot);
        assert_eq!(important_password.expose(), "s3cret");
        assert!(!format!("{:?}", calls[0]).contains("s3cret"));
    }
}
