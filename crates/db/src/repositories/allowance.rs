use std::sync::Arc;

use super::{AllowanceRepository, RepositoryError};
use crate::store::JsonStore;

pub struct JsonAllowanceRepository {
    store: Arc<JsonStore>,
}

impl JsonAllowanceRepository {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl AllowanceRepository for JsonAllowanceRepository {
    async fn grant(&self, user_id: &str, amount: u32) -> Result<u32, RepositoryError> {
        self.store
            .try_mutate(|document| {
                document.allowances.grant(user_id, amount).map_err(RepositoryError::from)
            })
            .await
    }

    async fn remaining(&self, user_id: &str) -> Result<u32, RepositoryError> {
        Ok(self.store.read(|document| document.allowances.remaining(user_id)).await)
    }

    async fn decrement(&self, user_id: &str) -> Result<u32, RepositoryError> {
        Ok(self.store.mutate(|document| document.allowances.decrement(user_id)).await?)
    }
}
