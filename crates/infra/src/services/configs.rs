use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use xadmin_core::PageRequest;

use super::{ServiceError, ServiceResult, optional, required};
use crate::directory::{ConfigRecord, DirectoryStore};

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigInput {
    pub value: serde_json::Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Key/value system settings.
pub struct ConfigService {
    store: Arc<dyn DirectoryStore>,
}

impl ConfigService {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, request: &PageRequest) -> ServiceResult<Vec<ConfigRecord>> {
        Ok(self
            .store
            .list_configs()
            .await?
            .into_iter()
            .filter(|c| request.matches(&[Some(c.key.as_str()), Some(c.name.as_str()), c.category.as_deref()]))
            .collect())
    }

    pub async fn get(&self, key: &str) -> ServiceResult<ConfigRecord> {
        self.store
            .config_by_key(key)
            .await?
            .ok_or_else(|| ServiceError::not_found("config"))
    }

    /// Value of an active entry, if any.
    pub async fn value(&self, key: &str) -> ServiceResult<Option<serde_json::Value>> {
        Ok(self
            .store
            .config_by_key(key)
            .await?
            .filter(|c| c.is_active)
            .map(|c| c.value))
    }

    pub async fn upsert(&self, key: &str, input: ConfigInput) -> ServiceResult<ConfigRecord> {
        let key = required("key", key)?;
        let now = Utc::now();
        let existing = self.store.config_by_key(&key).await?;

        let record = ConfigRecord {
            id: existing.as_ref().map(|c| c.id).unwrap_or_default(),
            name: optional(input.name.as_deref())
                .or_else(|| existing.as_ref().map(|c| c.name.clone()))
                .unwrap_or_else(|| key.clone()),
            category: optional(input.category.as_deref()),
            key,
            value: input.value,
            is_active: input.is_active,
            created_at: existing.as_ref().map(|c| c.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.store.save_config(&record).await?;
        tracing::info!(key = %record.key, "config saved");
        Ok(record)
    }

    pub async fn delete(&self, key: &str) -> ServiceResult<()> {
        if !self.store.delete_config(key).await? {
            return Err(ServiceError::not_found("config"));
        }
        Ok(())
    }
}
