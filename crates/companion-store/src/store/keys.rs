//! Persistence for the API key pool.

use super::{read_json, write_json, Store};
use crate::keys::{ApiKeyPool, KeyPoolError};
use async_trait::async_trait;
use chrono::Utc;
use companion_core::{error::CompanionError, service::Service, traits::KeySource};
use tracing::debug;

const KEYS_FILE: &str = "api_keys.json";

impl Store {
    /// Current pool snapshot.
    pub async fn key_pool(&self) -> Result<ApiKeyPool, CompanionError> {
        let path = self.config_path(KEYS_FILE);
        let _guard = self.lock(&path).await;
        Ok(read_json(&path).await?.unwrap_or_default())
    }

    /// Mutate the pool under its lock and persist the result.
    async fn with_key_pool<F, R>(&self, f: F) -> Result<R, CompanionError>
    where
        F: FnOnce(&mut ApiKeyPool) -> R,
    {
        let path = self.config_path(KEYS_FILE);
        let _guard = self.lock(&path).await;
        let mut pool: ApiKeyPool = read_json(&path).await?.unwrap_or_default();
        let out = f(&mut pool);
        write_json(&path, &pool).await?;
        Ok(out)
    }

    pub async fn add_key(
        &self,
        service: Service,
        key: &str,
    ) -> Result<Result<(), KeyPoolError>, CompanionError> {
        self.with_key_pool(|pool| pool.add(service, key)).await
    }

    pub async fn remove_key(
        &self,
        service: Service,
        key: &str,
    ) -> Result<Result<(), KeyPoolError>, CompanionError> {
        self.with_key_pool(|pool| pool.remove(service, key)).await
    }

    /// Add keys from a comma-separated list, skipping ones already present.
    pub async fn seed_keys(&self, service: Service, csv: &str) -> Result<usize, CompanionError> {
        self.with_key_pool(|pool| {
            csv.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .filter(|k| pool.add(service, k).is_ok())
                .count()
        })
        .await
    }
}

#[async_trait]
impl KeySource for Store {
    async fn next_key(&self, service: Service) -> Result<Option<String>, CompanionError> {
        let key = self
            .with_key_pool(|pool| pool.next_key(service, Utc::now()))
            .await?;
        if key.is_some() {
            debug!("keys: rotated {service}");
        }
        Ok(key)
    }

    async fn has_keys(&self, service: Service) -> bool {
        self.key_pool()
            .await
            .map(|pool| !pool.keys(service).is_empty())
            .unwrap_or(false)
    }
}
