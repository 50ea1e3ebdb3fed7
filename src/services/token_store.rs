//! Durable TTL key-value store backed by Redis
//!
//! Short-lived tokens live here instead of process memory so a restart does
//! not invalidate unexpired entries. Every entry carries an explicit TTL.

use crate::error::{ApiError, Result};
use redis::{AsyncCommands, Client};
use std::sync::Arc;

pub struct TokenStore {
    client: Arc<Client>,
}

impl TokenStore {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis connection failed: {}", e)))
    }

    /// Store `value` under `kind:key` for `ttl_seconds`.
    pub async fn put(&self, kind: &str, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(Self::key(kind, key), value, ttl_seconds)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis SETEX failed: {}", e)))?;
        Ok(())
    }

    /// Read a live entry, or None once it has expired.
    pub async fn get(&self, kind: &str, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn
            .get(Self::key(kind, key))
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis GET failed: {}", e)))?;
        Ok(value)
    }

    /// Read and atomically consume a one-shot entry.
    pub async fn take(&self, kind: &str, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn
            .get_del(Self::key(kind, key))
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis GETDEL failed: {}", e)))?;
        Ok(value)
    }

    fn key(kind: &str, key: &str) -> String {
        format!("token_store:{}:{}", kind, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced_per_kind() {
        assert_eq!(
            TokenStore::key("app_store", "service"),
            "token_store:app_store:service"
        );
    }
}
