//! Redis-backed rate counter.
//!
//! Sliding-window-ish counting via atomic INCR with a TTL stamped when the
//! key is first created. Approximate under concurrency, bounded overshoot.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::time::Duration;

use crate::error::ServiceError;
use crate::store::RateCounterStore;

#[derive(Clone)]
pub struct RedisCounterStore {
    manager: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, ServiceError> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects automatically.
        let manager = client.get_connection_manager().await?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl RateCounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, ServiceError> {
        let mut conn = self.manager.clone();

        let count: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;

        // First hit creates the key; give it the window as TTL. Later hits
        // leave the deadline alone so the window does not slide forward.
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(window.as_secs())
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        Ok(count)
    }
}
