use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use rentra_core::repository::{CacheInvalidator, CacheScope, IdempotencyStore, VehicleLock};
use rentra_core::BookingError;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

fn lock_key(registration: &str) -> String {
    format!("lock:vehicle:{}", registration)
}

fn idempotency_key(fingerprint: &str) -> String {
    format!("idempotency:reservation:{}", fingerprint)
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// SET NX EX: exactly one concurrent holder per vehicle registration.
    pub async fn acquire_vehicle_lock(
        &self,
        registration: &str,
        token: &str,
        ttl_seconds: u64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(lock_key(registration))
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    /// Compare-and-delete: only the current holder may release. A stale
    /// holder whose lock already expired and was re-acquired gets a no-op.
    pub async fn release_vehicle_lock(&self, registration: &str, token: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#,
        );
        let _: i64 = script
            .key(lock_key(registration))
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get_idempotency(&self, fingerprint: &str) -> RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(idempotency_key(fingerprint)).await
    }

    /// NX so a concurrent duplicate cannot overwrite the winner's id.
    pub async fn put_idempotency(
        &self,
        fingerprint: &str,
        reservation_id: &str,
        ttl_seconds: u64,
    ) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: Option<String> = redis::cmd("SET")
            .arg(idempotency_key(fingerprint))
            .arg(reservation_id)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// SCAN + DEL every key matching `pattern`. KEYS would block the server
    /// on large keyspaces.
    pub async fn delete_pattern(&self, pattern: &str) -> RedisResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let removed: u64 = conn.del(keys).await?;
                deleted += removed;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count <= limit)
    }
}

fn store_err(e: redis::RedisError) -> BookingError {
    BookingError::Store(format!("redis: {e}"))
}

#[async_trait]
impl VehicleLock for RedisClient {
    async fn acquire(
        &self,
        registration: &str,
        ttl_seconds: u64,
    ) -> Result<Option<String>, BookingError> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .acquire_vehicle_lock(registration, &token, ttl_seconds)
            .await
            .map_err(store_err)?;
        Ok(acquired.then_some(token))
    }

    async fn release(&self, registration: &str, token: &str) -> Result<(), BookingError> {
        self.release_vehicle_lock(registration, token)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl IdempotencyStore for RedisClient {
    async fn existing(&self, fingerprint: &str) -> Result<Option<Uuid>, BookingError> {
        let value = self.get_idempotency(fingerprint).await.map_err(store_err)?;
        match value {
            Some(raw) => Uuid::parse_str(&raw)
                .map(Some)
                .map_err(|e| BookingError::Store(format!("bad idempotency value: {e}"))),
            None => Ok(None),
        }
    }

    async fn record(
        &self,
        fingerprint: &str,
        reservation_id: Uuid,
        ttl_seconds: u64,
    ) -> Result<(), BookingError> {
        self.put_idempotency(fingerprint, &reservation_id.to_string(), ttl_seconds)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl CacheInvalidator for RedisClient {
    async fn invalidate(&self, scope: CacheScope, id: &str) -> Result<(), BookingError> {
        let pattern = match scope {
            // Listing queries cache filtered vehicle sets; any availability
            // change can affect any of them.
            CacheScope::VehicleAvailability => "cache:vehicles:*".to_string(),
            CacheScope::CustomerReservations => format!("cache:customer:{}:reservations*", id),
            CacheScope::OwnerReservations => format!("cache:owner:{}:reservations*", id),
        };
        let deleted = self.delete_pattern(&pattern).await.map_err(store_err)?;
        debug!(pattern, deleted, "cache invalidated");
        Ok(())
    }
}
