//! Redis-backed counter store.
//!
//! All multi-step decisions run as Lua scripts so no interleaving with
//! another operation on the same keys is possible; concurrent callers
//! observe a serial order.
//!
//! # Key layout
//!
//! - `sale:{sale_id}:sold` → items sold counter
//! - `sale:{sale_id}:available` → inventory cap (reference value)
//! - `user:{user_id}:sale:{sale_id}:count` → per-user purchase counter
//! - `active_sale_id` → advisory pointer to the active sale (`0` = none)
//! - `checkout:{code}` → hash `{sale_id, user_id, item_id, used, created}`
//!
//! Counters carry the counter TTL (default 24 h) so they outlive the sale
//! window and then expire on their own; the per-user counter resets
//! naturally when the window closes.

use crate::config::RedisConfig;
use crate::error::{Result, SaleError};
use crate::stores::{CachedCode, CachedSale, CounterStore, PurchaseDecision, PurchaseOutcome};
use chrono::Utc;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, Script};
use std::sync::Arc;
use std::time::Duration;

/// Atomic purchase decision: check the global and per-user caps, then
/// increment both counters only if both checks pass.
const ATOMIC_PURCHASE_LUA: &str = r#"
    local sale_key = "sale:" .. ARGV[1] .. ":sold"
    local user_key = "user:" .. ARGV[2] .. ":sale:" .. ARGV[1] .. ":count"
    local max_items = tonumber(ARGV[3])
    local max_user_items = tonumber(ARGV[4])
    local ttl = tonumber(ARGV[5])

    local sold = tonumber(redis.call('GET', sale_key) or 0)
    local user_count = tonumber(redis.call('GET', user_key) or 0)

    if sold >= max_items then
        return {0, "sold_out", sold, user_count}
    end

    if user_count >= max_user_items then
        return {0, "user_limit_exceeded", sold, user_count}
    end

    local new_sold = redis.call('INCR', sale_key)
    local new_user_count = redis.call('INCR', user_key)

    redis.call('EXPIRE', sale_key, ttl)
    redis.call('EXPIRE', user_key, ttl)

    return {1, "success", new_sold, new_user_count}
"#;

/// Reversal of a prior successful decision: decrement each counter only
/// where it is above zero, so repeated compensation can never go negative.
const COMPENSATE_PURCHASE_LUA: &str = r#"
    local sale_key = "sale:" .. ARGV[1] .. ":sold"
    local user_key = "user:" .. ARGV[2] .. ":sale:" .. ARGV[1] .. ":count"

    local sold = tonumber(redis.call('GET', sale_key) or 0)
    local user_count = tonumber(redis.call('GET', user_key) or 0)

    if sold > 0 then
        sold = redis.call('DECR', sale_key)
    end
    if user_count > 0 then
        user_count = redis.call('DECR', user_key)
    end

    return {sold, user_count}
"#;

/// Sale counter initialization: reset the sold counter, record the cap,
/// point the advisory active-sale key at this sale and refresh the
/// sale-info cache hash with a one-window TTL.
const SETUP_SALE_LUA: &str = r#"
    local sale_id = ARGV[1]
    local items_available = tonumber(ARGV[2])
    local ttl = tonumber(ARGV[3])

    redis.call('SET', "sale:" .. sale_id .. ":sold", 0)
    redis.call('SET', "sale:" .. sale_id .. ":available", items_available)
    redis.call('SET', "active_sale_id", sale_id)

    redis.call('EXPIRE', "sale:" .. sale_id .. ":sold", ttl)
    redis.call('EXPIRE', "sale:" .. sale_id .. ":available", ttl)
    redis.call('EXPIRE', "active_sale_id", ttl)

    redis.call('HSET', "sale:" .. sale_id .. ":cache",
        "id", sale_id,
        "available", items_available,
        "sold", 0,
        "active", "true")
    redis.call('EXPIRE', "sale:" .. sale_id .. ":cache", 3600)

    return "OK"
"#;

/// Redis-backed [`CounterStore`] using a shared [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisCounterStore {
    /// Connection manager; cheap to clone per operation.
    conn_manager: ConnectionManager,
    atomic_purchase_script: Arc<Script>,
    compensate_script: Arc<Script>,
    setup_sale_script: Arc<Script>,
    /// Counter key retention in seconds.
    counter_ttl_secs: i64,
    /// Checkout-code cache retention in seconds.
    code_ttl_secs: i64,
}

impl RedisCounterStore {
    /// Connect to Redis and precompile the decision scripts.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::CounterStore`] if the client cannot be created
    /// or the connection manager fails to establish a connection.
    pub async fn connect(
        config: &RedisConfig,
        counter_ttl_secs: i64,
        code_ttl_secs: i64,
    ) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            SaleError::CounterStore(format!("failed to create Redis client: {e}"))
        })?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(config.connect_timeout))
            .set_response_timeout(Duration::from_secs(config.response_timeout));

        let conn_manager = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| {
                SaleError::CounterStore(format!(
                    "failed to create Redis connection manager: {e}"
                ))
            })?;

        Ok(Self {
            conn_manager,
            atomic_purchase_script: Arc::new(Script::new(ATOMIC_PURCHASE_LUA)),
            compensate_script: Arc::new(Script::new(COMPENSATE_PURCHASE_LUA)),
            setup_sale_script: Arc::new(Script::new(SETUP_SALE_LUA)),
            counter_ttl_secs,
            code_ttl_secs,
        })
    }

    fn sold_key(sale_id: i64) -> String {
        format!("sale:{sale_id}:sold")
    }

    fn user_count_key(user_id: &str, sale_id: i64) -> String {
        format!("user:{user_id}:sale:{sale_id}:count")
    }

    fn code_key(code: &str) -> String {
        format!("checkout:{code}")
    }

    fn sale_cache_key(sale_id: i64) -> String {
        format!("sale:{sale_id}:cache")
    }

    async fn get_counter(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| {
            SaleError::CounterStore(format!("failed to read counter {key}: {e}"))
        })?;

        match value {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|e| {
                SaleError::CounterStore(format!("invalid counter value in {key}: {e}"))
            }),
        }
    }
}

impl CounterStore for RedisCounterStore {
    async fn setup_sale(&self, sale_id: i64, items_available: i64) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: String = self
            .setup_sale_script
            .arg(sale_id)
            .arg(items_available)
            .arg(self.counter_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                SaleError::CounterStore(format!("setup sale script failed: {e}"))
            })?;

        tracing::info!(
            sale_id = sale_id,
            items_available = items_available,
            "Initialized sale counters"
        );

        Ok(())
    }

    async fn atomic_purchase(
        &self,
        sale_id: i64,
        user_id: &str,
        max_items: i64,
        max_user_items: i64,
    ) -> Result<PurchaseDecision> {
        let mut conn = self.conn_manager.clone();

        let (flag, message, sold, user_count): (i64, String, i64, i64) = self
            .atomic_purchase_script
            .arg(sale_id)
            .arg(user_id)
            .arg(max_items)
            .arg(max_user_items)
            .arg(self.counter_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                SaleError::CounterStore(format!("atomic purchase script failed: {e}"))
            })?;

        let outcome = if flag == 1 {
            PurchaseOutcome::Success
        } else if message == "sold_out" {
            PurchaseOutcome::SoldOut
        } else {
            PurchaseOutcome::UserLimit
        };

        tracing::debug!(
            sale_id = sale_id,
            user_id = %user_id,
            outcome = %message,
            sold = sold,
            user_count = user_count,
            "Atomic purchase decision"
        );

        Ok(PurchaseDecision {
            outcome,
            sold,
            user_count,
        })
    }

    async fn compensate_purchase(&self, sale_id: i64, user_id: &str) -> Result<(i64, i64)> {
        let mut conn = self.conn_manager.clone();

        let (sold, user_count): (i64, i64) = self
            .compensate_script
            .arg(sale_id)
            .arg(user_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                SaleError::CounterStore(format!("compensation script failed: {e}"))
            })?;

        Ok((sold, user_count))
    }

    async fn get_sold(&self, sale_id: i64) -> Result<i64> {
        self.get_counter(&Self::sold_key(sale_id)).await
    }

    async fn get_user_count(&self, user_id: &str, sale_id: i64) -> Result<i64> {
        self.get_counter(&Self::user_count_key(user_id, sale_id))
            .await
    }

    async fn get_cached_sale(&self, sale_id: i64) -> Result<Option<CachedSale>> {
        let mut conn = self.conn_manager.clone();
        let key = Self::sale_cache_key(sale_id);

        let (id, available, sold, active): (
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = redis::cmd("HMGET")
            .arg(&key)
            .arg(&["id", "available", "sold", "active"])
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                SaleError::CounterStore(format!("failed to get cached sale: {e}"))
            })?;

        let (Some(id), Some(available), Some(sold)) = (id, available, sold) else {
            return Ok(None);
        };

        let parse = |field: &str, raw: String| {
            raw.parse::<i64>().map_err(|e| {
                SaleError::CounterStore(format!("invalid {field} in cached sale: {e}"))
            })
        };

        Ok(Some(CachedSale {
            id: parse("id", id)?,
            available: parse("available", available)?,
            sold: parse("sold", sold)?,
            active: active.as_deref() == Some("true"),
        }))
    }

    async fn active_sale_id(&self) -> Result<Option<i64>> {
        let mut conn = self.conn_manager.clone();

        let value: Option<String> = conn.get("active_sale_id").await.map_err(|e| {
            SaleError::CounterStore(format!("failed to get active sale id: {e}"))
        })?;

        match value {
            None => Ok(None),
            Some(raw) => {
                let sale_id: i64 = raw.parse().map_err(|e| {
                    SaleError::CounterStore(format!("invalid active sale id: {e}"))
                })?;
                Ok((sale_id > 0).then_some(sale_id))
            }
        }
    }

    async fn set_active_sale_id(&self, sale_id: Option<i64>) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let value = sale_id.unwrap_or(0);

        #[allow(clippy::cast_sign_loss)] // TTL is a positive configuration value
        let ttl = self.counter_ttl_secs.max(0) as u64;

        let _: () = conn
            .set_ex("active_sale_id", value, ttl)
            .await
            .map_err(|e| {
                SaleError::CounterStore(format!("failed to set active sale id: {e}"))
            })?;

        Ok(())
    }

    async fn cache_code(
        &self,
        code: &str,
        sale_id: i64,
        user_id: &str,
        item_id: &str,
    ) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let key = Self::code_key(code);

        let fields = [
            ("sale_id", sale_id.to_string()),
            ("user_id", user_id.to_string()),
            ("item_id", item_id.to_string()),
            ("used", "false".to_string()),
            ("created", Utc::now().timestamp().to_string()),
        ];

        let _: () = conn.hset_multiple(&key, &fields).await.map_err(|e| {
            SaleError::CounterStore(format!("failed to cache checkout code: {e}"))
        })?;

        let _: () = conn.expire(&key, self.code_ttl_secs).await.map_err(|e| {
            SaleError::CounterStore(format!(
                "failed to set checkout code expiration: {e}"
            ))
        })?;

        Ok(())
    }

    async fn get_cached_code(&self, code: &str) -> Result<Option<CachedCode>> {
        let mut conn = self.conn_manager.clone();
        let key = Self::code_key(code);

        let (sale_id, user_id, item_id, used): (
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = redis::cmd("HMGET")
            .arg(&key)
            .arg(&["sale_id", "user_id", "item_id", "used"])
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                SaleError::CounterStore(format!("failed to get cached code: {e}"))
            })?;

        let (Some(sale_id), Some(user_id), Some(item_id)) = (sale_id, user_id, item_id)
        else {
            return Ok(None);
        };

        let sale_id: i64 = sale_id.parse().map_err(|e| {
            SaleError::CounterStore(format!("invalid sale id in cached code: {e}"))
        })?;

        Ok(Some(CachedCode {
            sale_id,
            user_id,
            item_id,
            used: used.as_deref() == Some("true"),
        }))
    }

    async fn invalidate_code(&self, code: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let key = Self::code_key(code);

        // HSET in place; deleting would make the terminal state unobservable.
        let _: () = conn.hset(&key, "used", "true").await.map_err(|e| {
            SaleError::CounterStore(format!("failed to invalidate checkout code: {e}"))
        })?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SaleError::CounterStore(format!("ping failed: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    async fn test_store() -> RedisCounterStore {
        let config = RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout: 5,
            response_timeout: 2,
        };
        RedisCounterStore::connect(&config, 60, 60)
            .await
            .expect("Redis must be running for ignored tests")
    }

    fn test_sale_id() -> i64 {
        // Large offset keeps ignored-test keys away from any real data.
        i64::from(uuid::Uuid::new_v4().as_fields().0) + 1_000_000
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn setup_resets_counters() {
        let store = test_store().await;
        let sale_id = test_sale_id();

        store.setup_sale(sale_id, 100).await.unwrap();
        assert_eq!(store.get_sold(sale_id).await.unwrap(), 0);
        assert_eq!(store.active_sale_id().await.unwrap(), Some(sale_id));

        // A purchase then a re-setup brings the counter back to zero.
        store
            .atomic_purchase(sale_id, "u1", 100, 10)
            .await
            .unwrap();
        store.setup_sale(sale_id, 100).await.unwrap();
        assert_eq!(store.get_sold(sale_id).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn setup_refreshes_the_sale_cache() {
        let store = test_store().await;
        let sale_id = test_sale_id();

        assert_eq!(store.get_cached_sale(sale_id).await.unwrap(), None);

        store.setup_sale(sale_id, 100).await.unwrap();

        let cached = store.get_cached_sale(sale_id).await.unwrap().unwrap();
        assert_eq!(
            cached,
            CachedSale {
                id: sale_id,
                available: 100,
                sold: 0,
                active: true,
            }
        );
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn atomic_purchase_enforces_caps() {
        let store = test_store().await;
        let sale_id = test_sale_id();
        store.setup_sale(sale_id, 2).await.unwrap();

        let first = store.atomic_purchase(sale_id, "u1", 2, 1).await.unwrap();
        assert_eq!(first.outcome, PurchaseOutcome::Success);
        assert_eq!(first.sold, 1);
        assert_eq!(first.user_count, 1);

        let user_capped = store.atomic_purchase(sale_id, "u1", 2, 1).await.unwrap();
        assert_eq!(user_capped.outcome, PurchaseOutcome::UserLimit);
        assert_eq!(user_capped.sold, 1);

        let second = store.atomic_purchase(sale_id, "u2", 2, 1).await.unwrap();
        assert_eq!(second.outcome, PurchaseOutcome::Success);

        let sold_out = store.atomic_purchase(sale_id, "u3", 2, 1).await.unwrap();
        assert_eq!(sold_out.outcome, PurchaseOutcome::SoldOut);
        assert_eq!(sold_out.sold, 2);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn compensation_decrements_but_never_goes_negative() {
        let store = test_store().await;
        let sale_id = test_sale_id();
        store.setup_sale(sale_id, 10).await.unwrap();

        store
            .atomic_purchase(sale_id, "u1", 10, 10)
            .await
            .unwrap();
        let (sold, user_count) = store.compensate_purchase(sale_id, "u1").await.unwrap();
        assert_eq!(sold, 0);
        assert_eq!(user_count, 0);

        // Compensating again is a no-op at the floor.
        let (sold, user_count) = store.compensate_purchase(sale_id, "u1").await.unwrap();
        assert_eq!(sold, 0);
        assert_eq!(user_count, 0);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn code_cache_lifecycle() {
        let store = test_store().await;
        let sale_id = test_sale_id();
        let code = format!("CHK_{}_0001", uuid::Uuid::new_v4().simple());

        assert_eq!(store.get_cached_code(&code).await.unwrap(), None);

        store
            .cache_code(&code, sale_id, "u1", "item_a")
            .await
            .unwrap();

        let cached = store.get_cached_code(&code).await.unwrap().unwrap();
        assert_eq!(cached.sale_id, sale_id);
        assert_eq!(cached.user_id, "u1");
        assert!(!cached.used);

        // Invalidation flips the flag but keeps the entry observable.
        store.invalidate_code(&code).await.unwrap();
        let cached = store.get_cached_code(&code).await.unwrap().unwrap();
        assert!(cached.used);
    }
}
