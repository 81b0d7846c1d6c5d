//! `CoordinationStore` backed by a real Redis deployment, grounded on the
//! `redis` crate's `ConnectionManager` (auto-reconnecting, cloneable) and the
//! original pipeline's use of `REDIS_URL` / list and stream primitives.

use async_trait::async_trait;
use pipeline_core::errors::CoordinationError;
use pipeline_core::traits::{CoordinationStore, StreamEntry};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

pub struct RedisCoordinationStore {
    conn: ConnectionManager,
}

impl RedisCoordinationStore {
    pub async fn connect(redis_url: &str) -> Result<Self, CoordinationError> {
        let client = redis::Client::open(redis_url).map_err(|e| CoordinationError::ConnectionFailed(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CoordinationError::ConnectionFailed(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn encode(value: &serde_json::Value) -> String {
    value.to_string()
}

fn decode(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn list_push(&self, key: &str, value: serde_json::Value) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, encode(&value)).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn list_pop(&self, key: &str, timeout: Duration) -> Result<Option<serde_json::Value>, CoordinationError> {
        let mut conn = self.conn.clone();
        let secs = timeout.as_secs_f64().max(0.001);
        let result: Option<(String, String)> =
            conn.blpop(key, secs).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        Ok(result.map(|(_, payload)| decode(payload)))
    }

    async fn hash_set(&self, key: &str, field: &str, value: serde_json::Value) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, encode(&value)).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<serde_json::Value>, CoordinationError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(key, field).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        Ok(raw.map(decode))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, serde_json::Value)>, CoordinationError> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, String)> = conn.hgetall(key).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        Ok(raw.into_iter().map(|(field, value)| (field, decode(value))).collect())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn stream_append(&self, key: &str, payload: serde_json::Value) -> Result<String, CoordinationError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(key, "*", &[("payload", encode(&payload))])
            .await
            .map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        Ok(id)
    }

    async fn stream_read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        max: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, CoordinationError> {
        let mut conn = self.conn.clone();
        // Consumer groups are created lazily; `MKSTREAM` tolerates a stream
        // that doesn't exist yet and `BUSYGROUP` (already exists) is ignored.
        let _: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(key)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        let opts = redis::streams::StreamReadOptions::default()
            .group(group, consumer)
            .count(max)
            .block(block.as_millis() as usize);
        let reply: redis::streams::StreamReadReply = conn
            .xread_options(&[key], &[">"], &opts)
            .await
            .map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;

        let mut entries = Vec::new();
        for stream_key in reply.keys {
            for id in stream_key.ids {
                let payload = id
                    .map
                    .get("payload")
                    .and_then(|v| redis::from_redis_value::<String>(v).ok())
                    .map(decode)
                    .unwrap_or(serde_json::Value::Null);
                entries.push(StreamEntry { id: id.id, payload });
            }
        }
        Ok(entries)
    }

    async fn stream_ack(&self, key: &str, group: &str, id: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        conn.xack::<_, _, _, ()>(key, group, &[id]).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, CoordinationError> {
        let mut conn = self.conn.clone();
        conn.incr(key, by).await.map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }
}
