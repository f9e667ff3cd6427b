//! Redis-backed `Persistence` implementation.
//!
//! Ported in behavior from `original_source/orchestrator/persistence.py`'s
//! `RedisPersistence`: the same key prefixes (`orchestrator:dag:`,
//! `orchestrator:status:`) and the same queue key (`orchestrator:tasks`),
//! reached with `LPUSH`/`BRPOP` as mandated. Connection setup retries three
//! times with the same `2 * 2^attempt` backoff (capped at 10s) as the
//! reference implementation.

use async_trait::async_trait;
use orchestrator_common::{Error, Result, StatusRecord};
use orchestrator_core::{persistence::Persistence, plan::TaskRunPayload, util::retry_backoff};
use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const QUEUE_KEY: &str = "orchestrator:tasks";
const DAG_PREFIX: &str = "orchestrator:dag:";
const STATUS_PREFIX: &str = "orchestrator:status:";
const DAG_INDEX_KEY: &str = "orchestrator:dag-index";
const RUN_INDEX_KEY: &str = "orchestrator:run-index";
const CONNECT_ATTEMPTS: u32 = 3;

pub struct RedisBackend {
    client: redis::Client,
}

impl RedisBackend {
    /// Connect to `redis_url`, retrying with exponential backoff (capped at
    /// 10s) the way the reference implementation's `_connect` does.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;

        let mut last_err = None;
        for attempt in 0..CONNECT_ATTEMPTS {
            match client.get_multiplexed_async_connection().await {
                Ok(_) => return Ok(Self { client }),
                Err(err) => {
                    last_err = Some(err.to_string());
                    let delay = retry_backoff(attempt).min(Duration::from_secs(10));
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(Error::BackendUnavailable(last_err.unwrap_or_else(|| {
            "unable to connect to Redis".to_string()
        })))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))
    }
}

#[async_trait]
impl Persistence for RedisBackend {
    async fn save_dag(&self, dag_id: &str, blob: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .set(format!("{DAG_PREFIX}{dag_id}"), blob)
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        let _: () = conn
            .sadd(DAG_INDEX_KEY, dag_id)
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        Ok(())
    }

    async fn load_dag(&self, dag_id: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(format!("{DAG_PREFIX}{dag_id}"))
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        Ok(value)
    }

    async fn list_dags(&self) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .smembers(DAG_INDEX_KEY)
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        Ok(ids)
    }

    async fn push_task(&self, payload: &TaskRunPayload) -> Result<()> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(payload)?;
        let _: i64 = conn
            .lpush(QUEUE_KEY, json)
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        Ok(())
    }

    async fn pop_task(&self, timeout_seconds: u64) -> Result<Option<TaskRunPayload>> {
        let mut conn = self.connection().await?;
        let result: Option<(String, String)> = conn
            .brpop(QUEUE_KEY, timeout_seconds as f64)
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        match result {
            Some((_key, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn save_status(&self, key: &str, status: &str, meta: Value) -> Result<()> {
        let mut conn = self.connection().await?;
        let mut record = HashMap::new();
        if let Value::Object(map) = meta {
            record.extend(map);
        }
        record.insert("status".to_string(), Value::String(status.to_string()));
        let json = serde_json::to_string(&record)?;
        let _: () = conn
            .set(format!("{STATUS_PREFIX}{key}"), json)
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        if let Some(run_id) = key.strip_prefix("run:") {
            let _: () = conn
                .sadd(RUN_INDEX_KEY, run_id)
                .await
                .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        }
        Ok(())
    }

    async fn get_status(&self, key: &str) -> Result<StatusRecord> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(format!("{STATUS_PREFIX}{key}"))
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        match value {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(StatusRecord::default()),
        }
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .smembers(RUN_INDEX_KEY)
            .await
            .map_err(|err| Error::BackendUnavailable(err.to_string()))?;
        Ok(ids)
    }
}
