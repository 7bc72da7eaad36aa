//! PostgREST-style HTTP backend
//!
//! Talks to the hosted backend's REST endpoint (`{base}/rest/v1/{table}`)
//! with the project API key. Row-level security is enforced server-side.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use super::{Filter, Persistence, PersistenceError};

/// HTTP client for the hosted backend's REST API
#[derive(Clone)]
pub struct RestPersistence {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestPersistence {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, PersistenceError> {
        let response = builder.send().await.map_err(|e| map_transport(e, what))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, &body, what))
    }
}

/// Render filter conditions as PostgREST query parameters
fn query_params(filter: &Filter) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = filter
        .eq
        .iter()
        .map(|(column, value)| {
            let op = match value {
                Value::Null => "is.null".to_string(),
                Value::String(s) => format!("eq.{}", s),
                other => format!("eq.{}", other),
            };
            (column.clone(), op)
        })
        .collect();

    if let Some(order) = &filter.order_by {
        let dir = if order.descending { "desc" } else { "asc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = filter.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn map_transport(err: reqwest::Error, what: &str) -> PersistenceError {
    if err.is_timeout() {
        PersistenceError::Timeout(format!("{}: {}", what, err))
    } else if err.is_connect() {
        PersistenceError::Connection(format!("{}: {}", what, err))
    } else if err.is_decode() {
        PersistenceError::Decode(format!("{}: {}", what, err))
    } else {
        PersistenceError::Query(format!("{}: {}", what, err))
    }
}

fn map_status(status: StatusCode, body: &str, what: &str) -> PersistenceError {
    let detail = format!("{} returned {}: {}", what, status, body);
    // 23xxx is the Postgres integrity-constraint class
    if status == StatusCode::CONFLICT || body.contains("\"23") {
        PersistenceError::Constraint(detail)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        PersistenceError::RateLimited(detail)
    } else if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
        PersistenceError::Timeout(detail)
    } else if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::BAD_GATEWAY {
        PersistenceError::Connection(detail)
    } else {
        PersistenceError::Query(detail)
    }
}

#[async_trait]
impl Persistence for RestPersistence {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, PersistenceError> {
        let what = format!("select {}", table);
        debug!(table, conditions = filter.eq.len(), "REST select");
        let builder = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", "*")])
            .query(&query_params(filter));
        let response = self.send(builder, &what).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| PersistenceError::Decode(format!("{}: {}", what, e)))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, PersistenceError> {
        let what = format!("insert {}", table);
        let builder = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row);
        let response = self.send(builder, &what).await?;
        let mut rows = response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| PersistenceError::Decode(format!("{}: {}", what, e)))?;
        if rows.is_empty() {
            return Err(PersistenceError::Decode(format!(
                "{}: backend returned no row",
                what
            )));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<(), PersistenceError> {
        let what = format!("update {}", table);
        let builder = self
            .request(reqwest::Method::PATCH, table)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=minimal")
            .json(&patch);
        self.send(builder, &what).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), PersistenceError> {
        let what = format!("delete {}", table);
        let builder = self
            .request(reqwest::Method::DELETE, table)
            .query(&[("id", format!("eq.{}", id))]);
        self.send(builder, &what).await?;
        Ok(())
    }
}
