//! In-memory persistence backend

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{Filter, Persistence, PersistenceError};

/// In-process tables keyed by name
///
/// Inserted rows get an `id` (UUID) and a `created_at` (RFC 3339) column when
/// the caller did not provide one, mirroring the hosted backend's defaults.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    injected_failure: Arc<Mutex<Option<PersistenceError>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with rows as-is
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Snapshot of every row in `table`
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.read().await;
        tables.get(table).cloned().unwrap_or_default()
    }

    /// Make every following call fail with `error` until [`Self::heal`]
    pub async fn fail_with(&self, error: PersistenceError) {
        *self.injected_failure.lock().await = Some(error);
    }

    pub async fn heal(&self) {
        *self.injected_failure.lock().await = None;
    }

    async fn check_failure(&self) -> Result<(), PersistenceError> {
        match self.injected_failure.lock().await.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, PersistenceError> {
        self.check_failure().await?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &filter.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, PersistenceError> {
        self.check_failure().await?;
        let Value::Object(mut fields) = row else {
            return Err(PersistenceError::Decode(format!(
                "insert into {} expects a JSON object",
                table
            )));
        };
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
        let row = Value::Object(fields);

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(id) = row_id(&row) {
            if rows.iter().any(|r| row_id(r) == Some(id)) {
                return Err(PersistenceError::Constraint(format!(
                    "duplicate key id={} in {}",
                    id, table
                )));
            }
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<(), PersistenceError> {
        self.check_failure().await?;
        let Value::Object(patch) = patch else {
            return Err(PersistenceError::Decode(format!(
                "update of {} expects a JSON object",
                table
            )));
        };

        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| row_id(r) == Some(id)))
            .ok_or_else(|| PersistenceError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        if let Value::Object(fields) = row {
            for (key, value) in patch {
                fields.insert(key, value);
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), PersistenceError> {
        self.check_failure().await?;
        let mut tables = self.tables.write().await;
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|r| row_id(r) != Some(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_id_and_created_at() {
        let store = MemoryPersistence::new();
        let row = store
            .insert("email_logs", json!({"destinatario": "a@b.com"}))
            .await
            .unwrap();

        assert!(row.get("id").and_then(Value::as_str).is_some());
        assert!(row.get("created_at").is_some());
        assert_eq!(store.rows("email_logs").await.len(), 1);
    }

    #[tokio::test]
    async fn test_select_orders_and_limits() {
        let store = MemoryPersistence::new();
        store
            .seed(
                "t",
                vec![
                    json!({"id": "1", "n": 1, "k": "x"}),
                    json!({"id": "2", "n": 3, "k": "x"}),
                    json!({"id": "3", "n": 2, "k": "y"}),
                ],
            )
            .await;

        let rows = store
            .select("t", &Filter::new().eq("k", "x").order_desc("n").limit(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "2");
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let store = MemoryPersistence::new();
        let err = store.update("t", "nope", json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_injected_failure_until_healed() {
        let store = MemoryPersistence::new();
        store
            .fail_with(PersistenceError::Timeout("slow".into()))
            .await;
        assert!(store.select("t", &Filter::new()).await.is_err());

        store.heal().await;
        assert!(store.select("t", &Filter::new()).await.unwrap().is_empty());
    }
}
