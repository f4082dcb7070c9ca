//! In-process [`RecordStore`] for tests and local runs without Postgres.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::store::{OrderBy, QueryFilter, RecordStore};
use crate::StorageError;

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    reject_inserts: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `table` with `rows`, replacing anything already there.
    pub async fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.lock().await.insert(table.to_string(), rows);
    }

    /// When set, every `insert_many` fails and writes nothing.
    pub fn set_reject_inserts(&self, reject: bool) {
        self.reject_inserts.store(reject, Ordering::Relaxed);
    }

    /// Snapshot of every row currently in `table`.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

/// Textual form matching Postgres `::text` casts closely enough for filters.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers compare numerically and strings lexically (RFC 3339 timestamps
/// included); missing and null values sort last.
fn compare_column(a: &Value, b: &Value, order: &OrderBy) -> CmpOrdering {
    let a = a.get(&order.column).filter(|v| !v.is_null());
    let b = b.get(&order.column).filter(|v| !v.is_null());
    let ordering = match (a, b) {
        (None, None) => return CmpOrdering::Equal,
        (None, Some(_)) => return CmpOrdering::Greater,
        (Some(_), None) => return CmpOrdering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(CmpOrdering::Equal),
        },
        (Some(x), Some(y)) => as_text(x).cmp(&as_text(y)),
    };
    if order.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn matches(
    row: &Value,
    filter: &QueryFilter,
    tables: &HashMap<String, Vec<Value>>,
) -> bool {
    match filter {
        QueryFilter::All => true,
        QueryFilter::Eq { column, value } => row
            .get(column)
            .is_some_and(|v| v == value || (!v.is_null() && as_text(v) == as_text(value))),
        QueryFilter::NotIn {
            column,
            table,
            other_column,
        } => {
            let Some(v) = row.get(column).filter(|v| !v.is_null()) else {
                return true;
            };
            !tables.get(table).is_some_and(|others| {
                others
                    .iter()
                    .filter_map(|o| o.get(other_column))
                    .any(|o| o == v)
            })
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(
        &self,
        table: &str,
        filter: &QueryFilter,
        order: Option<&OrderBy>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let tables = self.tables.lock().await;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let mut selected: Vec<&Value> = rows
            .iter()
            .filter(|row| matches(row, filter, &tables))
            .collect();
        if let Some(order) = order {
            selected.sort_by(|a, b| compare_column(a, b, order));
        }
        Ok(selected
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError> {
        let tables = self.tables.lock().await;
        let count = tables.get(table).map_or(0, |rows| {
            rows.iter()
                .filter(|row| matches(row, filter, &tables))
                .count()
        });
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn insert_many(&self, table: &str, rows: &[Value]) -> Result<u64, StorageError> {
        if self.reject_inserts.load(Ordering::Relaxed) {
            return Err(StorageError::Backend(format!(
                "insert into {table} rejected"
            )));
        }
        if rows.iter().any(|row| !row.is_object()) {
            return Err(StorageError::Backend(format!(
                "insert into {table}: row is not a JSON object"
            )));
        }

        let mut tables = self.tables.lock().await;
        tables
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
    }

    async fn delete_many(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError> {
        let mut tables = self.tables.lock().await;
        let Some(mut rows) = tables.remove(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matches(row, filter, &tables));
        let removed = before - rows.len();
        tables.insert(table.to_string(), rows);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .seed(
                "raw",
                vec![
                    json!({"id": 1, "text": "a"}),
                    json!({"id": 2, "text": "b"}),
                    json!({"id": 3, "text": "c"}),
                ],
            )
            .await;
        store.seed("done", vec![json!({"tweet_id": 2})]).await;
        store
    }

    #[tokio::test]
    async fn not_in_excludes_rows_present_in_other_table() {
        let store = seeded().await;
        let rows = store
            .query(
                "raw",
                &QueryFilter::not_in("id", "done", "tweet_id"),
                None,
                10,
                0,
            )
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().filter_map(|r| r["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn query_applies_offset_and_limit() {
        let store = seeded().await;
        let rows = store
            .query("raw", &QueryFilter::All, None, 1, 1)
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({"id": 2, "text": "b"})]);
    }

    #[tokio::test]
    async fn order_by_sorts_before_paging_with_nulls_last() {
        let store = MemoryStore::new();
        store
            .seed(
                "t",
                vec![
                    json!({"id": 10, "at": "2024-03-01T00:00:00Z"}),
                    json!({"id": 2, "at": null}),
                    json!({"id": 7, "at": "2024-05-01T00:00:00Z"}),
                ],
            )
            .await;

        let ids = |rows: Vec<Value>| -> Vec<i64> {
            rows.iter().filter_map(|r| r["id"].as_i64()).collect()
        };
        let asc = store
            .query("t", &QueryFilter::All, Some(&OrderBy::asc("id")), 2, 1)
            .await
            .unwrap();
        assert_eq!(ids(asc), vec![7, 10]);

        let newest = store
            .query("t", &QueryFilter::All, Some(&OrderBy::desc("at")), 10, 0)
            .await
            .unwrap();
        assert_eq!(ids(newest), vec![7, 10, 2]);
    }

    #[tokio::test]
    async fn eq_matches_textually_like_postgres() {
        let store = seeded().await;
        let count = store
            .count("raw", &QueryFilter::eq("id", "3"))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn missing_table_reads_as_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.count("nope", &QueryFilter::All).await.unwrap(), 0);
        assert!(store
            .query("nope", &QueryFilter::All, None, 10, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rejected_insert_writes_nothing() {
        let store = seeded().await;
        store.set_reject_inserts(true);
        let result = store.insert_many("done", &[json!({"tweet_id": 1})]).await;
        assert!(matches!(result, Err(StorageError::Backend(_))));
        assert_eq!(store.rows("done").await.len(), 1);
    }

    #[tokio::test]
    async fn insert_rejects_non_object_rows_atomically() {
        let store = MemoryStore::new();
        let result = store
            .insert_many("t", &[json!({"a": 1}), json!("not a row")])
            .await;
        assert!(result.is_err());
        assert!(store.rows("t").await.is_empty());
    }

    #[tokio::test]
    async fn delete_many_removes_matching_rows() {
        let store = seeded().await;
        let removed = store
            .delete_many("raw", &QueryFilter::eq("text", "a"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.rows("raw").await.len(), 2);
    }
}
