//! Postgres-backed [`RecordStore`].
//!
//! Rows travel as JSON: reads go through `to_jsonb(t)`, writes through
//! `jsonb_populate_recordset`, so one implementation serves any table whose
//! columns match the row keys. Identifiers are validated and quoted; values
//! are always bound.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::store::{OrderBy, QueryFilter, RecordStore};
use crate::StorageError;

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A `WHERE` clause plus the text value bound to its single placeholder, if any.
#[derive(Debug, PartialEq)]
struct WhereClause {
    sql: String,
    bind: Option<String>,
}

impl WhereClause {
    fn next_placeholder(&self) -> usize {
        if self.bind.is_some() {
            2
        } else {
            1
        }
    }
}

/// Validate and double-quote a (optionally schema-qualified) identifier.
fn quote_ident(name: &str) -> Result<String, StorageError> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || parts.iter().any(|p| !is_plain_ident(p)) {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(parts
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join("."))
}

fn is_plain_ident(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Text form used when comparing a JSON value against `column::text`.
fn bind_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_where(filter: &QueryFilter) -> Result<WhereClause, StorageError> {
    match filter {
        QueryFilter::All => Ok(WhereClause {
            sql: String::new(),
            bind: None,
        }),
        QueryFilter::Eq { column, value } => Ok(WhereClause {
            sql: format!(" WHERE t.{}::text = $1", quote_ident(column)?),
            bind: Some(bind_text(value)),
        }),
        QueryFilter::NotIn {
            column,
            table,
            other_column,
        } => Ok(WhereClause {
            sql: format!(
                " WHERE NOT EXISTS (SELECT 1 FROM {} o WHERE o.{} = t.{})",
                quote_ident(table)?,
                quote_ident(other_column)?,
                quote_ident(column)?
            ),
            bind: None,
        }),
    }
}

fn order_sql(order: Option<&OrderBy>) -> Result<String, StorageError> {
    let Some(order) = order else {
        return Ok(String::new());
    };
    Ok(format!(
        " ORDER BY t.{} {} NULLS LAST",
        quote_ident(&order.column)?,
        if order.descending { "DESC" } else { "ASC" }
    ))
}

fn select_sql(
    table: &str,
    clause: &WhereClause,
    order: Option<&OrderBy>,
) -> Result<String, StorageError> {
    let limit = clause.next_placeholder();
    Ok(format!(
        "SELECT to_jsonb(t) FROM {} t{}{} LIMIT ${} OFFSET ${}",
        quote_ident(table)?,
        clause.sql,
        order_sql(order)?,
        limit,
        limit + 1
    ))
}

fn count_sql(table: &str, clause: &WhereClause) -> Result<String, StorageError> {
    Ok(format!(
        "SELECT COUNT(*) FROM {} t{}",
        quote_ident(table)?,
        clause.sql
    ))
}

fn delete_sql(table: &str, clause: &WhereClause) -> Result<String, StorageError> {
    Ok(format!("DELETE FROM {} t{}", quote_ident(table)?, clause.sql))
}

/// Build the bulk insert for `rows`. The column list is the sorted union of
/// row keys so absent keys fall back to column defaults only when no row
/// sets them.
fn insert_sql(table: &str, rows: &[Value]) -> Result<String, StorageError> {
    let mut columns = BTreeSet::new();
    for row in rows {
        let Value::Object(map) = row else {
            return Err(StorageError::Backend(format!(
                "insert into {table}: row is not a JSON object"
            )));
        };
        columns.extend(map.keys().cloned());
    }
    if columns.is_empty() {
        return Err(StorageError::Backend(format!(
            "insert into {table}: rows have no columns"
        )));
    }

    let quoted = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    let table = quote_ident(table)?;
    Ok(format!(
        "INSERT INTO {table} ({quoted}) SELECT {quoted} FROM jsonb_populate_recordset(NULL::{table}, $1)"
    ))
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn query(
        &self,
        table: &str,
        filter: &QueryFilter,
        order: Option<&OrderBy>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let clause = build_where(filter)?;
        let sql = select_sql(table, &clause, order)?;

        let mut query = sqlx::query_scalar::<_, Value>(&sql);
        if let Some(bind) = clause.bind {
            query = query.bind(bind);
        }
        let rows = query
            .bind(to_i64(limit))
            .bind(to_i64(offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError> {
        let clause = build_where(filter)?;
        let sql = count_sql(table, &clause)?;

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(bind) = clause.bind {
            query = query.bind(bind);
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert_many(&self, table: &str, rows: &[Value]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = insert_sql(table, rows)?;
        let result = sqlx::query(&sql)
            .bind(Value::Array(rows.to_vec()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_many(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError> {
        let clause = build_where(filter)?;
        let sql = delete_sql(table, &clause)?;

        let mut query = sqlx::query(&sql);
        if let Some(bind) = clause.bind {
            query = query.bind(bind);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
