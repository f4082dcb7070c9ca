//! The generic storage seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::StorageError;

/// Row selection for [`RecordStore`] operations.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// Every row.
    All,
    /// Rows whose `column` equals `value`.
    Eq { column: String, value: Value },
    /// Rows whose `column` value does not appear in `table.other_column`.
    NotIn {
        column: String,
        table: String,
        other_column: String,
    },
}

impl QueryFilter {
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        QueryFilter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn not_in(
        column: impl Into<String>,
        table: impl Into<String>,
        other_column: impl Into<String>,
    ) -> Self {
        QueryFilter::NotIn {
            column: column.into(),
            table: table.into(),
            other_column: other_column.into(),
        }
    }
}

/// Sort applied before `limit` and `offset`. Nulls sort last either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Table-oriented storage over JSON rows.
///
/// Table names are opaque strings from configuration; implementations neither
/// define schema nor migrate it. `insert_many` is all-or-nothing for a
/// single call. Without an [`OrderBy`], `query` returns rows in no
/// particular order, so paging needs one.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query(
        &self,
        table: &str,
        filter: &QueryFilter,
        order: Option<&OrderBy>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>, StorageError>;

    async fn count(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError>;

    async fn insert_many(&self, table: &str, rows: &[Value]) -> Result<u64, StorageError>;

    async fn delete_many(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn query(
        &self,
        table: &str,
        filter: &QueryFilter,
        order: Option<&OrderBy>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>, StorageError> {
        (**self).query(table, filter, order, limit, offset).await
    }

    async fn count(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError> {
        (**self).count(table, filter).await
    }

    async fn insert_many(&self, table: &str, rows: &[Value]) -> Result<u64, StorageError> {
        (**self).insert_many(table, rows).await
    }

    async fn delete_many(&self, table: &str, filter: &QueryFilter) -> Result<u64, StorageError> {
        (**self).delete_many(table, filter).await
    }
}
