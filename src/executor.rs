//! Bounded, read-only execution of validated SQL.
//!
//! Only a [`ValidatedSql`] can be executed. The SQLite executor adds a second
//! safety layer beneath the guardrail:
//!
//! - the pool is opened read-only with `PRAGMA query_only = ON`
//!   (see [`db::connect_target`](crate::db::connect_target));
//! - every statement runs inside a transaction that is always rolled back;
//! - at most `max_rows` rows are read, then the cursor is dropped;
//! - a progress handler interrupts the statement once its timeout passes.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::TargetConfig;
use crate::db;
use crate::guardrail::ValidatedSql;
use crate::models::{QueryResult, Record, Scalar};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("query timed out after {0} seconds")]
    Timeout(u64),
    #[error("{0}")]
    Database(String),
}

impl From<sqlx::Error> for ExecutionError {
    fn from(e: sqlx::Error) -> Self {
        ExecutionError::Database(e.to_string())
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &ValidatedSql) -> Result<QueryResult, ExecutionError>;
}

pub struct SqliteExecutor {
    pool: SqlitePool,
    max_rows: usize,
    timeout: Duration,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool, max_rows: usize, timeout: Duration) -> Self {
        Self {
            pool,
            max_rows,
            timeout,
        }
    }

    pub async fn from_config(target: &TargetConfig) -> anyhow::Result<Self> {
        let pool = db::connect_target(target).await?;
        Ok(Self::new(
            pool,
            target.max_rows,
            Duration::from_secs(target.timeout_secs),
        ))
    }
}

// VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1000;

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(&self, sql: &ValidatedSql) -> Result<QueryResult, ExecutionError> {
        let mut tx = self.pool.begin().await?;

        // Dropping a future does not stop sqlite3_step on the worker thread;
        // the engine itself has to be interrupted.
        let deadline = Instant::now() + self.timeout;
        tx.lock_handle()
            .await?
            .set_progress_handler(PROGRESS_OPS, move || Instant::now() < deadline);

        let outcome = read_rows(&mut *tx, sql.as_str(), self.max_rows).await;

        match tx.lock_handle().await {
            Ok(mut handle) => handle.remove_progress_handler(),
            Err(e) => tracing::warn!(error = %e, "could not remove progress handler"),
        }
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "rollback failed");
        }

        match outcome {
            Err(ExecutionError::Database(_)) if Instant::now() >= deadline => {
                Err(ExecutionError::Timeout(self.timeout.as_secs()))
            }
            other => other,
        }
    }
}

async fn read_rows(
    conn: &mut SqliteConnection,
    sql: &str,
    max_rows: usize,
) -> Result<QueryResult, ExecutionError> {
    let mut stream = sqlx::query(sql).persistent(false).fetch(conn);
    let mut result = QueryResult::default();

    while let Some(row) = stream.try_next().await? {
        if result.rows.len() == max_rows {
            result.truncated = true;
            break;
        }
        result.rows.push(to_record(&row)?);
    }

    Ok(result)
}

fn to_record(row: &SqliteRow) -> Result<Record, ExecutionError> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        record.push(column.name(), scalar_at(row, i)?);
    }
    Ok(record)
}

// SQLite is dynamically typed; decode by the storage class of the value.
fn scalar_at(row: &SqliteRow, i: usize) -> Result<Scalar, ExecutionError> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Scalar::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Scalar::Integer(row.try_get_unchecked::<i64, _>(i)?),
        "REAL" | "NUMERIC" => Scalar::Real(row.try_get_unchecked::<f64, _>(i)?),
        "BLOB" => Scalar::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        _ => Scalar::Text(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use tempfile::TempDir;

    async fn target(tmp: &TempDir, max_rows: usize) -> SqliteExecutor {
        target_with_timeout(tmp, max_rows, 5).await
    }

    async fn target_with_timeout(tmp: &TempDir, max_rows: usize, timeout_secs: u64) -> SqliteExecutor {
        let path = tmp.path().join("target.sqlite");
        let setup = SqlitePool::connect_with(
            SqliteConnectOptions::new().filename(&path).create_if_missing(true),
        )
        .await
        .unwrap();
        sqlx::query("CREATE TABLE people (name TEXT, gender TEXT, height INTEGER, mass REAL, photo BLOB)")
            .execute(&setup)
            .await
            .unwrap();
        for (name, gender, height) in [
            ("Luke Skywalker", "male", 172),
            ("Leia Organa", "female", 150),
            ("Han Solo", "male", 180),
        ] {
            sqlx::query("INSERT INTO people (name, gender, height, mass, photo) VALUES (?, ?, ?, 77.5, NULL)")
                .bind(name)
                .bind(gender)
                .bind(height)
                .execute(&setup)
                .await
                .unwrap();
        }
        setup.close().await;

        SqliteExecutor::from_config(&TargetConfig {
            path,
            max_rows,
            timeout_secs,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_rows_keep_column_order_and_types() {
        let tmp = TempDir::new().unwrap();
        let executor = target(&tmp, 100).await;

        let result = executor
            .execute(&ValidatedSql::new(
                "SELECT name AS who, height, mass, photo FROM people WHERE gender = 'male' ORDER BY name",
            ))
            .await
            .unwrap();

        assert!(!result.truncated);
        assert_eq!(result.rows.len(), 2);
        let first = &result.rows[0];
        assert_eq!(first.columns().collect::<Vec<_>>(), vec!["who", "height", "mass", "photo"]);
        assert_eq!(first.get("who"), Some(&Scalar::Text("Han Solo".to_string())));
        assert_eq!(first.get("height"), Some(&Scalar::Integer(180)));
        assert_eq!(first.get("mass"), Some(&Scalar::Real(77.5)));
        assert_eq!(first.get("photo"), Some(&Scalar::Null));
    }

    #[tokio::test]
    async fn test_row_cap_truncates() {
        let tmp = TempDir::new().unwrap();
        let executor = target(&tmp, 2).await;
        let result = executor
            .execute(&ValidatedSql::new("SELECT name FROM people"))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_unknown_column_is_database_error() {
        let tmp = TempDir::new().unwrap();
        let executor = target(&tmp, 100).await;
        let err = executor
            .execute(&ValidatedSql::new("SELECT nope FROM people"))
            .await
            .unwrap_err();
        match err {
            ExecutionError::Database(msg) => assert!(msg.contains("nope")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_writes_refused_by_engine() {
        let tmp = TempDir::new().unwrap();
        let executor = target(&tmp, 100).await;

        // Bypasses the guardrail on purpose.
        let err = executor
            .execute(&ValidatedSql::new("DELETE FROM people"))
            .await;
        assert!(err.is_err());

        let result = executor
            .execute(&ValidatedSql::new("SELECT COUNT(*) AS n FROM people"))
            .await
            .unwrap();
        assert_eq!(result.rows[0].get("n"), Some(&Scalar::Integer(3)));
    }

    #[tokio::test]
    async fn test_runaway_query_interrupted_at_timeout() {
        let tmp = TempDir::new().unwrap();
        let executor = target_with_timeout(&tmp, 100, 1).await;

        let started = Instant::now();
        let err = executor
            .execute(&ValidatedSql::new(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 200000000) \
                 SELECT count(x) AS n FROM c",
            ))
            .await
            .unwrap_err();

        assert_eq!(err, ExecutionError::Timeout(1));
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());

        // The pooled connection no longer carries the expired deadline.
        let result = executor
            .execute(&ValidatedSql::new("SELECT COUNT(*) AS n FROM people"))
            .await
            .unwrap();
        assert_eq!(result.rows[0].get("n"), Some(&Scalar::Integer(3)));
    }
}
