use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::types::{PgInterval, PgMoney};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::model::{RawRow, Value};
use crate::sql::Statement;
use crate::store::traits::{Executor, TransactionControl, Transactional};

const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Executor for PostgresStore {
    async fn fetch_all(&self, statement: &Statement) -> EngineResult<Vec<RawRow>> {
        log::debug!("{}", statement.sql());
        let rows = build_query(statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| map_error(statement, err))?;

        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, statement: &Statement) -> EngineResult<u64> {
        log::debug!("{}", statement.sql());
        let result = build_query(statement)
            .execute(&self.pool)
            .await
            .map_err(|err| map_error(statement, err))?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl Transactional for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> EngineResult<PostgresTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| EngineError::Query(err.to_string()))?;

        Ok(PostgresTransaction {
            tx: Mutex::new(Some(tx)),
        })
    }
}

/// One open sqlx transaction, usable anywhere an [`Executor`] is expected.
///
/// Dropping it without `commit` rolls back.
pub struct PostgresTransaction {
    tx: Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

#[async_trait::async_trait]
impl Executor for PostgresTransaction {
    async fn fetch_all(&self, statement: &Statement) -> EngineResult<Vec<RawRow>> {
        log::debug!("[tx] {}", statement.sql());
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let rows = build_query(statement)
            .fetch_all(&mut **tx)
            .await
            .map_err(|err| map_error(statement, err))?;

        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, statement: &Statement) -> EngineResult<u64> {
        log::debug!("[tx] {}", statement.sql());
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let result = build_query(statement)
            .execute(&mut **tx)
            .await
            .map_err(|err| map_error(statement, err))?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl TransactionControl for PostgresTransaction {
    async fn commit(self) -> EngineResult<()> {
        let tx = self.tx.into_inner().ok_or_else(finished)?;
        tx.commit()
            .await
            .map_err(|err| EngineError::Query(err.to_string()))
    }

    async fn rollback(self) -> EngineResult<()> {
        let tx = self.tx.into_inner().ok_or_else(finished)?;
        tx.rollback()
            .await
            .map_err(|err| EngineError::Query(err.to_string()))
    }
}

fn finished() -> EngineError {
    EngineError::Query("transaction already finished".to_string())
}

fn build_query(statement: &Statement) -> Query<'_, Postgres, PgArguments> {
    statement
        .params()
        .iter()
        .fold(sqlx::query(statement.sql()), bind_value)
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Json(json) => query.bind(sqlx::types::Json(json.clone())),
        Value::Bytes(bytes) => query.bind(bytes.clone()),
        Value::Object(_) | Value::List(_) => query.bind(sqlx::types::Json(value.to_json())),
    }
}

fn map_error(statement: &Statement, err: sqlx::Error) -> EngineError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNDEFINED_TABLE) => {
                return EngineError::UnknownTable(statement.operation().table().to_string())
            }
            Some(UNDEFINED_COLUMN) => {
                return EngineError::UnknownColumn {
                    table: statement.operation().table().to_string(),
                    column: db_err.message().to_string(),
                }
            }
            _ => {}
        }
    }
    EngineError::Query(err.to_string())
}

fn decode_row(row: &PgRow) -> RawRow {
    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                decode_column(row, column.ordinal(), column.type_info().name()),
            )
        })
        .collect()
}

/// How a column is decoded, chosen from its Postgres type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Money,
    Uuid,
    Json,
    Timestamptz,
    Timestamp,
    Date,
    Time,
    Interval,
    Bytes,
    Text,
    TextArray,
    Int2Array,
    Int4Array,
    Int8Array,
    /// Enums, domains over text and anything else sent as text
    TextLike,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOL" => ColumnKind::Bool,
        "INT2" => ColumnKind::Int2,
        "INT4" => ColumnKind::Int4,
        "INT8" => ColumnKind::Int8,
        "FLOAT4" => ColumnKind::Float4,
        "FLOAT8" => ColumnKind::Float8,
        "NUMERIC" => ColumnKind::Numeric,
        "MONEY" => ColumnKind::Money,
        "UUID" => ColumnKind::Uuid,
        "JSON" | "JSONB" => ColumnKind::Json,
        "TIMESTAMPTZ" => ColumnKind::Timestamptz,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "INTERVAL" => ColumnKind::Interval,
        "BYTEA" => ColumnKind::Bytes,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnKind::Text,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => ColumnKind::TextArray,
        "INT2[]" => ColumnKind::Int2Array,
        "INT4[]" => ColumnKind::Int4Array,
        "INT8[]" => ColumnKind::Int8Array,
        _ => ColumnKind::TextLike,
    }
}

/// Integral decimals that fit become `Int`; the rest keep their exact text.
fn numeric_value(decimal: Decimal) -> Value {
    if decimal.fract().is_zero() {
        if let Some(i) = decimal.trunc().to_i64() {
            return Value::Int(i);
        }
    }
    Value::Text(decimal.to_string())
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }

    let decoded = match column_kind(type_name) {
        ColumnKind::Bool => row.try_get::<bool, _>(index).map(Value::Bool),
        ColumnKind::Int2 => row.try_get::<i16, _>(index).map(|v| Value::Int(v.into())),
        ColumnKind::Int4 => row.try_get::<i32, _>(index).map(|v| Value::Int(v.into())),
        ColumnKind::Int8 => row.try_get::<i64, _>(index).map(Value::Int),
        ColumnKind::Float4 => row.try_get::<f32, _>(index).map(|v| Value::Float(v.into())),
        ColumnKind::Float8 => row.try_get::<f64, _>(index).map(Value::Float),
        ColumnKind::Numeric => row.try_get::<Decimal, _>(index).map(numeric_value),
        ColumnKind::Money => row
            .try_get::<PgMoney, _>(index)
            .map(|v| Value::Text(v.to_decimal(2).to_string())),
        ColumnKind::Uuid => row
            .try_get::<uuid::Uuid, _>(index)
            .map(|v| Value::Text(v.to_string())),
        ColumnKind::Json => row.try_get::<serde_json::Value, _>(index).map(Value::Json),
        ColumnKind::Timestamptz => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|v| Value::Text(v.to_rfc3339())),
        ColumnKind::Timestamp => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|v| Value::Text(v.to_string())),
        ColumnKind::Date => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|v| Value::Text(v.to_string())),
        ColumnKind::Time => row
            .try_get::<chrono::NaiveTime, _>(index)
            .map(|v| Value::Text(v.to_string())),
        ColumnKind::Interval => row.try_get::<PgInterval, _>(index).map(|v| {
            Value::Json(serde_json::json!({
                "months": v.months,
                "days": v.days,
                "microseconds": v.microseconds,
            }))
        }),
        ColumnKind::Bytes => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),
        ColumnKind::Text => row.try_get::<String, _>(index).map(Value::Text),
        ColumnKind::TextArray => row
            .try_get::<Vec<String>, _>(index)
            .map(|v| Value::List(v.into_iter().map(Value::Text).collect())),
        ColumnKind::Int2Array => row
            .try_get::<Vec<i16>, _>(index)
            .map(|v| Value::List(v.into_iter().map(|i| Value::Int(i.into())).collect())),
        ColumnKind::Int4Array => row
            .try_get::<Vec<i32>, _>(index)
            .map(|v| Value::List(v.into_iter().map(|i| Value::Int(i.into())).collect())),
        ColumnKind::Int8Array => row
            .try_get::<Vec<i64>, _>(index)
            .map(|v| Value::List(v.into_iter().map(Value::Int).collect())),
        ColumnKind::TextLike => row.try_get_unchecked::<String, _>(index).map(Value::Text),
    };

    decoded.unwrap_or_else(|err| {
        log::warn!("cannot decode column {} of type {}: {}", index, type_name, err);
        Value::Null
    })
}
