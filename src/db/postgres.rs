//! PostgreSQL client implementation over raw sqlx connections.
//!
//! Deliberately unpooled: sqlx's own pool is bypassed so that the crate's
//! pool controls the full connection lifecycle, including transaction
//! boundaries and close timing.

use crate::config::{DbConfig, SslMode};
use crate::db::client::{ConnectionFactory, RawConnection};
use crate::db::types::{QueryOutput, QueryParam};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode, PgTypeInfo, PgValueRef,
};
use sqlx::query::Query;
use sqlx::{Column as _, Connection, Decode, Postgres, Row as _, Type, TypeInfo};
use std::sync::Arc;
use tracing::debug;

/// Opens raw PostgreSQL connections described by a [`DbConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnectionFactory;

fn pg_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Connection = PgClientConnection;

    async fn connect(&self, config: &DbConfig) -> DbResult<Self::Connection> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.dbname)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(pg_ssl_mode(config.sslmode));
        debug!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            "opening postgres connection"
        );
        let conn = PgConnection::connect_with(&options).await?;
        Ok(PgClientConnection { conn })
    }
}

/// One live server session.
#[derive(Debug)]
pub struct PgClientConnection {
    conn: PgConnection,
}

impl PgClientConnection {
    async fn simple(&mut self, sql: &str) -> DbResult<()> {
        sqlx::query(sql).execute(&mut self.conn).await?;
        Ok(())
    }
}

#[async_trait]
impl RawConnection for PgClientConnection {
    async fn ping(&mut self) -> DbResult<()> {
        self.conn.ping().await.map_err(DbError::from)
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.simple("BEGIN").await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.simple("COMMIT").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.simple("ROLLBACK").await
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let query = bind_all(sqlx::query(sql), params);
        let result = query.execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryOutput> {
        let query = bind_all(sqlx::query(sql), params);
        let rows = query.fetch_all(&mut self.conn).await?;
        Ok(rows_to_output(&rows))
    }

    async fn close(self) -> DbResult<()> {
        self.conn.close().await.map_err(DbError::from)
    }
}

/// Bind a parameter list in order (positional `$1..$n` placeholders).
fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

fn rows_to_output(rows: &[PgRow]) -> QueryOutput {
    // An empty result set carries no row to read column metadata from.
    let columns: Arc<[String]> = match rows.first() {
        Some(row) => row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .into(),
        None => Vec::<String>::new().into(),
    };
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| decode_column(row, idx)).collect())
        .collect();
    QueryOutput { columns, rows }
}

/// Logical category for server column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Json,
    Binary,
    Unknown,
}

/// Classify a server type name into a logical category.
fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Check numeric first, it overlaps with the float keywords.
    if lower.contains("numeric") || lower.contains("decimal") {
        return TypeCategory::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower == "real" || lower.contains("double") {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower == "bytea" {
        return TypeCategory::Binary;
    }
    // Text-ish fallback for everything else (varchar, text, date, uuid, ...).
    TypeCategory::Unknown
}

fn decode_column(row: &PgRow, idx: usize) -> JsonValue {
    let type_name = row.column(idx).type_info().name().to_string();
    match categorize_type(&type_name) {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Binary => decode_binary(row, idx),
        TypeCategory::Unknown => decode_text(row, idx),
    }
}

fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!("failed to decode NUMERIC: {:?}", e);
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Null;
    }
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    JsonValue::Null
}

fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<JsonValue>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

fn decode_binary(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(STANDARD.encode(v)))
        .unwrap_or(JsonValue::Null)
}

fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return JsonValue::String(v);
    }
    JsonValue::Null
}

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
struct RawDecimal(String);

impl Type<Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("FLOAT8"), TypeCategory::Float);
        assert_eq!(categorize_type("REAL"), TypeCategory::Float);
        assert_eq!(categorize_type("BOOL"), TypeCategory::Boolean);
        assert_eq!(categorize_type("JSONB"), TypeCategory::Json);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("TEXT"), TypeCategory::Unknown);
        assert_eq!(categorize_type("UUID"), TypeCategory::Unknown);
    }

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(pg_ssl_mode(SslMode::Require), PgSslMode::Require));
        assert!(matches!(pg_ssl_mode(SslMode::Disable), PgSslMode::Disable));
        assert!(matches!(
            pg_ssl_mode(SslMode::VerifyFull),
            PgSslMode::VerifyFull
        ));
    }
}
