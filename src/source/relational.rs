//! Transient relational connections over sqlx.
//!
//! One connection per call, built from a [`RelationalTarget`] plus
//! credentials. Rows come back as JSON records keyed by column name, with
//! values decoded by the column's declared type. A column whose type has no
//! decoder fails the whole fetch instead of coming back null.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Map, Number, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgTypeKind, Postgres};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Connection, Decode, Row, Type, TypeInfo};
use tracing::{debug, warn};

use super::{bounded, SourceError};
use crate::config::{ConnectionConfig, RelationalTarget};
use crate::sql::{Dialect, SqlDialect};

/// An open connection to a Postgres or MySQL server.
pub enum RelationalConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
}

impl RelationalConnection {
    /// Connect to the server described by `config`.
    pub async fn open(
        dialect: Dialect,
        config: &ConnectionConfig,
        budget: Duration,
    ) -> Result<Self, SourceError> {
        let target = RelationalTarget::parse(&config.connection_string)
            .map_err(|e| SourceError::Invalid(e.to_string()))?;
        let username = config.username.as_deref().unwrap_or_default();
        let password = config.password.as_deref().unwrap_or_default();

        debug!(dialect = dialect.name(), host = %target.host, port = target.port, database = %target.database, "connecting");

        match dialect {
            Dialect::Postgres => {
                let options = PgConnectOptions::new()
                    .host(&target.host)
                    .port(target.port)
                    .database(&target.database)
                    .username(username)
                    .password(password);
                let conn = bounded(budget, PgConnection::connect_with(&options)).await?;
                Ok(RelationalConnection::Postgres(conn))
            }
            Dialect::MySql => {
                let options = MySqlConnectOptions::new()
                    .host(&target.host)
                    .port(target.port)
                    .database(&target.database)
                    .username(username)
                    .password(password);
                let conn = bounded(budget, MySqlConnection::connect_with(&options)).await?;
                Ok(RelationalConnection::MySql(conn))
            }
        }
    }

    /// Run `sql` and convert every row to a JSON record.
    pub async fn fetch_records(
        &mut self,
        sql: &str,
        budget: Duration,
    ) -> Result<Vec<Map<String, Value>>, SourceError> {
        debug!(%sql, "executing");
        match self {
            RelationalConnection::Postgres(conn) => {
                let rows = bounded(budget, sqlx::query(sql).fetch_all(&mut *conn)).await?;
                rows.iter().map(pg_row_to_record).collect()
            }
            RelationalConnection::MySql(conn) => {
                let rows = bounded(budget, sqlx::query(sql).fetch_all(&mut *conn)).await?;
                rows.iter().map(mysql_row_to_record).collect()
            }
        }
    }

    /// Run a query whose first column is a single integer count.
    pub async fn fetch_count(&mut self, sql: &str, budget: Duration) -> Result<u64, SourceError> {
        debug!(%sql, "counting");
        let total: i64 = match self {
            RelationalConnection::Postgres(conn) => {
                let row = bounded(budget, sqlx::query(sql).fetch_one(&mut *conn)).await?;
                row.try_get(0)?
            }
            RelationalConnection::MySql(conn) => {
                let row = bounded(budget, sqlx::query(sql).fetch_one(&mut *conn)).await?;
                row.try_get(0)?
            }
        };
        u64::try_from(total).map_err(|_| SourceError::Invalid(format!("negative count {}", total)))
    }

    /// Cheapest liveness check.
    pub async fn ping(&mut self, budget: Duration) -> Result<(), SourceError> {
        match self {
            RelationalConnection::Postgres(conn) => bounded(budget, conn.ping()).await,
            RelationalConnection::MySql(conn) => bounded(budget, conn.ping()).await,
        }
    }

    /// Close the connection. Failures are logged, not returned.
    pub async fn close(self) {
        let result = match self {
            RelationalConnection::Postgres(conn) => conn.close().await,
            RelationalConnection::MySql(conn) => conn.close().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to close relational connection");
        }
    }
}

fn number_from_f64(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn decimal_to_json(d: Decimal) -> Value {
    // Keep integral decimals exact, fall back to text beyond f64 range.
    if d.fract().is_zero() {
        if let Ok(i) = i64::try_from(d) {
            return Value::from(i);
        }
    }
    d.to_string()
        .parse::<f64>()
        .map(number_from_f64)
        .unwrap_or_else(|_| Value::String(d.to_string()))
}

fn bytes_to_json(bytes: Vec<u8>) -> Value {
    Value::String(BASE64.encode(bytes))
}

/// MySQL sends `BIT(n)` big-endian in as few bytes as fit.
fn bits_to_json(bytes: Vec<u8>) -> Value {
    Value::from(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn interval_to_json(interval: PgInterval) -> Value {
    json!({
        "months": interval.months,
        "days": interval.days,
        "microseconds": interval.microseconds,
    })
}

fn unsupported(column: &str, type_name: &str) -> SourceError {
    SourceError::Invalid(format!(
        "column '{}' has unsupported type {}; cast it to text in the query",
        column, type_name
    ))
}

/// How a Postgres value of one type becomes JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PgDecoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Money,
    Oid,
    Uuid,
    Json,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
}

impl PgDecoder {
    fn for_type(type_name: &str) -> Option<Self> {
        let decoder = match type_name {
            "BOOL" => PgDecoder::Bool,
            "INT2" => PgDecoder::Int2,
            "INT4" => PgDecoder::Int4,
            "INT8" => PgDecoder::Int8,
            "FLOAT4" => PgDecoder::Float4,
            "FLOAT8" => PgDecoder::Float8,
            "NUMERIC" => PgDecoder::Numeric,
            "MONEY" => PgDecoder::Money,
            "OID" => PgDecoder::Oid,
            "UUID" => PgDecoder::Uuid,
            "JSON" | "JSONB" => PgDecoder::Json,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => PgDecoder::Text,
            "BYTEA" => PgDecoder::Bytes,
            "DATE" => PgDecoder::Date,
            "TIME" => PgDecoder::Time,
            "TIMESTAMP" => PgDecoder::Timestamp,
            "TIMESTAMPTZ" => PgDecoder::TimestampTz,
            "INTERVAL" => PgDecoder::Interval,
            _ => return None,
        };
        Some(decoder)
    }

    /// Whether `Vec<Option<T>>` decoding exists for this element type.
    fn has_array(self) -> bool {
        !matches!(
            self,
            PgDecoder::Json | PgDecoder::Bytes | PgDecoder::Money | PgDecoder::Oid | PgDecoder::Interval
        )
    }
}

fn pg_row_to_record(row: &PgRow) -> Result<Map<String, Value>, SourceError> {
    let mut record = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let type_info = column.type_info();
        let value = if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
            option_to_json(row.try_get_unchecked::<Option<String>, _>(idx)?.map(Value::String))
        } else if let Some(element) = type_info.name().strip_suffix("[]") {
            match PgDecoder::for_type(element).filter(|d| d.has_array()) {
                Some(decoder) => pg_array(row, idx, decoder)?,
                None => return Err(unsupported(column.name(), type_info.name())),
            }
        } else {
            match PgDecoder::for_type(type_info.name()) {
                Some(decoder) => pg_scalar(row, idx, decoder)?,
                None => return Err(unsupported(column.name(), type_info.name())),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn option_to_json(value: Option<Value>) -> Value {
    value.unwrap_or(Value::Null)
}

fn pg_scalar(row: &PgRow, idx: usize, decoder: PgDecoder) -> Result<Value, sqlx::Error> {
    let value = match decoder {
        PgDecoder::Bool => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        PgDecoder::Int2 => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        PgDecoder::Int4 => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        PgDecoder::Int8 => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        PgDecoder::Float4 => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|f| number_from_f64(f64::from(f))),
        PgDecoder::Float8 => row.try_get::<Option<f64>, _>(idx)?.map(number_from_f64),
        PgDecoder::Numeric => row.try_get::<Option<Decimal>, _>(idx)?.map(decimal_to_json),
        // lc_monetary decides the scale; two places covers every common locale
        PgDecoder::Money => row
            .try_get::<Option<PgMoney>, _>(idx)?
            .map(|m| decimal_to_json(m.to_decimal(2))),
        PgDecoder::Oid => row.try_get::<Option<Oid>, _>(idx)?.map(|o| Value::from(o.0)),
        PgDecoder::Uuid => row
            .try_get::<Option<Uuid>, _>(idx)?
            .map(|u| Value::String(u.to_string())),
        PgDecoder::Json => row.try_get::<Option<Value>, _>(idx)?,
        PgDecoder::Text => row.try_get_unchecked::<Option<String>, _>(idx)?.map(Value::String),
        PgDecoder::Bytes => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(bytes_to_json),
        PgDecoder::Date => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.to_string())),
        PgDecoder::Time => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| Value::String(t.to_string())),
        PgDecoder::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|t| Value::String(t.to_string())),
        PgDecoder::TimestampTz => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|t| Value::String(t.to_rfc3339())),
        PgDecoder::Interval => row.try_get::<Option<PgInterval>, _>(idx)?.map(interval_to_json),
    };
    Ok(option_to_json(value))
}

fn pg_elements<T>(
    row: &PgRow,
    idx: usize,
    to_json: impl Fn(T) -> Value,
) -> Result<Value, sqlx::Error>
where
    Vec<Option<T>>: for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    let items = row.try_get::<Option<Vec<Option<T>>>, _>(idx)?;
    Ok(option_to_json(items.map(|items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| option_to_json(item.map(&to_json)))
                .collect(),
        )
    })))
}

fn pg_array(row: &PgRow, idx: usize, element: PgDecoder) -> Result<Value, sqlx::Error> {
    match element {
        PgDecoder::Bool => pg_elements::<bool>(row, idx, Value::Bool),
        PgDecoder::Int2 => pg_elements::<i16>(row, idx, Value::from),
        PgDecoder::Int4 => pg_elements::<i32>(row, idx, Value::from),
        PgDecoder::Int8 => pg_elements::<i64>(row, idx, Value::from),
        PgDecoder::Float4 => pg_elements::<f32>(row, idx, |f| number_from_f64(f64::from(f))),
        PgDecoder::Float8 => pg_elements::<f64>(row, idx, number_from_f64),
        PgDecoder::Numeric => pg_elements::<Decimal>(row, idx, decimal_to_json),
        PgDecoder::Uuid => pg_elements::<Uuid>(row, idx, |u| Value::String(u.to_string())),
        PgDecoder::Text => pg_elements::<String>(row, idx, Value::String),
        PgDecoder::Date => pg_elements::<NaiveDate>(row, idx, |d| Value::String(d.to_string())),
        PgDecoder::Time => pg_elements::<NaiveTime>(row, idx, |t| Value::String(t.to_string())),
        PgDecoder::Timestamp => {
            pg_elements::<NaiveDateTime>(row, idx, |t| Value::String(t.to_string()))
        }
        PgDecoder::TimestampTz => {
            pg_elements::<DateTime<Utc>>(row, idx, |t| Value::String(t.to_rfc3339()))
        }
        other => Err(sqlx::Error::Decode(
            format!("no array decoding for {:?}", other).into(),
        )),
    }
}

/// How a MySQL value of one type becomes JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MySqlDecoder {
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    Json,
    Text,
    Bytes,
    Bit,
    Date,
    Time,
    DateTime,
    Timestamp,
    Null,
}

impl MySqlDecoder {
    fn for_type(type_name: &str) -> Option<Self> {
        let decoder = match type_name {
            "BOOLEAN" => MySqlDecoder::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => MySqlDecoder::Signed,
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => MySqlDecoder::Unsigned,
            "FLOAT" => MySqlDecoder::Float,
            "DOUBLE" => MySqlDecoder::Double,
            "DECIMAL" => MySqlDecoder::Decimal,
            "JSON" => MySqlDecoder::Json,
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
                MySqlDecoder::Text
            }
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                MySqlDecoder::Bytes
            }
            "BIT" => MySqlDecoder::Bit,
            "DATE" => MySqlDecoder::Date,
            "TIME" => MySqlDecoder::Time,
            "DATETIME" => MySqlDecoder::DateTime,
            "TIMESTAMP" => MySqlDecoder::Timestamp,
            "NULL" => MySqlDecoder::Null,
            _ => return None,
        };
        Some(decoder)
    }
}

fn mysql_row_to_record(row: &MySqlRow) -> Result<Map<String, Value>, SourceError> {
    let mut record = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let decoder =
            MySqlDecoder::for_type(type_name).ok_or_else(|| unsupported(column.name(), type_name))?;
        record.insert(column.name().to_string(), mysql_value(row, idx, decoder)?);
    }
    Ok(record)
}

fn mysql_value(row: &MySqlRow, idx: usize, decoder: MySqlDecoder) -> Result<Value, sqlx::Error> {
    let value = match decoder {
        MySqlDecoder::Bool => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        MySqlDecoder::Signed => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        MySqlDecoder::Unsigned => row.try_get::<Option<u64>, _>(idx)?.map(Value::from),
        MySqlDecoder::Float => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|f| number_from_f64(f64::from(f))),
        MySqlDecoder::Double => row.try_get::<Option<f64>, _>(idx)?.map(number_from_f64),
        MySqlDecoder::Decimal => row.try_get::<Option<Decimal>, _>(idx)?.map(decimal_to_json),
        MySqlDecoder::Json => row.try_get::<Option<Value>, _>(idx)?,
        MySqlDecoder::Text => row.try_get_unchecked::<Option<String>, _>(idx)?.map(Value::String),
        MySqlDecoder::Bytes => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
            .map(bytes_to_json),
        MySqlDecoder::Bit => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
            .map(bits_to_json),
        MySqlDecoder::Date => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.to_string())),
        MySqlDecoder::Time => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| Value::String(t.to_string())),
        MySqlDecoder::DateTime => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|t| Value::String(t.to_string())),
        MySqlDecoder::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|t| Value::String(t.to_rfc3339())),
        MySqlDecoder::Null => None,
    };
    Ok(option_to_json(value))
}
