//! Relational store port and its PostgreSQL pool.
//!
//! Rows are decoded into [`SqlValue`] cells here so the rest of the crate
//! never sees driver types. Decoding is driven by the column's declared
//! type. NUMERIC is rendered from its wire form so no precision is lost, and
//! values of types without a decoder are kept as raw bytes rather than
//! guessed at.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, PgValueFormat, PgValueRef};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{info, instrument};

use super::config::BackendConfig;
use super::error::BackendFailure;

// Sign words of the binary NUMERIC format.
const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// One decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision decimal in its exact textual form.
    Numeric(String),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    LocalTimestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(Value),
}

/// Ordered rows with their column names, exactly as returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    /// Whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Vec<&SqlValue> {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => self.rows.iter().filter_map(|row| row.get(idx)).collect(),
            None => Vec::new(),
        }
    }
}

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
}

/// SQL text plus positional parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    /// Create a query without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next text parameter.
    pub fn bind_text(mut self, value: impl Into<String>) -> Self {
        self.params.push(SqlParam::Text(value.into()));
        self
    }
}

/// A relational database.
#[async_trait]
pub trait SqlStore: Send + Sync {
    /// Run one query inside a read-only transaction and return its rows.
    async fn fetch(&self, query: SqlQuery) -> Result<RowSet, BackendFailure>;

    /// Release the pool.
    async fn close(&self) -> Result<(), BackendFailure> {
        Ok(())
    }
}

/// A PostgreSQL connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open the pool, establishing `min_connections` connections.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BackendFailure> {
        let pool = PgPoolOptions::new()
            .min_connections(config.limits.min_connections)
            .max_connections(config.limits.max_connections)
            .acquire_timeout(config.limits.connect_timeout)
            .connect(&config.address)
            .await
            .map_err(|e| BackendFailure::from_sqlx(&e))?;

        info!(
            min = config.limits.min_connections,
            max = config.limits.max_connections,
            "PostgreSQL pool ready"
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl SqlStore for PgStore {
    #[instrument(skip_all, fields(params = query.params.len()))]
    async fn fetch(&self, query: SqlQuery) -> Result<RowSet, BackendFailure> {
        let sqlx_err = |e: sqlx::Error| BackendFailure::from_sqlx(&e);

        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(sqlx_err)?;

        let mut statement = sqlx::query(&query.sql);
        for param in &query.params {
            statement = match param {
                SqlParam::Text(text) => statement.bind(text.clone()),
            };
        }
        let rows = statement.fetch_all(&mut *tx).await.map_err(sqlx_err)?;
        tx.rollback().await.map_err(sqlx_err)?;

        decode_rows(&rows)
    }

    async fn close(&self) -> Result<(), BackendFailure> {
        self.pool.close().await;
        Ok(())
    }
}

fn decode_rows(rows: &[PgRow]) -> Result<RowSet, BackendFailure> {
    let columns: Vec<(String, String)> = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| (c.name().to_string(), c.type_info().name().to_string()))
                .collect()
        })
        .unwrap_or_default();

    let decoded = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(idx, (_, type_name))| decode_cell(row, idx, type_name))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RowSet {
        columns: columns.into_iter().map(|(name, _)| name).collect(),
        rows: decoded,
    })
}

fn decode_cell(row: &PgRow, idx: usize, type_name: &str) -> Result<SqlValue, BackendFailure> {
    let raw = row
        .try_get_raw(idx)
        .map_err(|e| BackendFailure::from_sqlx(&e))?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    if type_name == "NUMERIC" {
        return numeric_value(&raw);
    }
    Ok(decode_typed(row, idx, type_name).unwrap_or_else(|_| untyped_value(&raw)))
}

/// A value with no decoder: text as sent when the server used the text
/// format, otherwise the wire bytes untouched.
fn untyped_value(raw: &PgValueRef<'_>) -> SqlValue {
    match raw.as_bytes() {
        Ok(bytes) if raw.format() == PgValueFormat::Text => match std::str::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text.to_string()),
            Err(_) => SqlValue::Bytes(bytes.to_vec()),
        },
        Ok(bytes) => SqlValue::Bytes(bytes.to_vec()),
        Err(_) => SqlValue::Null,
    }
}

fn numeric_value(raw: &PgValueRef<'_>) -> Result<SqlValue, BackendFailure> {
    let bytes = raw
        .as_bytes()
        .map_err(|e| BackendFailure::protocol(format!("NUMERIC value: {e}")))?;
    let text = match raw.format() {
        PgValueFormat::Text => std::str::from_utf8(bytes)
            .map_err(|e| BackendFailure::protocol(format!("NUMERIC value: {e}")))?
            .to_string(),
        PgValueFormat::Binary => numeric_text(bytes)?,
    };
    Ok(SqlValue::Numeric(text))
}

fn be_u16(buf: &[u8], at: usize) -> Option<u16> {
    buf.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Render a binary NUMERIC (base-10000 digit groups plus weight, sign and
/// display scale) the way PostgreSQL prints it.
fn numeric_text(buf: &[u8]) -> Result<String, BackendFailure> {
    let malformed = || BackendFailure::protocol("malformed NUMERIC value");
    let header = |at| be_u16(buf, at).ok_or_else(malformed);

    let ndigits = usize::from(header(0)?);
    let weight = i32::from(header(2)? as i16);
    let sign = header(4)?;
    let dscale = usize::from(header(6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        _ => return Err(malformed()),
    }

    let digits = (0..ndigits)
        .map(|i| be_u16(buf, 8 + 2 * i).filter(|d| *d < 10_000))
        .collect::<Option<Vec<u16>>>()
        .ok_or_else(malformed)?;
    let group = |i: i32| {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i))
            .copied()
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", group(i)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn decode_typed(row: &PgRow, idx: usize, type_name: &str) -> Result<SqlValue, sqlx::Error> {
    fn cell<T>(value: Option<T>, wrap: impl FnOnce(T) -> SqlValue) -> SqlValue {
        value.map_or(SqlValue::Null, wrap)
    }

    let value = match type_name {
        "BOOL" => cell(row.try_get::<Option<bool>, _>(idx)?, SqlValue::Bool),
        "INT2" => cell(row.try_get::<Option<i16>, _>(idx)?, |v| SqlValue::Int(v.into())),
        "INT4" => cell(row.try_get::<Option<i32>, _>(idx)?, |v| SqlValue::Int(v.into())),
        "INT8" => cell(row.try_get::<Option<i64>, _>(idx)?, SqlValue::Int),
        "FLOAT4" => cell(row.try_get::<Option<f32>, _>(idx)?, |v| SqlValue::Float(v.into())),
        "FLOAT8" => cell(row.try_get::<Option<f64>, _>(idx)?, SqlValue::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            cell(row.try_get::<Option<String>, _>(idx)?, SqlValue::Text)
        }
        "UUID" => cell(row.try_get::<Option<uuid::Uuid>, _>(idx)?, |v| {
            SqlValue::Text(v.to_string())
        }),
        "JSON" | "JSONB" => cell(row.try_get::<Option<Value>, _>(idx)?, SqlValue::Json),
        "TIMESTAMPTZ" => cell(
            row.try_get::<Option<DateTime<Utc>>, _>(idx)?,
            SqlValue::Timestamp,
        ),
        "TIMESTAMP" => cell(
            row.try_get::<Option<NaiveDateTime>, _>(idx)?,
            SqlValue::LocalTimestamp,
        ),
        "DATE" => cell(row.try_get::<Option<NaiveDate>, _>(idx)?, SqlValue::Date),
        "TIME" => cell(row.try_get::<Option<NaiveTime>, _>(idx)?, SqlValue::Time),
        "BYTEA" => cell(row.try_get::<Option<Vec<u8>>, _>(idx)?, SqlValue::Bytes),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => cell(row.try_get::<Option<Vec<String>>, _>(idx)?, |v| {
            SqlValue::Json(Value::from(v))
        }),
        "INT4[]" => cell(row.try_get::<Option<Vec<i32>>, _>(idx)?, |v| {
            SqlValue::Json(Value::from(v))
        }),
        "INT8[]" => cell(row.try_get::<Option<Vec<i64>>, _>(idx)?, |v| {
            SqlValue::Json(Value::from(v))
        }),
        _ => return Err(sqlx::Error::Decode(format!("no decoder for {type_name}").into())),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_binds_in_order() {
        let query = SqlQuery::new("SELECT 1 WHERE a = $1 AND b = $2")
            .bind_text("public")
            .bind_text("users");
        assert_eq!(
            query.params,
            vec![
                SqlParam::Text("public".to_string()),
                SqlParam::Text("users".to_string())
            ]
        );
    }

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for digit in digits {
            buf.extend_from_slice(&digit.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_numeric_keeps_every_digit() {
        let wide = numeric(4, NUMERIC_POS, 9, &[1234, 5678, 9012, 3456, 7890, 0, 0, 1000]);
        assert_eq!(numeric_text(&wide).unwrap(), "12345678901234567890.000000001");

        // numeric(40,0): more digits than any fixed-width decimal holds
        let forty = numeric(9, NUMERIC_POS, 0, &[1000]);
        let text = numeric_text(&forty).unwrap();
        assert_eq!(text.len(), 40);
        assert_eq!(text, format!("1{}", "0".repeat(39)));
    }

    #[test]
    fn test_numeric_small_and_negative_values() {
        assert_eq!(numeric_text(&numeric(-1, NUMERIC_POS, 2, &[500])).unwrap(), "0.05");
        assert_eq!(numeric_text(&numeric(-2, NUMERIC_POS, 5, &[1000])).unwrap(), "0.00001");
        assert_eq!(numeric_text(&numeric(1, NUMERIC_POS, 0, &[1])).unwrap(), "10000");
        assert_eq!(numeric_text(&numeric(0, NUMERIC_NEG, 1, &[1, 5000])).unwrap(), "-1.5");
        assert_eq!(numeric_text(&numeric(0, NUMERIC_POS, 0, &[])).unwrap(), "0");
        assert_eq!(numeric_text(&numeric(0, NUMERIC_POS, 2, &[])).unwrap(), "0.00");
    }

    #[test]
    fn test_numeric_special_values() {
        assert_eq!(numeric_text(&numeric(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(numeric_text(&numeric(0, NUMERIC_PINF, 0, &[])).unwrap(), "Infinity");
        assert_eq!(numeric_text(&numeric(0, NUMERIC_NINF, 0, &[])).unwrap(), "-Infinity");
    }

    #[test]
    fn test_malformed_numeric_is_a_protocol_failure() {
        let truncated = &numeric(0, NUMERIC_POS, 0, &[12])[..9];
        assert!(matches!(numeric_text(truncated), Err(BackendFailure::Protocol(_))));
        let bad_digit = numeric(0, NUMERIC_POS, 0, &[10_000]);
        assert!(matches!(numeric_text(&bad_digit), Err(BackendFailure::Protocol(_))));
        let bad_sign = numeric(0, 0x1234, 0, &[1]);
        assert!(matches!(numeric_text(&bad_sign), Err(BackendFailure::Protocol(_))));
    }

    #[test]
    fn test_rowset_column_lookup() {
        let rows = RowSet {
            columns: vec!["table_name".to_string(), "n".to_string()],
            rows: vec![
                vec![SqlValue::Text("a".to_string()), SqlValue::Int(1)],
                vec![SqlValue::Text("b".to_string()), SqlValue::Int(2)],
            ],
        };
        assert_eq!(
            rows.column("table_name"),
            vec![&SqlValue::Text("a".to_string()), &SqlValue::Text("b".to_string())]
        );
        assert!(rows.column("missing").is_empty());
    }
}
