//! Column codecs shared by the repositories.
//!
//! Timestamps go through `comanda_core::time` on every read and write, money
//! columns are `*_cents` integers, and JSON columns are TEXT.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use comanda_core::money::Money;
use comanda_core::time;

use crate::error::{DbError, DbResult};

pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    time::encode(ts)
}

pub(crate) fn encode_opt_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(time::encode)
}

pub(crate) fn ts(row: &SqliteRow, column: &str) -> DbResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    time::decode(&raw).map_err(|e| DbError::invalid_data(column, e))
}

pub(crate) fn opt_ts(row: &SqliteRow, column: &str) -> DbResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|r| time::decode(&r).map_err(|e| DbError::invalid_data(column, e)))
        .transpose()
}

pub(crate) fn money(row: &SqliteRow, column: &str) -> DbResult<Money> {
    // SUM() over zero rows yields NULL.
    let cents: Option<i64> = row.try_get(column)?;
    Ok(Money::from_cents(cents.unwrap_or(0)))
}

pub(crate) fn flag(row: &SqliteRow, column: &str) -> DbResult<bool> {
    let value: i64 = row.try_get(column)?;
    Ok(value != 0)
}

pub(crate) fn json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> DbResult<T> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| DbError::invalid_data(column, e))
}

pub(crate) fn opt_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> DbResult<Option<T>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|r| serde_json::from_str(&r).map_err(|e| DbError::invalid_data(column, e)))
        .transpose()
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::Internal(e.to_string()))
}

pub(crate) fn to_opt_json<T: Serialize>(value: Option<&T>) -> DbResult<Option<String>> {
    value.map(to_json).transpose()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
