//! AnyPool row-extraction helpers.
//!
//! `sqlx::AnyPool` only natively decodes primitive types (i8/i16/i32/i64,
//! f32/f64, bool, String, &[u8]). Timestamps and JSON blobs are stored as
//! `TEXT` and converted here.
//!
//! All functions return `sqlx::Error` so they fit naturally into
//! `sqlx::FromRow` manual implementations.

use chrono::{DateTime, Utc};
use sqlx::{Row, any::AnyRow};

// ── DateTime<Utc> ─────────────────────────────────────────────────────────────

pub fn get_datetime(row: &AnyRow, col: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let s: String = row.try_get(col)?;
    parse_datetime(&s).map_err(sqlx::Error::Decode)
}

/// Timestamps are written as RFC 3339; the SQLite `CURRENT_TIMESTAMP` shape is
/// accepted too for rows inserted by hand.
fn parse_datetime(
    s: &str,
) -> Result<DateTime<Utc>, Box<dyn std::error::Error + Send + Sync + 'static>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(dt.and_utc());
    }
    Err(format!("cannot parse timestamp: {s}").into())
}

/// Format a timestamp for a `TEXT` column.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// Decode a JSON column into any deserializable type; empty strings decode as `{}`.
pub fn get_json<T: serde::de::DeserializeOwned>(row: &AnyRow, col: &str) -> Result<T, sqlx::Error> {
    let s: String = row.try_get(col)?;
    let s = if s.is_empty() { "{}" } else { s.as_str() };
    serde_json::from_str(s).map_err(|e| sqlx::Error::Decode(Box::new(e) as _))
}

// ── bool ──────────────────────────────────────────────────────────────────────

/// Integer flag columns (`BIGINT` 0/1) as `bool`.
pub fn get_flag(row: &AnyRow, col: &str) -> Result<bool, sqlx::Error> {
    let v: i64 = row.try_get(col)?;
    Ok(v != 0)
}
