// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All functions accept `&Database` and go through the
//! single tokio-rusqlite connection.

pub mod conversations;
pub mod memories;
pub mod sources;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamp format for all tables: RFC 3339 with millisecond precision,
/// UTC with `Z` suffix. Sorts lexicographically.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp, mapping malformed rows to a conversion error
/// rather than panicking.
pub(crate) fn parse_ts(column: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Parse a stored JSON column, mapping malformed rows to a conversion error.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    column: usize,
    s: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}
