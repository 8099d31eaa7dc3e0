//! Conversion of dumped cell text into SQL literals.
//!
//! The table files carry every value as text. On restore each cell is turned
//! into a literal according to the live column's [`ColumnType`]:
//!
//! | Column type              | Literal                                      |
//! |--------------------------|----------------------------------------------|
//! | large binary, unsupported| `NULL` (LOBs come back through the patch script) |
//! | date, time               | raw text, quoted                             |
//! | timestamp                | reparsed and reformatted, quoted, or `NULL`  |
//! | timestamp with zone      | reparsed with offset, quoted, or `NULL`      |
//! | timestamp, numeric text  | raw text, verbatim (epoch or Julian day)     |
//! | text, large text         | raw text, quoted                             |
//! | numeric                  | raw text, verbatim                           |
//!
//! The input `NULL` (any case) always yields `NULL`.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::warn;

use crate::schema::ColumnType;
use crate::value::NULL_LITERAL;

/// Timestamp formats tried in order, without zone.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Timestamp formats tried in order, with zone offset.
const TIMESTAMP_TZ_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Output format for timestamps.
const TIMESTAMP_OUTPUT: &str = "%Y-%m-%d %H:%M:%S%.3f";
/// Output format for timestamps with zone.
const TIMESTAMP_TZ_OUTPUT: &str = "%Y-%m-%d %H:%M:%S%.3f%:z";

/// Builds the SQL literal for `raw` in a column of type `column_type`.
#[must_use]
pub fn literal_for(column_type: ColumnType, raw: &str) -> String {
    if raw.eq_ignore_ascii_case(NULL_LITERAL) {
        return NULL_LITERAL.to_string();
    }

    match column_type {
        ColumnType::LargeBinary | ColumnType::Unsupported => NULL_LITERAL.to_string(),
        ColumnType::Date | ColumnType::Time | ColumnType::Text | ColumnType::LargeText => {
            quote(raw)
        }
        ColumnType::Timestamp | ColumnType::TimestampTz if is_number(raw) => raw.to_string(),
        ColumnType::Timestamp => match parse_timestamp(raw) {
            Some(ts) => quote(&ts.format(TIMESTAMP_OUTPUT).to_string()),
            None => {
                warn!(value = %raw, "Can't parse timestamp, restoring NULL");
                NULL_LITERAL.to_string()
            }
        },
        ColumnType::TimestampTz => match parse_timestamp_tz(raw) {
            Some(ts) => quote(&ts.format(TIMESTAMP_TZ_OUTPUT).to_string()),
            None => {
                warn!(value = %raw, "Can't parse timestamp with time zone, restoring NULL");
                NULL_LITERAL.to_string()
            }
        },
        ColumnType::Numeric => raw.to_string(),
    }
}

/// Parses a zone-less timestamp against the fallback chain.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Parses a timestamp carrying a zone offset against the fallback chain.
#[must_use]
pub fn parse_timestamp_tz(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    TIMESTAMP_TZ_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok())
}

/// Returns whether `raw` is a finite decimal number.
fn is_number(raw: &str) -> bool {
    raw.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        && raw.parse::<f64>().is_ok_and(f64::is_finite)
}

fn quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_input_for_every_type() {
        for column_type in [
            ColumnType::Text,
            ColumnType::Numeric,
            ColumnType::Date,
            ColumnType::Time,
            ColumnType::Timestamp,
            ColumnType::TimestampTz,
            ColumnType::LargeBinary,
            ColumnType::LargeText,
            ColumnType::Unsupported,
        ] {
            assert_eq!(literal_for(column_type, "NULL"), "NULL");
            assert_eq!(literal_for(column_type, "null"), "NULL");
        }
    }

    #[test]
    fn test_coercion_matrix() {
        assert_eq!(
            literal_for(ColumnType::Timestamp, "2024-01-05T10:00:00.000"),
            "'2024-01-05 10:00:00.000'"
        );
        assert_eq!(literal_for(ColumnType::Text, "O'Brien"), "'O''Brien'");
        assert_eq!(literal_for(ColumnType::LargeText, "it's"), "'it''s'");
        assert_eq!(literal_for(ColumnType::Numeric, "42"), "42");
        assert_eq!(literal_for(ColumnType::Date, "2024-01-05"), "'2024-01-05'");
        assert_eq!(literal_for(ColumnType::Time, "not checked"), "'not checked'");
        assert_eq!(literal_for(ColumnType::LargeBinary, "ignored"), "NULL");
        assert_eq!(literal_for(ColumnType::Unsupported, "ignored"), "NULL");
    }

    #[test]
    fn test_timestamp_fallback_chain() {
        assert_eq!(
            literal_for(ColumnType::Timestamp, "2024-01-05T10:00:00"),
            "'2024-01-05 10:00:00.000'"
        );
        assert_eq!(
            literal_for(ColumnType::Timestamp, "2024-01-05 10:00:00.25"),
            "'2024-01-05 10:00:00.250'"
        );
        assert_eq!(
            literal_for(ColumnType::Timestamp, "2024-01-05T10:00"),
            "'2024-01-05 10:00:00.000'"
        );
    }

    #[test]
    fn test_timestamp_with_zone() {
        assert_eq!(
            literal_for(ColumnType::TimestampTz, "2024-01-05T10:00:00.500+02:00"),
            "'2024-01-05 10:00:00.500+02:00'"
        );
        assert_eq!(
            literal_for(ColumnType::TimestampTz, "2024-01-05T10:00:00Z"),
            "'2024-01-05 10:00:00.000+00:00'"
        );
        assert_eq!(
            literal_for(ColumnType::TimestampTz, "2024-01-05T10:00+02:00"),
            "'2024-01-05 10:00:00.000+02:00'"
        );
        assert_eq!(
            literal_for(ColumnType::TimestampTz, "2024-01-05 10:00-05:30"),
            "'2024-01-05 10:00:00.000-05:30'"
        );
    }

    #[test]
    fn test_numeric_timestamps_pass_through() {
        assert_eq!(literal_for(ColumnType::Timestamp, "1704448800"), "1704448800");
        assert_eq!(literal_for(ColumnType::Timestamp, "2460314.9166"), "2460314.9166");
        assert_eq!(literal_for(ColumnType::TimestampTz, "-86400"), "-86400");
        assert_eq!(literal_for(ColumnType::Timestamp, "inf"), "NULL");
        assert_eq!(literal_for(ColumnType::Timestamp, "NaN"), "NULL");
    }

    #[test]
    fn test_unparseable_timestamp_is_null() {
        assert_eq!(literal_for(ColumnType::Timestamp, "not-a-date"), "NULL");
        assert_eq!(literal_for(ColumnType::TimestampTz, "not-a-date"), "NULL");
    }
}
