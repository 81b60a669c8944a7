use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use smallvec::SmallVec;

use crate::models::{ColumnType, ColumnTypeProfile, NormalizedColumn, TemporalFormat, SAMPLE_SIZE};

static TEMPORAL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"date|time").expect("temporal name pattern is valid"));

// Tried in order; the first format matching every sampled value wins.
const TEMPORAL_FORMATS: &[TemporalFormat] = &[
    TemporalFormat { pattern: "%Y-%m-%d %H:%M:%S", has_time: true },
    TemporalFormat { pattern: "%Y-%m-%dT%H:%M:%S", has_time: true },
    TemporalFormat { pattern: "%Y-%m-%d", has_time: false },
    TemporalFormat { pattern: "%Y/%m/%d", has_time: false },
    TemporalFormat { pattern: "%m/%d/%Y %H:%M:%S", has_time: true },
    TemporalFormat { pattern: "%m/%d/%Y", has_time: false },
    TemporalFormat { pattern: "%d/%m/%Y %H:%M:%S", has_time: true },
    TemporalFormat { pattern: "%d/%m/%Y", has_time: false },
    TemporalFormat { pattern: "%d-%m-%Y", has_time: false },
];

fn is_integer(value: &str) -> bool {
    value.parse::<i64>().is_ok()
}

fn parse_real(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer if every non-empty value is an integer, Real if every one is a
/// finite float, Text otherwise. Empty values do not vote.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen_any = false;
    let mut all_integer = true;

    for value in values.into_iter().map(str::trim).filter(|v| !v.is_empty()) {
        seen_any = true;
        if all_integer && is_integer(value) {
            continue;
        }
        all_integer = false;
        if parse_real(value).is_none() {
            return ColumnType::Text;
        }
    }

    match (seen_any, all_integer) {
        (false, _) => ColumnType::Text,
        (true, true) => ColumnType::Integer,
        (true, false) => ColumnType::Real,
    }
}

fn parses_as(value: &str, format: &TemporalFormat) -> bool {
    if format.has_time {
        NaiveDateTime::parse_from_str(value, format.pattern).is_ok()
    } else {
        NaiveDate::parse_from_str(value, format.pattern).is_ok()
    }
}

/// Picks a date format for a date/time-named column when all of its
/// non-empty sampled values share one.
pub fn detect_temporal_format(name: &str, values: &[&str]) -> Option<TemporalFormat> {
    if !TEMPORAL_NAME.is_match(name) {
        return None;
    }

    let non_empty: Vec<&str> = values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect();
    if non_empty.is_empty() {
        return None;
    }

    TEMPORAL_FORMATS
        .iter()
        .find(|format| non_empty.iter().all(|v| parses_as(v, format)))
        .copied()
}

/// Rewrites a date value in ISO-8601 form, or returns `None` if it does not
/// match `format`.
pub fn normalize_temporal_value(value: &str, format: &TemporalFormat) -> Option<String> {
    let value = value.trim();
    if format.has_time {
        NaiveDateTime::parse_from_str(value, format.pattern)
            .ok()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
    } else {
        NaiveDate::parse_from_str(value, format.pattern)
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string())
    }
}

pub fn profile_columns(columns: &[NormalizedColumn], sample: &[StringRecord]) -> Vec<ColumnTypeProfile> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let values: Vec<&str> = sample
                .iter()
                .map(|record| record.get(idx).unwrap_or(""))
                .collect();

            let inferred_type = infer_column_type(values.iter().copied());
            let temporal = match inferred_type {
                ColumnType::Text => detect_temporal_format(&column.clean_name, &values),
                _ => None,
            };

            let null_count = values.iter().filter(|v| v.trim().is_empty()).count();
            let sample_values: SmallVec<[String; SAMPLE_SIZE]> = values
                .iter()
                .filter(|v| !v.trim().is_empty())
                .take(SAMPLE_SIZE)
                .map(|v| v.to_string())
                .collect();

            tracing::debug!(
                "Column {} ({}) inferred as {} from {} sampled values{}",
                column.clean_name,
                column.original_label,
                inferred_type,
                values.len(),
                temporal.map(|t| format!(", dates as {}", t.pattern)).unwrap_or_default()
            );

            ColumnTypeProfile {
                column: column.clone(),
                inferred_type,
                temporal,
                sample_values,
                null_count,
            }
        })
        .collect()
}

/// Converts a raw cell to the value stored for `profile`. Empty cells become
/// NULL; values that do not fit a numeric column are kept rather than dropped.
pub fn to_sql_value(raw: &str, profile: &ColumnTypeProfile) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    match profile.inferred_type {
        ColumnType::Integer => match trimmed.parse::<i64>() {
            Ok(v) => Value::Integer(v),
            Err(_) => parse_real(trimmed)
                .map(Value::Real)
                .unwrap_or_else(|| Value::Text(raw.to_string())),
        },
        ColumnType::Real => parse_real(trimmed)
            .map(Value::Real)
            .unwrap_or_else(|| Value::Text(raw.to_string())),
        ColumnType::Text => {
            let normalized = profile
                .temporal
                .as_ref()
                .and_then(|format| normalize_temporal_value(trimmed, format));
            Value::Text(normalized.unwrap_or_else(|| raw.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> NormalizedColumn {
        NormalizedColumn {
            original_label: name.to_string(),
            clean_name: name.to_string(),
            ordinal_position: 1,
        }
    }

    fn profile_of(name: &str, values: &[&str]) -> ColumnTypeProfile {
        let sample: Vec<StringRecord> = values.iter().map(|v| StringRecord::from(vec![*v])).collect();
        profile_columns(&[column(name)], &sample).remove(0)
    }

    #[test]
    fn pure_integers_infer_integer() {
        assert_eq!(infer_column_type(["1", "-20", " 300 ", "+4"]), ColumnType::Integer);
    }

    #[test]
    fn mixed_integers_and_floats_infer_real() {
        assert_eq!(infer_column_type(["1", "2.5", "1e3"]), ColumnType::Real);
    }

    #[test]
    fn one_non_numeric_value_makes_the_column_text() {
        assert_eq!(infer_column_type(["1", "2", "three", "4"]), ColumnType::Text);
        assert_eq!(infer_column_type(["1.5", "NaN"]), ColumnType::Text);
        assert_eq!(infer_column_type(["1", "inf"]), ColumnType::Text);
    }

    #[test]
    fn empty_values_are_ignored_for_typing() {
        assert_eq!(infer_column_type(["", "7", "  ", "8"]), ColumnType::Integer);
        assert_eq!(infer_column_type(["", ""]), ColumnType::Text);
        assert_eq!(infer_column_type(std::iter::empty()), ColumnType::Text);
    }

    #[test]
    fn profile_counts_nulls_and_keeps_samples() {
        let profile = profile_of("qty", &["", "3", "4", "5", "6"]);
        assert_eq!(profile.inferred_type, ColumnType::Integer);
        assert_eq!(profile.null_count, 1);
        assert_eq!(profile.sample_values.as_slice(), ["3", "4", "5"]);
    }

    #[test]
    fn short_records_count_as_empty() {
        let sample = vec![StringRecord::from(vec!["1", "x"]), StringRecord::from(vec!["2"])];
        let profiles = profile_columns(&[column("a"), column("b")], &sample);
        assert_eq!(profiles[0].inferred_type, ColumnType::Integer);
        assert_eq!(profiles[1].inferred_type, ColumnType::Text);
        assert_eq!(profiles[1].null_count, 1);
    }

    #[test]
    fn date_named_columns_get_a_shared_format() {
        let profile = profile_of("order_date", &["11/8/2016", "12/31/2016", ""]);
        let format = profile.temporal.expect("dates detected");
        assert_eq!(format.pattern, "%m/%d/%Y");
        assert_eq!(
            to_sql_value("12/31/2016", &profile),
            Value::Text("2016-12-31".to_string())
        );
    }

    #[test]
    fn temporal_detection_needs_a_matching_name_and_every_value() {
        assert!(profile_of("comment", &["2024-01-01"]).temporal.is_none());
        assert!(profile_of("ship_date", &["2024-01-01", "soon"]).temporal.is_none());
        assert!(detect_temporal_format("start_time", &["2024-01-01 08:30:00"]).is_some());
    }

    #[test]
    fn values_convert_by_inferred_type() {
        let int_col = profile_of("n", &["1", "2"]);
        assert_eq!(to_sql_value(" 42 ", &int_col), Value::Integer(42));
        assert_eq!(to_sql_value("", &int_col), Value::Null);
        // beyond the sample: kept, not dropped
        assert_eq!(to_sql_value("4.5", &int_col), Value::Real(4.5));
        assert_eq!(to_sql_value("n/a", &int_col), Value::Text("n/a".to_string()));

        let real_col = profile_of("price", &["1.25"]);
        assert_eq!(to_sql_value("2", &real_col), Value::Real(2.0));

        let text_col = profile_of("name", &["Ann"]);
        assert_eq!(to_sql_value(" Bob ", &text_col), Value::Text(" Bob ".to_string()));
        assert_eq!(to_sql_value("   ", &text_col), Value::Null);
    }
}
