use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

use crate::config::AdvisorConfig;

static IDENTIFIER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(id|.+_id)$").expect("identifier pattern is valid"));
static TEMPORAL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(date|timestamp|.+_date|.+_time|.+_timestamp)$").expect("temporal pattern is valid")
});
static CATEGORICAL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(region|category|status|state|city|segment|.+_(type|status|category|region))$")
        .expect("categorical pattern is valid")
});

/// Cardinality of one populated column. Nulls are not counted as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStats {
    pub name: String,
    pub distinct_count: usize,
}

/// How strongly a column name suggests it is filtered or joined on.
pub fn name_score(name: &str) -> u8 {
    if IDENTIFIER_NAME.is_match(name) {
        4
    } else if TEMPORAL_NAME.is_match(name) {
        3
    } else if CATEGORICAL_NAME.is_match(name) {
        2
    } else {
        0
    }
}

/// Proposes index columns for a populated table. Only conventionally named
/// columns that are neither constant nor unique per row qualify; an empty
/// result is normal for small or non-categorical data.
pub fn suggest_index_columns(
    stats: &[ColumnStats],
    row_count: usize,
    config: &AdvisorConfig,
) -> Vec<String> {
    if row_count == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<(u8, f64, usize, &str)> = stats
        .iter()
        .enumerate()
        .filter_map(|(ordinal, column)| {
            let score = name_score(&column.name);
            if score == 0 {
                return None;
            }
            if column.distinct_count <= 1 || column.distinct_count >= row_count {
                return None;
            }
            let ratio = column.distinct_count as f64 / row_count as f64;
            if ratio > config.max_distinct_ratio {
                tracing::debug!(
                    "Skipping index on {}: {} distinct over {} rows exceeds ratio {}",
                    column.name,
                    column.distinct_count,
                    row_count,
                    config.max_distinct_ratio
                );
                return None;
            }
            Some((score, ratio, ordinal, column.name.as_str()))
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .then(a.2.cmp(&b.2))
    });

    candidates
        .into_iter()
        .take(config.max_indexes)
        .map(|(_, _, _, name)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(name: &str, distinct_count: usize) -> ColumnStats {
        ColumnStats {
            name: name.to_string(),
            distinct_count,
        }
    }

    #[test]
    fn includes_categorical_ids_and_excludes_unique_ones() {
        let columns = vec![stats("row_id", 10_000), stats("customer_id", 500), stats("amount", 42)];
        let chosen = suggest_index_columns(&columns, 10_000, &AdvisorConfig::default());
        assert_eq!(chosen, vec!["customer_id"]);
    }

    #[test]
    fn constant_columns_are_not_indexed() {
        let columns = vec![stats("region", 1), stats("status", 3)];
        let chosen = suggest_index_columns(&columns, 100, &AdvisorConfig::default());
        assert_eq!(chosen, vec!["status"]);
    }

    #[test]
    fn no_qualifying_columns_is_not_an_error() {
        let columns = vec![stats("name", 3), stats("notes", 3)];
        assert!(suggest_index_columns(&columns, 10, &AdvisorConfig::default()).is_empty());
        assert!(suggest_index_columns(&[], 0, &AdvisorConfig::default()).is_empty());
    }

    #[test]
    fn ranks_by_name_then_cardinality_and_caps_the_count() {
        let columns = vec![
            stats("category", 10),
            stats("segment", 3),
            stats("order_date", 300),
            stats("product_id", 400),
            stats("customer_id", 200),
        ];
        let config = AdvisorConfig { max_distinct_ratio: 0.5, max_indexes: 4 };
        let chosen = suggest_index_columns(&columns, 1000, &config);
        assert_eq!(chosen, vec!["customer_id", "product_id", "order_date", "segment"]);
    }

    #[test]
    fn ratio_threshold_is_tunable() {
        let columns = vec![stats("customer_id", 800)];
        assert!(suggest_index_columns(&columns, 1000, &AdvisorConfig::default()).is_empty());

        let loose = AdvisorConfig { max_distinct_ratio: 0.9, max_indexes: 5 };
        assert_eq!(suggest_index_columns(&columns, 1000, &loose), vec!["customer_id"]);
    }

    #[test]
    fn name_conventions() {
        assert_eq!(name_score("id"), 4);
        assert_eq!(name_score("order_id"), 4);
        assert_eq!(name_score("date"), 3);
        assert_eq!(name_score("ship_date"), 3);
        assert_eq!(name_score("region"), 2);
        assert_eq!(name_score("payment_type"), 2);
        assert_eq!(name_score("idea"), 0);
        assert_eq!(name_score("valid"), 0);
    }
}
