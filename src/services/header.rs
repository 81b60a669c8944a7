use std::collections::HashSet;
use std::path::Path;

use crate::models::NormalizedColumn;

const DIGIT_PREFIX: &str = "c_";
const DEFAULT_TABLE_NAME: &str = "table_data";

/// Lowercases `label` and turns every run of characters outside `[a-z0-9]`
/// into one underscore, with no underscore at either end.
fn collapse_label(label: &str) -> String {
    let mut cleaned = String::with_capacity(label.len());
    let mut pending_separator = false;

    for c in label.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !cleaned.is_empty() {
                cleaned.push('_');
            }
            pending_separator = false;
            cleaned.push(c);
        } else {
            pending_separator = true;
        }
    }

    cleaned
}

/// Cleans a single label. `ordinal` is 1-based and only used for the
/// placeholder name of labels that clean down to nothing.
pub fn clean_label(label: &str, ordinal: usize) -> String {
    let cleaned = collapse_label(label);

    let cleaned = if cleaned.is_empty() {
        format!("column_{}", ordinal)
    } else {
        cleaned
    };

    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{}{}", DIGIT_PREFIX, cleaned)
    } else {
        cleaned
    }
}

pub fn normalize_headers(raw: &[String]) -> Vec<NormalizedColumn> {
    let mut existing_names: HashSet<String> = HashSet::with_capacity(raw.len());

    raw.iter()
        .enumerate()
        .map(|(idx, label)| {
            let ordinal = idx + 1;
            let base = clean_label(label, ordinal);

            let mut clean_name = base.clone();
            let mut suffix = 2;
            while existing_names.contains(&clean_name) {
                clean_name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            existing_names.insert(clean_name.clone());

            if clean_name != base {
                tracing::debug!("Column '{}' renamed to '{}' to stay unique", label, clean_name);
            }

            NormalizedColumn {
                original_label: label.clone(),
                clean_name,
                ordinal_position: ordinal,
            }
        })
        .collect()
}

/// Default table name for an input file: its cleaned stem.
pub fn table_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned = collapse_label(&stem);
    if cleaned.is_empty() {
        DEFAULT_TABLE_NAME.to_string()
    } else if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("t_{}", cleaned)
    } else {
        cleaned
    }
}
