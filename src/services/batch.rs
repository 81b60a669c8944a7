use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};

use crate::config::Config;
use crate::error::AppError;
use crate::models::{BatchEntry, BatchReport, EntryOutcome};
use crate::services::converter::{convert_file, resolve_entry};

/// A list of conversions, written either as a bare JSON array or as
/// `{"entries": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchManifest {
    Entries(Vec<BatchEntry>),
    Wrapped { entries: Vec<BatchEntry> },
}

impl BatchManifest {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn into_entries(self) -> Vec<BatchEntry> {
        match self {
            BatchManifest::Entries(entries) => entries,
            BatchManifest::Wrapped { entries } => entries,
        }
    }
}

/// Runs every entry in order. A failing entry is logged and recorded; the
/// entries after it still run.
pub fn run_batch(entries: &[BatchEntry], config: &Config) -> BatchReport {
    let start = std::time::Instant::now();
    info!("Starting batch of {} conversion(s)", entries.len());

    let outcomes: Vec<EntryOutcome> = entries
        .iter()
        .map(|entry| match convert_file(entry, config) {
            Ok(report) => EntryOutcome::Success(report),
            Err(e) => {
                let resolved = resolve_entry(entry);
                error!(
                    kind = e.kind(),
                    "Conversion of {} into table {} failed: {}",
                    resolved.input_path.display(),
                    resolved.table_name,
                    e
                );
                EntryOutcome::Failure {
                    input_path: resolved.input_path,
                    table_name: Some(resolved.table_name),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        })
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = outcomes.len() - succeeded;

    let names = |success: bool| -> Vec<String> {
        outcomes
            .iter()
            .filter(|o| o.is_success() == success)
            .map(|o| o.input_path().display().to_string())
            .collect()
    };
    info!(
        "Batch finished in {:?}: {} succeeded {:?}, {} failed {:?}",
        start.elapsed(),
        succeeded,
        names(true),
        failed,
        names(false)
    );

    BatchReport {
        entries: outcomes,
        succeeded,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[test]
    fn manifest_accepts_both_layouts_and_camel_case_keys() {
        let bare = BatchManifest::from_json(
            r#"[{"inputPath": "a.csv", "tableName": "a", "indexColumns": ["region"]}]"#,
        )
        .unwrap()
        .into_entries();
        assert_eq!(bare[0].table_name.as_deref(), Some("a"));
        assert_eq!(bare[0].index_columns, Some(vec!["region".to_string()]));
        assert_eq!(bare[0].output_path, None);

        let wrapped = BatchManifest::from_json(
            r#"{"entries": [{"input_path": "b.csv", "output_path": "b.sqlite"}]}"#,
        )
        .unwrap()
        .into_entries();
        assert_eq!(wrapped[0].output_path.as_deref(), Some(Path::new("b.sqlite")));
    }

    #[test]
    fn manifest_without_input_path_is_rejected() {
        assert!(BatchManifest::from_json(r#"[{"table_name": "x"}]"#).is_err());
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let good_input = dir.path().join("good.csv");
        std::fs::write(&good_input, "id,region\n1,north\n2,south\n3,north\n").unwrap();
        let good_output = dir.path().join("good.db");

        let entries = vec![
            BatchEntry {
                input_path: dir.path().join("missing.csv"),
                output_path: Some(dir.path().join("missing.db")),
                table_name: None,
                index_columns: None,
            },
            BatchEntry {
                input_path: good_input,
                output_path: Some(good_output.clone()),
                table_name: Some("places".to_string()),
                index_columns: None,
            },
        ];

        let report = run_batch(&entries, &Config::default());
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        match &report.entries[0] {
            EntryOutcome::Failure { kind, table_name, .. } => {
                assert_eq!(kind, "input_not_found");
                assert_eq!(table_name.as_deref(), Some("missing"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(report.entries[1].is_success());

        let conn = Connection::open(&good_output).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM places", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 3);
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let report = run_batch(&[BatchEntry::new("/definitely/not/here.csv")], &Config::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["entries"][0]["status"], "failure");
        assert_eq!(json["entries"][0]["kind"], "input_not_found");
    }
}
