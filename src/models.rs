use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::path::PathBuf;

pub const SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedColumn {
    pub original_label: String,
    pub clean_name: String,
    pub ordinal_position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

/// Reformatting applied to values of a text column whose sample is made
/// entirely of dates in one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFormat {
    pub pattern: &'static str,
    pub has_time: bool,
}

#[derive(Debug, Clone)]
pub struct ColumnTypeProfile {
    pub column: NormalizedColumn,
    pub inferred_type: ColumnType,
    pub temporal: Option<TemporalFormat>,
    pub sample_values: SmallVec<[String; SAMPLE_SIZE]>,
    pub null_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSource {
    Manual,
    Advised,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPlan {
    pub columns: Vec<String>,
    pub source: IndexSource,
}

#[derive(Debug, Clone)]
pub struct TargetTable {
    pub name: String,
    pub columns: Vec<ColumnTypeProfile>,
    pub row_count: usize,
    pub indexes: IndexPlan,
}

/// One conversion request, as listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    #[serde(alias = "inputPath")]
    pub input_path: PathBuf,
    #[serde(default, alias = "outputPath")]
    pub output_path: Option<PathBuf>,
    #[serde(default, alias = "tableName")]
    pub table_name: Option<String>,
    #[serde(default, alias = "indexColumns")]
    pub index_columns: Option<Vec<String>>,
}

impl BatchEntry {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: None,
            table_name: None,
            index_columns: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    pub name: String,
    pub original_label: String,
    pub position: usize,
    pub inferred_type: ColumnType,
    pub sample_values: Vec<String>,
    pub null_count_in_sample: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub table_name: String,
    pub encoding: String,
    pub row_count: usize,
    pub columns: Vec<ColumnReport>,
    pub indexes: Vec<String>,
    pub index_source: IndexSource,
    pub sample_rows: Vec<Vec<String>>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryOutcome {
    Success(ConversionReport),
    Failure {
        input_path: PathBuf,
        table_name: Option<String>,
        kind: String,
        message: String,
    },
}

impl EntryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EntryOutcome::Success(_))
    }

    pub fn input_path(&self) -> &PathBuf {
        match self {
            EntryOutcome::Success(report) => &report.input_path,
            EntryOutcome::Failure { input_path, .. } => input_path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub entries: Vec<EntryOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}
