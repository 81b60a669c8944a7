use csv::{ReaderBuilder, StringRecord};
use rusqlite::types::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ConversionError;
use crate::models::{
    BatchEntry, ColumnReport, ColumnTypeProfile, ConversionReport, IndexPlan, IndexSource, TargetTable,
    SAMPLE_SIZE,
};
use crate::services::db_loader::{is_reserved_table_name, DbLoader};
use crate::services::encoding::decode_with_candidates;
use crate::services::header::{normalize_headers, table_name_from_path};
use crate::services::index_advisor::suggest_index_columns;
use crate::services::type_inference::{profile_columns, to_sql_value};

/// Where an entry reads from and writes to, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub table_name: String,
}

pub fn resolve_entry(entry: &BatchEntry) -> ResolvedEntry {
    let output_path = entry
        .output_path
        .clone()
        .unwrap_or_else(|| entry.input_path.with_extension("db"));
    let table_name = entry
        .table_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| table_name_from_path(&entry.input_path));

    ResolvedEntry {
        input_path: entry.input_path.clone(),
        output_path,
        table_name,
    }
}

fn record_error(path: &Path, err: csv::Error) -> ConversionError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    ConversionError::MalformedRecord {
        path: path.to_path_buf(),
        line,
        message: err.to_string(),
    }
}

fn record_values(record: &StringRecord, profiles: &[ColumnTypeProfile]) -> Vec<Value> {
    profiles
        .iter()
        .enumerate()
        .map(|(idx, profile)| to_sql_value(record.get(idx).unwrap_or(""), profile))
        .collect()
}

/// Converts one CSV file into a table, replacing any table of the same name.
pub fn convert_file(entry: &BatchEntry, config: &Config) -> Result<ConversionReport, ConversionError> {
    let start = Instant::now();
    let ResolvedEntry {
        input_path,
        output_path,
        table_name,
    } = resolve_entry(entry);
    info!(
        "Converting {} into table {} of {}",
        input_path.display(),
        table_name,
        output_path.display()
    );

    if !input_path.is_file() {
        return Err(ConversionError::InputNotFound { path: input_path });
    }
    if fs::canonicalize(&output_path).ok() == fs::canonicalize(&input_path).ok() {
        return Err(ConversionError::write(
            &output_path,
            "output path is the input file, which is never modified",
        ));
    }

    if is_reserved_table_name(&table_name) {
        return Err(ConversionError::write(
            &output_path,
            format!("table name '{}' is reserved for staging", table_name),
        ));
    }

    // Decode with the first encoding that fits
    let bytes = fs::read(&input_path).map_err(|e| {
        warn!("Failed to read {}: {}", input_path.display(), e);
        ConversionError::InputNotFound {
            path: input_path.clone(),
        }
    })?;
    let decoded = decode_with_candidates(&bytes, &config.encodings).map_err(|e| {
        ConversionError::EncodingExhausted {
            path: input_path.clone(),
            tried: e.tried,
        }
    })?;
    drop(bytes);
    info!("Read {} as {}", input_path.display(), decoded.encoding.name());

    let mut reader = ReaderBuilder::new()
        .delimiter(config.delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(decoded.text.as_bytes());

    let raw_header: Vec<String> = reader
        .headers()
        .map_err(|e| record_error(&input_path, e))?
        .iter()
        .map(str::to_string)
        .collect();
    if raw_header.iter().all(|label| label.trim().is_empty()) {
        return Err(ConversionError::EmptyHeader { path: input_path });
    }
    let columns = normalize_headers(&raw_header);
    let column_count = columns.len();
    debug!("Normalized {} columns: {:?}", column_count, columns.iter().map(|c| &c.clean_name).collect::<Vec<_>>());

    // Manual index columns must name normalized columns before anything is written
    if let Some(requested) = &entry.index_columns {
        if let Some(missing) = requested
            .iter()
            .find(|name| !columns.iter().any(|c| &c.clean_name == *name))
        {
            return Err(ConversionError::InvalidIndexColumn {
                column: missing.clone(),
            });
        }
    }

    let mut records = reader.records();
    let sample: Vec<StringRecord> = records
        .by_ref()
        .take(config.type_sample_rows)
        .collect::<Result<_, _>>()
        .map_err(|e| record_error(&input_path, e))?;
    let profiles = profile_columns(&columns, &sample);

    let mut loader = DbLoader::open(&output_path)?;
    let staging = loader.create_staging_table(&table_name, &profiles)?;

    info!("Starting row insertion in batches of {}", config.batch_size);
    let mut batch: Vec<Vec<Value>> = Vec::with_capacity(config.batch_size.min(1024));
    let mut inserted = 0usize;
    let mut ragged_rows = 0usize;

    for result in sample.into_iter().map(Ok).chain(records) {
        let record = result.map_err(|e| record_error(&input_path, e))?;
        if record.len() != column_count {
            ragged_rows += 1;
            if ragged_rows == 1 {
                warn!(
                    "Record at line {} has {} fields, header has {}; missing fields become NULL and extra fields are dropped",
                    record.position().map(|p| p.line()).unwrap_or(0),
                    record.len(),
                    column_count
                );
            }
        }

        batch.push(record_values(&record, &profiles));
        if batch.len() >= config.batch_size {
            inserted += loader.insert_batch(&staging, column_count, &batch)?;
            batch.clear();
            debug!("Inserted {} rows so far", inserted);
        }
    }
    inserted += loader.insert_batch(&staging, column_count, &batch)?;
    if ragged_rows > 0 {
        warn!("{} records did not match the header width", ragged_rows);
    }

    let row_count = loader.row_count(&staging)?;
    debug!("Staged {} rows ({} inserted)", row_count, inserted);

    let indexes = match &entry.index_columns {
        Some(requested) => {
            let mut columns: Vec<String> = Vec::with_capacity(requested.len());
            for name in requested {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
            IndexPlan {
                columns,
                source: IndexSource::Manual,
            }
        }
        None => {
            let names: Vec<String> = columns.iter().map(|c| c.clean_name.clone()).collect();
            let stats = loader.distinct_counts(&staging, &names)?;
            IndexPlan {
                columns: suggest_index_columns(&stats, row_count, &config.advisor),
                source: IndexSource::Advised,
            }
        }
    };
    if indexes.columns.is_empty() {
        info!("No indexes selected for {}", table_name);
    }

    let created = loader.replace_table(&staging, &table_name, &indexes.columns)?;
    let sample_rows = loader.sample_rows(&table_name, SAMPLE_SIZE)?;
    debug!("Final schema: {:?}", loader.get_table_schema(&table_name)?);

    let table = TargetTable {
        name: table_name,
        columns: profiles,
        row_count,
        indexes: IndexPlan {
            columns: created,
            source: indexes.source,
        },
    };

    info!(
        "Wrote {} rows into {} in {:?}",
        table.row_count,
        table.name,
        start.elapsed()
    );

    Ok(ConversionReport {
        input_path,
        output_path,
        table_name: table.name,
        encoding: decoded.encoding.name().to_string(),
        row_count: table.row_count,
        columns: table
            .columns
            .into_iter()
            .map(|p| ColumnReport {
                name: p.column.clean_name,
                original_label: p.column.original_label,
                position: p.column.ordinal_position,
                inferred_type: p.inferred_type,
                sample_values: p.sample_values.into_vec(),
                null_count_in_sample: p.null_count,
            })
            .collect(),
        indexes: table.indexes.columns,
        index_source: table.indexes.source,
        sample_rows,
        elapsed_ms: start.elapsed().as_millis(),
    })
}
