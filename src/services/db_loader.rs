use rusqlite::{params_from_iter, types::Value, types::ValueRef, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::ConversionError;
use crate::models::ColumnTypeProfile;
use crate::services::index_advisor::ColumnStats;

const STAGING_SUFFIX: &str = "__staging";

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn staging_table_name(table_name: &str) -> String {
    format!("{}{}", table_name, STAGING_SUFFIX)
}

/// Names ending in the staging suffix belong to the loader, not to users.
pub fn is_reserved_table_name(table_name: &str) -> bool {
    table_name.ends_with(STAGING_SUFFIX)
}

/// The table name's length is embedded so that `a`/`b_c` and `a_b`/`c`
/// get different index names.
pub fn index_name(table_name: &str, column: &str) -> String {
    format!("idx_{}_{}_{}", table_name.chars().count(), table_name, column)
}

/// Writes one converted table into a SQLite file.
pub struct DbLoader {
    conn: Connection,
    path: PathBuf,
}

impl DbLoader {
    pub fn open(path: &Path) -> Result<Self, ConversionError> {
        info!("Opening output database {}", path.display());
        let conn = Connection::open(path).map_err(|e| {
            error!("Failed to open database {}: {}", path.display(), e);
            ConversionError::write(path, e)
        })?;

        let mode: String = conn
            .pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| row.get(0))
            .map_err(|e| ConversionError::write(path, e))?;
        debug!("Database locking mode: {}", mode);

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    fn db_err(&self, context: &'static str) -> impl Fn(rusqlite::Error) -> ConversionError + '_ {
        write_err(&self.path, context)
    }

    pub fn create_staging_table(
        &self,
        table_name: &str,
        profiles: &[ColumnTypeProfile],
    ) -> Result<String, ConversionError> {
        let staging = staging_table_name(table_name);

        let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(&staging));
        self.conn
            .execute(&drop_sql, [])
            .map_err(self.db_err("Failed to drop leftover staging table"))?;

        let create_table_sql = generate_create_table_sql(&staging, profiles);
        debug!("Create table SQL: {}", create_table_sql);
        self.conn
            .execute(&create_table_sql, [])
            .map_err(self.db_err("Failed to create staging table"))?;

        Ok(staging)
    }

    /// Inserts `rows` in a single transaction. Every row must hold exactly
    /// `column_count` values.
    pub fn insert_batch(
        &mut self,
        table_name: &str,
        column_count: usize,
        rows: &[Vec<Value>],
    ) -> Result<usize, ConversionError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let insert_sql = generate_insert_sql(table_name, column_count);
        let path = self.path.clone();
        let to_err = |context| write_err(&path, context);

        let tx = self
            .conn
            .transaction()
            .map_err(to_err("Failed to begin insert transaction"))?;
        {
            let mut stmt = tx
                .prepare_cached(&insert_sql)
                .map_err(to_err("Failed to prepare insert statement"))?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(to_err("Failed to insert row"))?;
            }
        }
        tx.commit().map_err(to_err("Failed to commit insert batch"))?;

        debug!("Committed batch of {} rows into {}", rows.len(), table_name);
        Ok(rows.len())
    }

    pub fn row_count(&self, table_name: &str) -> Result<usize, ConversionError> {
        let verify_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table_name));
        let count: i64 = self
            .conn
            .query_row(&verify_sql, [], |row| row.get(0))
            .map_err(self.db_err("Failed to count rows"))?;
        Ok(count as usize)
    }

    pub fn distinct_counts(
        &self,
        table_name: &str,
        columns: &[String],
    ) -> Result<Vec<ColumnStats>, ConversionError> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let projections: Vec<String> = columns
            .iter()
            .map(|c| format!("COUNT(DISTINCT {})", quote_ident(c)))
            .collect();
        let sql = format!("SELECT {} FROM {}", projections.join(", "), quote_ident(table_name));
        debug!("Cardinality SQL: {}", sql);

        let counts: Vec<i64> = self
            .conn
            .query_row(&sql, [], |row| {
                (0..columns.len()).map(|i| row.get::<_, i64>(i)).collect()
            })
            .map_err(self.db_err("Failed to compute column cardinality"))?;

        Ok(columns
            .iter()
            .zip(counts)
            .map(|(name, count)| ColumnStats {
                name: name.clone(),
                distinct_count: count as usize,
            })
            .collect())
    }

    /// Swaps the staging table in for `table_name` and builds its indexes.
    /// Runs as one transaction, so the previous table survives any failure.
    pub fn replace_table(
        &mut self,
        staging: &str,
        table_name: &str,
        index_columns: &[String],
    ) -> Result<Vec<String>, ConversionError> {
        let path = self.path.clone();
        let to_err = |context| write_err(&path, context);

        let tx = self
            .conn
            .transaction()
            .map_err(to_err("Failed to begin replace transaction"))?;

        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table_name)), [])
            .map_err(to_err("Failed to drop existing table"))?;
        tx.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(staging),
                quote_ident(table_name)
            ),
            [],
        )
        .map_err(to_err("Failed to rename staging table"))?;

        let mut created = Vec::with_capacity(index_columns.len());
        for column in index_columns {
            let sql = format!(
                "CREATE INDEX {} ON {} ({})",
                quote_ident(&index_name(table_name, column)),
                quote_ident(table_name),
                quote_ident(column)
            );
            debug!("Create index SQL: {}", sql);
            tx.execute(&sql, []).map_err(to_err("Failed to create index"))?;
            created.push(column.clone());
        }

        tx.commit().map_err(to_err("Failed to commit table replacement"))?;
        info!("Table {} replaced with {} index(es)", table_name, created.len());
        Ok(created)
    }

    pub fn get_table_schema(&self, table_name: &str) -> Result<Vec<(String, String)>, ConversionError> {
        let pragma_sql = format!("PRAGMA table_info({})", quote_ident(table_name));
        let mut stmt = self
            .conn
            .prepare(&pragma_sql)
            .map_err(self.db_err("Failed to read table info"))?;
        let cols = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?, // column name
                    row.get::<_, String>(2)?, // data type
                ))
            })
            .map_err(self.db_err("Failed to read table info"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(self.db_err("Failed to read table info"))?;
        Ok(cols)
    }

    pub fn sample_rows(&self, table_name: &str, limit: usize) -> Result<Vec<Vec<String>>, ConversionError> {
        let sample_sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table_name), limit);
        let mut stmt = self
            .conn
            .prepare(&sample_sql)
            .map_err(self.db_err("Failed to read sample rows"))?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([]).map_err(self.db_err("Failed to read sample rows"))?;

        let mut samples = Vec::new();
        while let Some(row) = rows.next().map_err(self.db_err("Failed to read sample rows"))? {
            let mut row_data = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = match row.get_ref(i).map_err(self.db_err("Failed to read sample rows"))? {
                    ValueRef::Null => "NULL".to_string(),
                    ValueRef::Integer(i) => i.to_string(),
                    ValueRef::Real(f) => f.to_string(),
                    ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                    ValueRef::Blob(_) => "BLOB".to_string(),
                };
                row_data.push(value);
            }
            samples.push(row_data);
        }
        Ok(samples)
    }
}

fn write_err<'a>(path: &'a Path, context: &'static str) -> impl Fn(rusqlite::Error) -> ConversionError + 'a {
    move |e| {
        error!("{} on {}: {}", context, path.display(), e);
        ConversionError::write(path, e)
    }
}

fn generate_create_table_sql(table_name: &str, profiles: &[ColumnTypeProfile]) -> String {
    let columns: Vec<String> = profiles
        .iter()
        .map(|p| format!("{} {}", quote_ident(&p.column.clean_name), p.inferred_type.sql_type()))
        .collect();

    format!("CREATE TABLE {} ({})", quote_ident(table_name), columns.join(", "))
}

fn generate_insert_sql(table_name: &str, column_count: usize) -> String {
    let placeholders = vec!["?"; column_count].join(", ");
    format!("INSERT INTO {} VALUES ({})", quote_ident(table_name), placeholders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnType, NormalizedColumn};
    use smallvec::SmallVec;
    use tempfile::TempDir;

    fn profile(name: &str, inferred_type: ColumnType) -> ColumnTypeProfile {
        ColumnTypeProfile {
            column: NormalizedColumn {
                original_label: name.to_string(),
                clean_name: name.to_string(),
                ordinal_position: 1,
            },
            inferred_type,
            temporal: None,
            sample_values: SmallVec::new(),
            null_count: 0,
        }
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn staged_table_replaces_previous_one_with_indexes() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("out.db");
        let mut loader = DbLoader::open(&db_path).unwrap();
        let profiles = vec![profile("region", ColumnType::Text), profile("amount", ColumnType::Real)];

        for run in 0..2 {
            let staging = loader.create_staging_table("sales", &profiles).unwrap();
            assert_eq!(staging, "sales__staging");
            let rows = vec![
                vec![Value::Text("east".into()), Value::Real(1.5)],
                vec![Value::Text("west".into()), Value::Null],
                vec![Value::Text("east".into()), Value::Real(run as f64)],
            ];
            assert_eq!(loader.insert_batch(&staging, 2, &rows).unwrap(), 3);
            let created = loader.replace_table(&staging, "sales", &["region".to_string()]).unwrap();
            assert_eq!(created, vec!["region"]);
        }

        assert_eq!(loader.row_count("sales").unwrap(), 3);
        assert_eq!(
            loader.get_table_schema("sales").unwrap(),
            vec![("region".to_string(), "TEXT".to_string()), ("amount".to_string(), "REAL".to_string())]
        );
        let stats = loader.distinct_counts("sales", &["region".into(), "amount".into()]).unwrap();
        assert_eq!(stats[0].distinct_count, 2);
        assert_eq!(stats[1].distinct_count, 2);
        assert_eq!(loader.sample_rows("sales", 2).unwrap()[1], vec!["west", "NULL"]);
    }

    #[test]
    fn failed_index_keeps_the_previous_table() {
        let dir = TempDir::new().unwrap();
        let mut loader = DbLoader::open(&dir.path().join("out.db")).unwrap();
        let profiles = vec![profile("id", ColumnType::Integer)];

        let staging = loader.create_staging_table("t", &profiles).unwrap();
        loader.insert_batch(&staging, 1, &[vec![Value::Integer(1)]]).unwrap();
        loader.replace_table(&staging, "t", &[]).unwrap();

        let staging = loader.create_staging_table("t", &profiles).unwrap();
        loader
            .insert_batch(&staging, 1, &[vec![Value::Integer(2)], vec![Value::Integer(3)]])
            .unwrap();
        let err = loader.replace_table(&staging, "t", &["missing".to_string()]).unwrap_err();
        assert_eq!(err.kind(), "write_failure");
        assert_eq!(loader.row_count("t").unwrap(), 1);
    }

    #[test]
    fn index_names_do_not_collide_across_tables() {
        assert_eq!(index_name("a", "b_c"), "idx_1_a_b_c");
        assert_eq!(index_name("a_b", "c"), "idx_3_a_b_c");
        assert!(is_reserved_table_name("a__staging"));
        assert!(!is_reserved_table_name("a_staging"));
    }

    #[test]
    fn index_name_clash_fails_instead_of_being_skipped() {
        let dir = TempDir::new().unwrap();
        let mut loader = DbLoader::open(&dir.path().join("out.db")).unwrap();
        let profiles = vec![profile("id", ColumnType::Integer)];
        loader
            .conn
            .execute(&format!("CREATE TABLE {} (x)", quote_ident(&index_name("t", "id"))), [])
            .unwrap();

        let staging = loader.create_staging_table("t", &profiles).unwrap();
        loader.insert_batch(&staging, 1, &[vec![Value::Integer(1)]]).unwrap();
        let err = loader.replace_table(&staging, "t", &["id".to_string()]).unwrap_err();
        assert_eq!(err.kind(), "write_failure");
    }

    #[test]
    fn unwritable_location_is_a_write_failure() {
        let dir = TempDir::new().unwrap();
        let err = DbLoader::open(&dir.path().join("missing/dir/out.db")).err().unwrap();
        assert_eq!(err.kind(), "write_failure");
    }
}
