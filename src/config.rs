use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::services::encoding::EncodingCandidates;

fn default_type_sample_rows() -> usize {
    1000
}

fn default_batch_size() -> usize {
    5000
}

/// Knobs for the index advisor. The ratio is the largest share of distinct
/// values (relative to row count) a column may have and still be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorConfig {
    pub max_distinct_ratio: f64,
    pub max_indexes: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            max_distinct_ratio: 0.5,
            max_indexes: 5,
        }
    }
}

/// Settings passed explicitly into every conversion.
#[derive(Debug, Clone)]
pub struct Config {
    pub encodings: EncodingCandidates,
    pub type_sample_rows: usize,
    pub batch_size: usize,
    pub delimiter: u8,
    pub advisor: AdvisorConfig,
    pub listen_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encodings: EncodingCandidates::default(),
            type_sample_rows: default_type_sample_rows(),
            batch_size: default_batch_size(),
            delimiter: b',',
            advisor: AdvisorConfig::default(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

pub fn load_config() -> Result<Config> {
    // Load .env file first
    dotenv().ok();

    let mut config = Config::default();

    if let Some(raw) = env_var("CSV2SQLITE_ENCODINGS") {
        let labels: Vec<&str> = raw.split(',').map(str::trim).filter(|l| !l.is_empty()).collect();
        config.encodings = EncodingCandidates::from_labels(&labels)
            .map_err(|e| anyhow::anyhow!("Failed to load CSV2SQLITE_ENCODINGS: {}", e))?;
    }
    if let Some(rows) = parse_var::<usize>("CSV2SQLITE_SAMPLE_ROWS")? {
        config.type_sample_rows = rows.max(1);
    }
    if let Some(size) = parse_var::<usize>("CSV2SQLITE_BATCH_SIZE")? {
        config.batch_size = size.max(1);
    }
    if let Some(raw) = env_var("CSV2SQLITE_DELIMITER") {
        config.delimiter = parse_delimiter(&raw)?;
    }
    if let Some(ratio) = parse_var::<f64>("CSV2SQLITE_MAX_DISTINCT_RATIO")? {
        anyhow::ensure!(
            ratio > 0.0 && ratio <= 1.0,
            "CSV2SQLITE_MAX_DISTINCT_RATIO must be in (0, 1], got {}",
            ratio
        );
        config.advisor.max_distinct_ratio = ratio;
    }
    if let Some(max) = parse_var::<usize>("CSV2SQLITE_MAX_INDEXES")? {
        config.advisor.max_indexes = max;
    }
    if let Some(addr) = parse_var::<SocketAddr>("CSV2SQLITE_ADDR")? {
        config.listen_addr = addr;
    }

    tracing::debug!("Loaded configuration: {:?}", config);
    Ok(config)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("Failed to parse {}", key)))
        .transpose()
}

pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "tab" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => anyhow::bail!("Delimiter must be a single ASCII character, got {:?}", other),
    }
}
