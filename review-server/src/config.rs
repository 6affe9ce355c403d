use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use review_core::snowflake::MAX_NODE;

/// File name of the SQLite database inside `state_dir`.
pub const DATABASE_FILE: &str = "reviews.db";

#[derive(Debug, Clone)]
pub struct Config {
    /// Node number of this process's identifier generator. Must be unique
    /// among all running instances.
    pub node_id: i64,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub elasticsearch_url: String,
    pub elasticsearch_index: String,
    /// Upper bound on handling one request, storage and search calls included.
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_id = lookup("SNOWFLAKE_NODE_ID")
            .context("SNOWFLAKE_NODE_ID environment variable is required")?
            .trim()
            .parse::<i64>()
            .context("SNOWFLAKE_NODE_ID must be a valid number")?;
        if !(0..=MAX_NODE).contains(&node_id) {
            bail!(
                "SNOWFLAKE_NODE_ID must be between 0 and {}, got {}",
                MAX_NODE,
                node_id
            );
        }

        let port = lookup("PORT")
            .unwrap_or_else(|| "8000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let elasticsearch_url = parse_non_empty(lookup("ELASTICSEARCH_URL"))
            .unwrap_or_else(|| "http://127.0.0.1:9200".to_string());

        let elasticsearch_index =
            parse_non_empty(lookup("ELASTICSEARCH_INDEX")).unwrap_or_else(|| "review".to_string());

        let timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "10".to_string())
            .parse::<u64>()
            .context("REQUEST_TIMEOUT_SECS must be a valid number")?;
        if timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Config {
            node_id,
            port,
            state_dir,
            elasticsearch_url,
            elasticsearch_index,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}

/// Treat missing, empty and whitespace-only values alike.
fn parse_non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
