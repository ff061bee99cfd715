use crate::config::EngineSettings;
use crate::error::{Error, Result};
use crate::partition::PartitionUri;
use crate::storage::{EngineError, EngineOutput, ScanEngine};
use crate::utils::quote_literal;
use async_trait::async_trait;
use duckdb::arrow::array::RecordBatch;
use duckdb::{params, Config, Connection};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error message prefixes DuckDB uses when the statement itself is at fault
const REJECTION_PREFIXES: &[&str] = &["Parser Error", "Binder Error", "Catalog Error"];

/// Fragments DuckDB reports when a file could not be read
const SCAN_MARKERS: &[&str] = &[
    "IO Error",
    "HTTP Error",
    "No files found",
    "Could not open",
    "Unable to connect",
    "No magic bytes",
];

/// DuckDB-based scan engine.
///
/// One connection is opened at startup and configured (extensions,
/// settings). Every statement runs on a clone of it, off the async runtime,
/// so a slow remote scan does not hold up other callers.
#[derive(Clone)]
pub struct DuckDbEngine {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbEngine {
    pub fn open(settings: &EngineSettings) -> Result<Self> {
        let mut config = Config::default();
        if let Some(threads) = settings.threads {
            config = config.threads(threads as i64)?;
        }
        let conn = Connection::open_with_flags(&settings.database, config)?;

        for extension in &settings.extensions {
            if !is_identifier(extension) {
                return Err(Error::config(format!("invalid extension name '{extension}'")));
            }
            // Local paths still work without remote filesystem support
            match conn.execute_batch(&format!("INSTALL {extension}; LOAD {extension};")) {
                Ok(()) => debug!(extension = %extension, "Loaded extension"),
                Err(e) => warn!(extension = %extension, error = %e, "Failed to load extension"),
            }
        }

        for (key, value) in &settings.settings {
            if !is_identifier(key) {
                return Err(Error::config(format!("invalid engine setting name '{key}'")));
            }
            if let Err(e) = conn.execute_batch(&format!("SET {key} = {};", quote_literal(value))) {
                warn!(setting = %key, error = %e, "Failed to apply engine setting");
            }
        }

        info!(database = %settings.database, "Opened DuckDB engine");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory engine with no extensions, for local files
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn connection(&self) -> std::result::Result<Connection, EngineError> {
        self.conn
            .lock()
            .try_clone()
            .map_err(|e| EngineError::Internal(format!("Failed to clone connection: {e}")))
    }

    async fn run_blocking(&self, sql: String) -> std::result::Result<EngineOutput, EngineError> {
        let conn = self.connection()?;
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(&sql).map_err(classify)?;
            let arrow = stmt.query_arrow(params![]).map_err(classify)?;
            let schema = arrow.get_schema();
            let batches: Vec<RecordBatch> = arrow.collect();
            Ok(EngineOutput { schema, batches })
        })
        .await
        .map_err(|e| EngineError::Internal(format!("Engine task failed: {e}")))?
    }
}

#[async_trait]
impl ScanEngine for DuckDbEngine {
    async fn query(&self, sql: &str) -> std::result::Result<EngineOutput, EngineError> {
        self.run_blocking(sql.to_owned()).await
    }

    async fn probe(&self, uri: &PartitionUri) -> std::result::Result<(), EngineError> {
        let sql = format!("SELECT * FROM read_parquet({}) LIMIT 0", quote_literal(uri.as_str()));
        match self.run_blocking(sql).await {
            Ok(_) => Ok(()),
            Err(EngineError::Scan(message)) | Err(EngineError::Rejected(message)) => {
                Err(EngineError::Unavailable(message))
            }
            Err(other) => Err(other),
        }
    }
}

/// Sort a DuckDB error into "the files are unreadable" or "the statement is
/// invalid"
fn classify(err: duckdb::Error) -> EngineError {
    let message = err.to_string();
    if REJECTION_PREFIXES.iter().any(|p| message.starts_with(p)) {
        EngineError::Rejected(message)
    } else if SCAN_MARKERS.iter().any(|m| message.contains(m)) {
        EngineError::Scan(message)
    } else {
        EngineError::Rejected(message)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
