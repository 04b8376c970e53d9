//! Durable energy ledger backed by SQLite.
//!
//! One row per completed request (unary, streamed, or cache hit). Rows are
//! only ever appended. Each operation opens its own connection on the
//! blocking pool; the schema is created once, lazily, on first use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::{GatewayError, Result};

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database file. Default: `data/energy.db`.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data").join("energy.db")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Aggregate totals over every recorded request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub requests: u64,
    pub energy_spent: f64,
    pub energy_saved: f64,
}

/// Mean energy per recorded request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LedgerAverages {
    pub spent: f64,
    pub saved: f64,
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyRecord {
    pub id: i64,
    pub spent: f64,
    pub saved: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// SQLite `CURRENT_TIMESTAMP` text (UTC).
    pub created_at: String,
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::Ledger(err.to_string())
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::Ledger(format!("ledger task failed: {err}"))
    }
}

/// Append-only energy ledger.
#[derive(Debug)]
pub struct EnergyLedger {
    path: PathBuf,
    initialized: OnceCell<()>,
}

impl EnergyLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            initialized: OnceCell::new(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the database directory and schema. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || -> Result<()> {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            GatewayError::Ledger(format!(
                                "failed to create ledger directory {parent:?}: {e}"
                            ))
                        })?;
                    }
                    let conn = open_connection(&path)?;
                    init_schema(&conn)?;
                    Ok(())
                })
                .await??;
                info!(path = %self.path.display(), "energy ledger initialized");
                Ok::<_, GatewayError>(())
            })
            .await?;
        Ok(())
    }

    /// Append one record. Negative energies are stored as zero.
    pub async fn record(
        &self,
        spent: f64,
        saved: f64,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Result<()> {
        self.initialize().await?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = open_connection(&path)?;
            conn.execute(
                "INSERT INTO energy_metrics (spent, saved, prompt_tokens, completion_tokens)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    non_negative(spent),
                    non_negative(saved),
                    prompt_tokens,
                    completion_tokens
                ],
            )?;
            Ok(())
        })
        .await?
    }

    /// Request count and energy totals.
    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.initialize().await?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<LedgerSnapshot> {
            let conn = open_connection(&path)?;
            let snapshot = conn.query_row(
                "SELECT COUNT(*), SUM(spent), SUM(saved) FROM energy_metrics",
                [],
                |row| {
                    Ok(LedgerSnapshot {
                        requests: row.get::<_, i64>(0)?.max(0) as u64,
                        energy_spent: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        energy_saved: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    })
                },
            )?;
            Ok(snapshot)
        })
        .await?
    }

    /// Mean spent and saved energy; zeros when the ledger is empty.
    pub async fn average_per_request(&self) -> Result<LedgerAverages> {
        self.initialize().await?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<LedgerAverages> {
            let conn = open_connection(&path)?;
            let averages = conn.query_row(
                "SELECT AVG(spent), AVG(saved) FROM energy_metrics",
                [],
                |row| {
                    Ok(LedgerAverages {
                        spent: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                        saved: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    })
                },
            )?;
            Ok(averages)
        })
        .await?
    }

    /// The newest `limit` records, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<EnergyRecord>> {
        self.initialize().await?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<EnergyRecord>> {
            let conn = open_connection(&path)?;
            let mut stmt = conn.prepare(
                "SELECT id, spent, saved, prompt_tokens, completion_tokens, created_at
                 FROM energy_metrics ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                Ok(EnergyRecord {
                    id: row.get(0)?,
                    spent: row.get(1)?,
                    saved: row.get(2)?,
                    prompt_tokens: row.get(3)?,
                    completion_tokens: row.get(4)?,
                    created_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await?
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.max(0.0) }
}

fn init_schema(conn: &rusqlite::Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS energy_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            spent REAL NOT NULL,
            saved REAL NOT NULL,
            prompt_tokens INTEGER NOT NULL,
            completion_tokens INTEGER NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );",
    )
}

fn open_connection(path: &Path) -> std::result::Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    let _ = conn.busy_timeout(Duration::from_secs(5));
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    Ok(conn)
}
