// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Journal — append-only SQLite persistence for the audit chain and the
// config snapshot history.
//
// Schema:
//   chain_log(
//     id              INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
//     sequence        INTEGER NOT NULL,
//     timestamp       TEXT    NOT NULL,   -- RFC 3339
//     actor           TEXT    NOT NULL,
//     action          TEXT    NOT NULL,
//     payload_digest  TEXT    NOT NULL,   -- SHA-256 hex
//     previous_digest TEXT    NOT NULL,   -- SHA-256 hex
//     digest          TEXT    NOT NULL    -- SHA-256 hex
//   )
//   config_snapshots(
//     id        INTEGER PRIMARY KEY AUTOINCREMENT,   -- last row is current
//     version   INTEGER NOT NULL,
//     settings  TEXT    NOT NULL,   -- JSON, as serialized at write time
//     signature TEXT    NOT NULL    -- JSON SnapshotSignature
//   )
//
// Rows are read back verbatim.  Nothing is recomputed at load time; the
// stores re-derive digests and re-check signatures when asked.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, instrument, warn};
use trustlab_core::error::{Result, TrustlabError};
use trustlab_core::types::{ConfigSnapshot, LogEntry, Setting, Settings, SnapshotSignature};

/// Convert a `rusqlite::Error` into a `TrustlabError::Database`.
fn db_err(e: rusqlite::Error) -> TrustlabError {
    TrustlabError::Database(e.to_string())
}

/// Render any stored SQLite value as text.
fn stored_text(value: SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(n) => n.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s,
        SqlValue::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

/// Decode a stored sequence number.  Anything that is not a non-negative
/// integer maps to `u64::MAX`, which never matches an entry's position.
fn stored_sequence(value: SqlValue) -> u64 {
    match value {
        SqlValue::Integer(n) => u64::try_from(n).unwrap_or(u64::MAX),
        other => stored_text(other).parse().unwrap_or(u64::MAX),
    }
}

/// Decode a stored settings column.  Any name or value the schema does not
/// accept is reported; the settings that did decode are still returned.
fn stored_settings(text: &str) -> (Settings, Option<String>) {
    let map = match serde_json::from_str(text) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => return (Settings::new(), Some("settings column is not an object".into())),
        Err(e) => return (Settings::new(), Some(format!("settings column: {e}"))),
    };

    let mut settings = Settings::new();
    let mut problem = None;
    for (name, raw) in &map {
        let decoded = Setting::from_name(name)
            .ok_or_else(|| format!("unknown setting {name:?}"))
            .and_then(|setting| {
                setting
                    .parse_value(raw)
                    .map(|value| (setting, value))
                    .map_err(|e| e.to_string())
            });
        match decoded {
            Ok((setting, value)) => {
                settings.insert(setting, value);
            }
            Err(detail) => {
                problem.get_or_insert(detail);
            }
        }
    }
    (settings, problem)
}

/// Rebuild a snapshot from its stored columns.  A column that does not
/// decode turns the signature into [`SnapshotSignature::Unreadable`].
fn decode_snapshot(version: SqlValue, settings: &str, signature: &str) -> ConfigSnapshot {
    let version = match version {
        SqlValue::Integer(n) => u64::try_from(n).ok(),
        other => stored_text(other).parse().ok(),
    };
    let (settings, settings_problem) = stored_settings(settings);

    let problem = match (version, settings_problem) {
        (None, _) => Some("version column is not a non-negative integer".to_owned()),
        (Some(_), problem) => problem,
    };
    let signature = match (problem, serde_json::from_str::<SnapshotSignature>(signature)) {
        (None, Ok(signature)) => signature,
        (None, Err(e)) => SnapshotSignature::Unreadable {
            detail: format!("signature column: {e}"),
        },
        (Some(detail), _) => SnapshotSignature::Unreadable { detail },
    };
    if let SnapshotSignature::Unreadable { detail } = &signature {
        warn!(%detail, "stored config snapshot could not be decoded");
    }

    ConfigSnapshot {
        version: version.unwrap_or(0),
        settings,
        signature,
    }
}

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS chain_log (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        sequence        INTEGER NOT NULL,
        timestamp       TEXT    NOT NULL,
        actor           TEXT    NOT NULL,
        action          TEXT    NOT NULL,
        payload_digest  TEXT    NOT NULL,
        previous_digest TEXT    NOT NULL,
        digest          TEXT    NOT NULL
    );
    CREATE TABLE IF NOT EXISTS config_snapshots (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        version   INTEGER NOT NULL,
        settings  TEXT    NOT NULL,
        signature TEXT    NOT NULL
    );
"#;

/// SQLite-backed journal shared by the chained log and the config store.
///
/// `rusqlite::Connection` is `Send` but not `Sync`; owners wrap the journal
/// in a `Mutex` and only touch it inside their own critical section.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    /// Open (or create) the journal database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;

        // WAL keeps readers off the writer's back.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(db_err)?;

        debug!("journal opened");
        Ok(Self { conn })
    }

    /// Open an in-memory journal (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(db_err)?;

        debug!("in-memory journal opened");
        Ok(Self { conn })
    }

    // -- Audit chain ---------------------------------------------------------

    pub fn append_entry(&self, entry: &LogEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO chain_log (sequence, timestamp, actor, action, payload_digest,
                 previous_digest, digest)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.sequence as i64,
                    entry.timestamp,
                    entry.actor,
                    entry.action,
                    entry.payload_digest,
                    entry.previous_digest,
                    entry.digest,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// All entries in insertion order.
    ///
    /// Columns are read as raw SQLite values and rendered to text, so a row
    /// edited behind the journal's back still loads and shows up as a chain
    /// break instead of failing the whole load.
    pub fn load_entries(&self) -> Result<Vec<LogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT sequence, timestamp, actor, action, payload_digest, previous_digest, digest
                 FROM chain_log
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(LogEntry {
                    sequence: stored_sequence(row.get(0)?),
                    timestamp: stored_text(row.get(1)?),
                    actor: stored_text(row.get(2)?),
                    action: stored_text(row.get(3)?),
                    payload_digest: stored_text(row.get(4)?),
                    previous_digest: stored_text(row.get(5)?),
                    digest: stored_text(row.get(6)?),
                })
            })
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    // -- Config snapshots ----------------------------------------------------

    pub fn append_snapshot(&self, snapshot: &ConfigSnapshot) -> Result<()> {
        let settings_json = serde_json::to_string(&snapshot.settings)?;
        let signature_json = serde_json::to_string(&snapshot.signature)?;

        self.conn
            .execute(
                "INSERT INTO config_snapshots (version, settings, signature)
                 VALUES (?1, ?2, ?3)",
                params![snapshot.version as i64, settings_json, signature_json],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// The most recently written snapshot, if any.
    ///
    /// Decoding is lenient: unknown or wrongly typed settings are dropped and
    /// an undecodable signature or version becomes
    /// [`SnapshotSignature::Unreadable`].  Either way the snapshot no longer
    /// matches what was signed and reads back as not authentic.
    pub fn latest_snapshot(&self) -> Result<Option<ConfigSnapshot>> {
        let row: Option<(SqlValue, SqlValue, SqlValue)> = self
            .conn
            .query_row(
                "SELECT version, settings, signature
                 FROM config_snapshots
                 ORDER BY id DESC
                 LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err)?;

        Ok(row.map(|(version, settings, signature)| {
            decode_snapshot(version, &stored_text(settings), &stored_text(signature))
        }))
    }

    /// Number of snapshots ever written.
    pub fn snapshot_count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM config_snapshots", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(db_err)
    }
}
