//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods; it never executes SQL directly.
//!
//! Decimals are stored as TEXT so values round-trip exactly.

use crate::{error::ReconResult, event::EventLogEntry};
mod invoice;
mod reconciliation;
mod records;
pub use invoice::StoreBilling;
use rusqlite::{params, types::Type, Connection, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

pub struct ReconStore {
    conn: Connection,
}

impl ReconStore {
    pub fn open(path: &str) -> ReconResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ReconResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> ReconResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_reconciliation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_source_records.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_invoice_request.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────
    // Entries are written with the transition they record (store/reconciliation.rs).

    pub fn events_for_reconciliation(
        &self,
        reconciliation_id: &str,
    ) -> ReconResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, reconciliation_id, event_type, payload, created_at
             FROM event_log WHERE reconciliation_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![reconciliation_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    reconciliation_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn insert_events(conn: &Connection, entries: &[EventLogEntry]) -> ReconResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO event_log (reconciliation_id, event_type, payload, created_at)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for entry in entries {
        stmt.execute(params![
            entry.reconciliation_id,
            entry.event_type,
            entry.payload,
            entry.created_at,
        ])?;
    }
    Ok(())
}

// ── Decimal columns ────────────────────────────────────────────

fn dec_text(value: Decimal) -> String {
    value.to_string()
}

fn opt_dec_text(value: Option<Decimal>) -> Option<String> {
    value.map(dec_text)
}

fn dec_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    parse_dec(idx, &text)
}

fn opt_dec_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_dec(idx, &t)).transpose()
}

fn parse_dec(idx: usize, text: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
