//! SQLite export layer.
//!
//! RULE: Only the store talks to the database.
//! Stages never execute SQL. The engine never touches the store; the
//! runner hands it a finished `GenerationOutput`.
//!
//! A run is written in one transaction. If any insert fails the whole run
//! rolls back and the database holds no rows for it.

use crate::{
    engine::GenerationOutput,
    error::{SimError, SimResult},
    event::{EventLogEntry, Stage},
};
use rusqlite::{params, Connection};

mod ground_truth;
mod visible;

/// Tables a run writes rows into, for `row_count`.
const RUN_TABLES: &[&str] = &[
    "event_log",
    "customers",
    "accounts",
    "counterparties",
    "transactions",
    "news",
    "signals",
    "alerts",
    "cases",
    "gt_scenarios",
    "gt_scenario_transactions",
    "gt_transaction_labels",
    "gt_account_labels",
    "gt_alert_labels",
    "gt_case_labels",
];

pub struct SimStore {
    conn: Connection,
}

impl SimStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order. Safe to call more than once.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_ground_truth.sql"))?;
        Ok(())
    }

    /// Write a finished run, visible and ground-truth tables together.
    pub fn export(&self, output: &GenerationOutput) -> SimResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO run (run_id, seed, start_date, end_date, as_of, report)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                output.run_id,
                output.seed as i64,
                output.start_date.to_string(),
                output.end_date.to_string(),
                output.as_of.to_string(),
                serde_json::to_string(&output.report)?,
            ],
        )?;
        append_events(&tx, &output.events)?;
        visible::write(&tx, output)?;
        ground_truth::write(&tx, output)?;
        tx.commit()?;
        log::info!(
            "store: exported run={} transactions={} alerts={} cases={}",
            output.run_id,
            output.ledger.len(),
            output.alerts.len(),
            output.cases.len()
        );
        Ok(())
    }

    /// Rows a run wrote into one of its tables.
    pub fn row_count(&self, table: &str, run_id: &str) -> SimResult<i64> {
        if !RUN_TABLES.contains(&table) {
            return Err(SimError::Other(anyhow::anyhow!("unknown table {table}")));
        }
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE run_id=?1");
        Ok(self.conn.query_row(&sql, params![run_id], |r| r.get(0))?)
    }

    pub fn run_exists(&self, run_id: &str) -> SimResult<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM run WHERE run_id=?1",
            params![run_id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    /// Event log of a run, in emission order.
    pub fn events(&self, run_id: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM event_log WHERE run_id=?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![run_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?;
        let mut result = Vec::new();
        for row in rows {
            let (id, run_id, seq, stage, event_type, payload) = row?;
            let stage: Stage = serde_json::from_value(serde_json::Value::String(stage))?;
            result.push(EventLogEntry {
                id: Some(id),
                run_id,
                seq: seq as u64,
                stage,
                event_type,
                payload,
            });
        }
        Ok(result)
    }
}

fn append_events(conn: &Connection, events: &[EventLogEntry]) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO event_log (run_id, seq, stage, event_type, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for entry in events {
        stmt.execute(params![
            entry.run_id,
            entry.seq as i64,
            entry.stage.as_str(),
            entry.event_type,
            entry.payload,
        ])?;
    }
    Ok(())
}

/// JSON text for list and map columns.
fn json<T: serde::Serialize + ?Sized>(value: &T) -> SimResult<String> {
    Ok(serde_json::to_string(value)?)
}
