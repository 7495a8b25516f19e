//! Pipeline event log.
//!
//! RULE: Every stage transition and every non-fatal decision the generator
//! makes is recorded here, in the order it happened. Events are kept in
//! memory by the engine and written out by the store with the rest of the
//! run.
//!
//! Events never carry ground-truth labels for individual visible records
//! beyond scenario identity, which is itself ground truth and lands in the
//! same export transaction as the gt_* tables.

use crate::types::{Day, RunId, Typology};
use serde::{Deserialize, Serialize};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Engine,
    Population,
    Baseline,
    Typology,
    Ledger,
    News,
    Graph,
    Signal,
    Alert,
    Case,
    Report,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Engine => "engine",
            Self::Population => "population",
            Self::Baseline => "baseline",
            Self::Typology => "typology",
            Self::Ledger => "ledger",
            Self::News => "news",
            Self::Graph => "graph",
            Self::Signal => "signal",
            Self::Alert => "alert",
            Self::Case => "case",
            Self::Report => "report",
        }
    }
}

/// Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunInitialized {
        run_id: RunId,
        seed: u64,
        start: Day,
        end: Day,
        as_of: Day,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        records: usize,
    },
    PopulationGenerated {
        customers: usize,
        accounts: usize,
        counterparties: usize,
    },
    ScenarioInjected {
        scenario_id: String,
        typology: Typology,
        transactions: usize,
    },
    EligibilityShortfall {
        context: String,
        requested: usize,
        available: usize,
    },
    CalibrationApplied {
        promoted: usize,
        fillers: usize,
        demoted: usize,
        retiered: usize,
    },
    CasesSimulated {
        opened: usize,
        still_open: usize,
    },
    RunCompleted {
        alerts: usize,
        cases: usize,
        warnings: bool,
    },
}

impl PipelineEvent {
    /// Stable name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. } => "run_initialized",
            Self::StageStarted { .. } => "stage_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::PopulationGenerated { .. } => "population_generated",
            Self::ScenarioInjected { .. } => "scenario_injected",
            Self::EligibilityShortfall { .. } => "eligibility_shortfall",
            Self::CalibrationApplied { .. } => "calibration_applied",
            Self::CasesSimulated { .. } => "cases_simulated",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

/// A persisted event log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub seq: u64,
    pub stage: Stage,
    pub event_type: String,
    pub payload: String, // JSON-serialized PipelineEvent
}

/// Ordered, append-only event recorder for one run.
#[derive(Debug, Clone)]
pub struct EventLog {
    run_id: RunId,
    entries: Vec<EventLogEntry>,
}

impl EventLog {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, event: &PipelineEvent) -> serde_json::Result<()> {
        let entry = EventLogEntry {
            id: None,
            run_id: self.run_id.clone(),
            seq: self.entries.len() as u64,
            stage,
            event_type: event.event_type().to_string(),
            payload: serde_json::to_string(event)?,
        };
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[EventLogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<EventLogEntry> {
        self.entries
    }
}
