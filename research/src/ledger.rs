//! Per-run record of every source the orchestrator dispatched.
//!
//! A record is inserted as `Pending` when its fetch is dispatched and
//! settled exactly once. After [`EvidenceLedger::seal`] the ledger is
//! read-only; the synthesis and validation phases only ever see a sealed
//! ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    PrimarySite,
    Social,
    KnowledgeBase,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SourceKind::PrimarySite => "website",
            SourceKind::Social => "social",
            SourceKind::KnowledgeBase => "knowledge base",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Success,
    Failed,
    TimedOut,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub raw_content: String,
    pub fetched_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl SourceRecord {
    pub fn is_success(&self) -> bool {
        self.status == SourceStatus::Success
    }
}

/// How a dispatched fetch ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Settlement {
    Success(String),
    Failed(String),
    TimedOut(String),
}

#[derive(Debug, Default)]
pub struct EvidenceLedger {
    records: Vec<SourceRecord>,
    index: HashMap<String, usize>,
    sealed: bool,
}

impl EvidenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pending placeholder. Returns false if the id is already
    /// present or the ledger is sealed.
    pub fn dispatch(&mut self, source_id: &str, kind: SourceKind) -> bool {
        if self.sealed || self.index.contains_key(source_id) {
            return false;
        }

        self.index.insert(source_id.to_string(), self.records.len());
        self.records.push(SourceRecord {
            source_id: source_id.to_string(),
            kind,
            status: SourceStatus::Pending,
            raw_content: String::new(),
            fetched_at: Utc::now(),
            error: None,
        });
        true
    }

    /// Settles a pending record. Returns false when the record is unknown,
    /// already settled, or the ledger is sealed.
    pub fn settle(&mut self, source_id: &str, settlement: Settlement) -> bool {
        if self.sealed {
            return false;
        }
        let Some(record) = self.index.get(source_id).map(|&i| &mut self.records[i]) else {
            return false;
        };
        if record.status != SourceStatus::Pending {
            return false;
        }

        record.fetched_at = Utc::now();
        match settlement {
            Settlement::Success(content) => {
                record.status = SourceStatus::Success;
                record.raw_content = content;
            }
            Settlement::Failed(error) => {
                record.status = SourceStatus::Failed;
                record.error = Some(error);
            }
            Settlement::TimedOut(error) => {
                record.status = SourceStatus::TimedOut;
                record.error = Some(error);
            }
        }
        true
    }

    /// Freezes the ledger. Called once the fetch phase has resolved.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceRecord> {
        self.index.get(source_id).map(|&i| &self.records[i])
    }

    /// Records in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceRecord> {
        self.records.iter()
    }

    pub fn successful(&self) -> impl Iterator<Item = &SourceRecord> {
        self.records.iter().filter(|r| r.is_success())
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.status == SourceStatus::Pending)
            .map(|r| r.source_id.clone())
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.successful().count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
