// ABOUTME: Core data types shared across the reconciliation engine
// ABOUTME: Row, PK tuples, fingerprints, diff sets, checkpoints and audit records

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A single row fetched from either side, paired with the column names it was
/// fetched under. The two vectors are always the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Option<String>>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Project this row onto the primary-key columns, in declared order.
    ///
    /// Every entry in `pk_columns` must be present in `self.columns`; callers
    /// are expected to have validated this via [`pk_indices`] up front.
    pub fn pk_tuple(&self, pk_indices: &[usize]) -> PkTuple {
        PkTuple(pk_indices.iter().map(|&i| self.values[i].clone()).collect())
    }
}

/// Ordered tuple of primary-key column values identifying a row within its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkTuple(pub Vec<Option<String>>);

impl PkTuple {
    /// Render as the comma-joined textual values a `WHERE pk = ...` clause would bind,
    /// used for logging and for the sample-PK debug traces in the orchestrator.
    pub fn display(&self) -> String {
        self.0
            .iter()
            .map(|v| v.as_deref().unwrap_or("NULL"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for PkTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.display())
    }
}

/// SHA-256 hex digest over a row's canonical, exclusion-filtered serialization.
pub type Fingerprint = String;

/// Resolve the indices of `pk_columns` within `col_names`.
///
/// Returns an error listing the first missing column if any primary-key column
/// is absent.
pub fn pk_indices(col_names: &[String], pk_columns: &[String]) -> Result<Vec<usize>, String> {
    pk_columns
        .iter()
        .map(|pk| {
            col_names
                .iter()
                .position(|c| c == pk)
                .ok_or_else(|| pk.clone())
        })
        .collect()
}

/// Mapping from PK tuple to fingerprint, unique within one side of one batch.
pub type FingerprintMap = HashMap<PkTuple, Fingerprint>;

/// The three disjoint PK sets produced by a comparison.
#[derive(Debug, Clone, Default)]
pub struct DiffSets {
    pub mismatch: HashSet<PkTuple>,
    pub missing_in_target: HashSet<PkTuple>,
    pub missing_in_source: HashSet<PkTuple>,
}

impl DiffSets {
    pub fn merge(&mut self, other: DiffSets) {
        self.mismatch.extend(other.mismatch);
        self.missing_in_target.extend(other.missing_in_target);
        self.missing_in_source.extend(other.missing_in_source);
    }

    pub fn is_empty(&self) -> bool {
        self.mismatch.is_empty() && self.missing_in_target.is_empty() && self.missing_in_source.is_empty()
    }
}

/// Result of a single worker's batch protocol run.
pub struct BatchResult {
    pub batch_id: u64,
    pub offset: i64,
    pub processed_rows: u64,
    pub diff: DiffSets,
}

/// Status of a batch checkpoint, persisted to the metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointStatus {
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ERROR")]
    Error,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Completed => "COMPLETED",
            CheckpointStatus::Error => "ERROR",
        }
    }
}

/// Persistent record keyed by `(job_id, schema, table, batch_id)`.
#[derive(Debug, Clone)]
pub struct BatchCheckpoint {
    pub job_id: uuid::Uuid,
    pub schema: String,
    pub table: String,
    pub batch_id: u64,
    pub last_offset: i64,
    pub processed_rows: u64,
    pub total_rows: i64,
    pub status: CheckpointStatus,
    pub error_message: Option<String>,
    pub last_processed_time: chrono::DateTime<chrono::Utc>,
}

/// Append-only record keyed by `(job_id, event_time)`.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub job_id: uuid::Uuid,
    pub event_time: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub schema: String,
    pub table: String,
    pub batch_id: Option<u64>,
    pub row_counts: Option<u64>,
    pub mismatch_count: Option<u64>,
    pub status: String,
    pub error_message: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    Batch,
    Error,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Batch => "BATCH",
            AuditEventType::Error => "ERROR",
        }
    }
}

/// Per-table summary emitted to the comparison report CSV.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub job_id: String,
    pub table_name: String,
    pub schema: String,
    pub row_counts: i64,
    pub mismatch_count: usize,
    pub missing_in_source: usize,
    pub missing_in_target: usize,
    pub status: String,
    pub start_time: String,
    pub end_time: String,
    pub source_sql_file: String,
    pub target_sql_file: String,
    pub no_op_update_count: usize,
    pub error_batch_count: usize,
}
