// ABOUTME: CheckpointStore - persists and resumes per-batch progress
// ABOUTME: Grounded on modules/checkpoint_manager.py's upsert semantics, targeting live tokio_postgres upserts

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::model::{BatchCheckpoint, CheckpointStatus};

/// How to pick the resume point from a table's existing checkpoints.
///
/// The original Python scans checkpoints in primary-key order and resumes at
/// the first non-`COMPLETED` batch it finds, which silently treats a
/// checkpoint table with holes (e.g. batch 3 missing because a prior run
/// crashed mid-upsert) the same as a table that simply never got that far.
/// [`ResumeStrategy::NextAfterMaxCompleted`] is the default and matches the
/// common case (resume after the highest contiguous-from-zero completed
/// batch); [`ResumeStrategy::ConservativeHole`] is available for operators
/// who want a hole in the sequence to halt resumption rather than skip past
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeStrategy {
    NextAfterMaxCompleted,
    ConservativeHole,
}

impl Default for ResumeStrategy {
    fn default() -> Self {
        ResumeStrategy::NextAfterMaxCompleted
    }
}

/// Where a table's batch processing should pick back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub next_batch_id: u64,
    pub next_offset: i64,
}

/// Derive the resume point from a table's existing checkpoints, per `strategy`.
///
/// Pure and infallible given a checkpoint list; the caller is responsible for
/// loading that list from the metadata table first.
pub fn resume_point(
    checkpoints: &[BatchCheckpoint],
    strategy: ResumeStrategy,
) -> Option<ResumePoint> {
    if checkpoints.is_empty() {
        return None;
    }

    let mut sorted: Vec<&BatchCheckpoint> = checkpoints.iter().collect();
    sorted.sort_by_key(|c| c.batch_id);

    match strategy {
        ResumeStrategy::NextAfterMaxCompleted => {
            let last_completed = sorted
                .iter()
                .filter(|c| c.status == CheckpointStatus::Completed)
                .max_by_key(|c| c.batch_id)?;
            Some(ResumePoint {
                next_batch_id: last_completed.batch_id + 1,
                next_offset: last_completed.last_offset + last_completed.processed_rows as i64,
            })
        }
        ResumeStrategy::ConservativeHole => {
            let mut expected = 0u64;
            let mut point = None;
            for c in sorted {
                if c.batch_id != expected || c.status != CheckpointStatus::Completed {
                    break;
                }
                point = Some(ResumePoint {
                    next_batch_id: c.batch_id + 1,
                    next_offset: c.last_offset + c.processed_rows as i64,
                });
                expected += 1;
            }
            point
        }
    }
}

/// Persists [`BatchCheckpoint`] rows to `paths.metadata_table` and reloads
/// them to compute a resume point.
pub struct CheckpointStore<'a> {
    client: &'a Client,
    metadata_table: String,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(client: &'a Client, metadata_table: &str) -> Self {
        Self {
            client,
            metadata_table: metadata_table.to_string(),
        }
    }

    /// Create the metadata table if absent. Idempotent; safe to call per run.
    pub async fn ensure_schema(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                job_id UUID NOT NULL,
                schema_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                batch_id BIGINT NOT NULL,
                last_offset BIGINT NOT NULL,
                processed_rows BIGINT NOT NULL,
                total_rows BIGINT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                last_processed_time TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (job_id, schema_name, table_name, batch_id)
            )",
            self.metadata_table
        );
        self.client
            .execute(&sql, &[])
            .await
            .context("failed to create metadata table")?;
        Ok(())
    }

    /// Upsert one batch's checkpoint, keyed by `(job_id, schema, table, batch_id)`.
    pub async fn save(&self, checkpoint: &BatchCheckpoint) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (job_id, schema_name, table_name, batch_id, last_offset, processed_rows, total_rows, status, error_message, last_processed_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (job_id, schema_name, table_name, batch_id)
             DO UPDATE SET last_offset = EXCLUDED.last_offset,
                           processed_rows = EXCLUDED.processed_rows,
                           total_rows = EXCLUDED.total_rows,
                           status = EXCLUDED.status,
                           error_message = EXCLUDED.error_message,
                           last_processed_time = EXCLUDED.last_processed_time",
            self.metadata_table
        );
        let batch_id = checkpoint.batch_id as i64;
        self.client
            .execute(
                &sql,
                &[
                    &checkpoint.job_id,
                    &checkpoint.schema,
                    &checkpoint.table,
                    &batch_id,
                    &checkpoint.last_offset,
                    &(checkpoint.processed_rows as i64),
                    &checkpoint.total_rows,
                    &checkpoint.status.as_str(),
                    &checkpoint.error_message,
                    &checkpoint.last_processed_time,
                ],
            )
            .await
            .with_context(|| {
                format!(
                    "failed to save checkpoint for {}.{} batch {}",
                    checkpoint.schema, checkpoint.table, checkpoint.batch_id
                )
            })?;
        Ok(())
    }

    /// Load every checkpoint recorded for `(job_id, schema, table)`, used by the
    /// orchestrator's pre-flight resume scan.
    pub async fn load(
        &self,
        job_id: uuid::Uuid,
        schema: &str,
        table: &str,
    ) -> Result<Vec<BatchCheckpoint>> {
        let sql = format!(
            "SELECT batch_id, last_offset, processed_rows, total_rows, status, error_message, last_processed_time
             FROM {}
             WHERE job_id = $1 AND schema_name = $2 AND table_name = $3",
            self.metadata_table
        );
        let rows = self
            .client
            .query(&sql, &[&job_id, &schema, &table])
            .await
            .with_context(|| format!("failed to load checkpoints for {schema}.{table}"))?;

        rows.iter()
            .map(|r| {
                let batch_id: i64 = r.get(0);
                let processed_rows: i64 = r.get(2);
                let status_str: String = r.get(4);
                let status = match status_str.as_str() {
                    "COMPLETED" => CheckpointStatus::Completed,
                    "ERROR" => CheckpointStatus::Error,
                    other => anyhow::bail!("unknown checkpoint status {other}"),
                };
                Ok(BatchCheckpoint {
                    job_id,
                    schema: schema.to_string(),
                    table: table.to_string(),
                    batch_id: batch_id as u64,
                    last_offset: r.get(1),
                    processed_rows: processed_rows as u64,
                    total_rows: r.get(3),
                    status,
                    error_message: r.get(5),
                    last_processed_time: r.get(6),
                })
            })
            .collect()
    }
}
