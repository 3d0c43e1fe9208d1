// ABOUTME: TableRunner - drives one table's full comparison lifecycle
// ABOUTME: Grounded on db_sentinel.py's process_table/process_batch and the reference tool's SyncDaemon shape

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::checkpoint::{resume_point, CheckpointStore, ResumeStrategy};
use crate::comparator::compare;
use crate::config::{Flags, Paths, TableSpec};
use crate::error::{EngineError, Result};
use crate::fetcher;
use crate::hasher::hash_rows;
use crate::model::{
    AuditEvent, AuditEventType, BatchCheckpoint, BatchResult, CheckpointStatus, DiffSets, PkTuple,
    Row, TableSummary,
};
use crate::postgres::ConnectionPool;
use crate::reverifier::{resolve_update_predicate, Reverifier, UpdatePredicate};
use crate::{emitter, report};

/// Deterministic SQL output filenames for one table within one run
/// (filenames must be reproducible given the same job, so a retried run
/// overwrites rather than accumulates stray files).
fn sql_output_paths(output_dir: &str, job_id: Uuid, schema: &str, table: &str) -> (PathBuf, PathBuf) {
    let dir = Path::new(output_dir);
    (
        dir.join(format!("{job_id}_{schema}_{table}_source.sql")),
        dir.join(format!("{job_id}_{schema}_{table}_target.sql")),
    )
}

fn build_row_cache(rows: &[Row], pk_idx: &[usize], wanted: &HashSet<PkTuple>) -> HashMap<PkTuple, Row> {
    rows.iter()
        .filter_map(|r| {
            let pk = r.pk_tuple(pk_idx);
            if wanted.contains(&pk) {
                Some((pk, r.clone()))
            } else {
                None
            }
        })
        .collect()
}

fn table_status(error_batch_count: usize, mismatch_count: usize) -> String {
    if error_batch_count > 0 {
        "COMPLETED_WITH_ERRORS".to_string()
    } else if mismatch_count > 0 {
        "MISMATCH".to_string()
    } else {
        "COMPLETED".to_string()
    }
}

fn batch_err(spec: &TableSpec, batch_id: u64, source: anyhow::Error) -> EngineError {
    EngineError::Batch {
        schema: spec.schema.clone(),
        table: spec.table_name.clone(),
        batch_id,
        source,
    }
}

fn reverify_err(spec: &TableSpec, source: anyhow::Error) -> EngineError {
    EngineError::Reverify {
        schema: spec.schema.clone(),
        table: spec.table_name.clone(),
        source,
    }
}

/// Hash and compare one batch's source/target rows, producing the batch
/// protocol's return value.
fn process_one_batch(
    spec: &TableSpec,
    batch_id: u64,
    offset: i64,
    source_rows: &[Row],
    target_rows: &[Row],
    columns: &[String],
) -> Result<BatchResult> {
    let src_fp = hash_rows(source_rows, columns, &spec.exclude_columns, &spec.primary_key).map_err(|column| {
        EngineError::SchemaMismatch {
            schema: spec.schema.clone(),
            table: spec.table_name.clone(),
            column,
        }
    })?;
    let tgt_fp = hash_rows(target_rows, columns, &spec.exclude_columns, &spec.primary_key).map_err(|column| {
        EngineError::SchemaMismatch {
            schema: spec.schema.clone(),
            table: spec.table_name.clone(),
            column,
        }
    })?;

    Ok(BatchResult {
        batch_id,
        offset,
        processed_rows: source_rows.len().max(target_rows.len()) as u64,
        diff: compare(&src_fp, &tgt_fp),
    })
}

/// Drives the full comparison lifecycle for a single table: pre-flight,
/// resumable batch processing, reverification, SQL emission and the final
/// [`TableSummary`].
///
/// Held behind `Arc` (rather than borrowed) so one runner can be cloned into
/// a `tokio::spawn`ed task per table, giving the cross-table worker pool a
/// `'static` task to hand to the scheduler.
pub struct TableRunner {
    pub job_id: Uuid,
    pub source_pool: Arc<ConnectionPool>,
    pub target_pool: Arc<ConnectionPool>,
    pub paths: Arc<Paths>,
    pub flags: Arc<Flags>,
}

impl TableRunner {
    pub async fn run(&self, spec: &TableSpec) -> Result<TableSummary> {
        let start_time = Utc::now();
        let source_client = self.source_pool.acquire();
        let target_client = self.target_pool.acquire();

        let columns = match &spec.columns {
            Some(cols) => cols.clone(),
            None => fetcher::discover_columns(&source_client, &spec.schema, &spec.table_name)
                .await
                .map_err(|e| batch_err(spec, 0, e))?,
        };

        let pk_idx = crate::model::pk_indices(&columns, &spec.primary_key).map_err(|column| {
            EngineError::SchemaMismatch {
                schema: spec.schema.clone(),
                table: spec.table_name.clone(),
                column,
            }
        })?;

        let source_total = fetcher::count_rows(&source_client, &spec.schema, &spec.table_name, spec.where_clause.as_deref())
            .await
            .map_err(|e| batch_err(spec, 0, e))?;
        let target_total = fetcher::count_rows(&target_client, &spec.schema, &spec.table_name, spec.where_clause.as_deref())
            .await
            .map_err(|e| batch_err(spec, 0, e))?;
        let total_rows = source_total.max(target_total);

        let checkpoint_store = CheckpointStore::new(&source_client, &self.paths.metadata_table);
        if self.flags.enable_restart {
            checkpoint_store.ensure_schema().await.map_err(|e| batch_err(spec, 0, e))?;
        }
        let audit_sink = AuditSink::new(
            self.flags.enable_audit_table.then_some(source_client.as_ref()),
            &self.paths.audit_table,
        );
        audit_sink.ensure_schema().await.map_err(|e| batch_err(spec, 0, e))?;

        let mut next_batch_id = 0u64;
        if self.flags.enable_restart {
            let existing = checkpoint_store
                .load(self.job_id, &spec.schema, &spec.table_name)
                .await
                .map_err(|e| batch_err(spec, 0, e))?;
            if let Some(point) = resume_point(&existing, ResumeStrategy::NextAfterMaxCompleted) {
                tracing::info!(
                    schema = %spec.schema, table = %spec.table_name,
                    next_batch_id = point.next_batch_id,
                    "resuming from checkpoint"
                );
                next_batch_id = point.next_batch_id;
            }
        }

        let mut diff = DiffSets::default();
        let mut source_rows_by_pk: HashMap<PkTuple, Row> = HashMap::new();
        let mut target_rows_by_pk: HashMap<PkTuple, Row> = HashMap::new();
        let mut error_batch_count = 0usize;
        let mut batch_id = next_batch_id;

        loop {
            let offset = (batch_id as i64) * spec.chunk_size as i64;
            let (source_res, target_res) = tokio::join!(
                fetcher::fetch_batch(
                    &source_client, &spec.schema, &spec.table_name, &columns, &spec.primary_key,
                    spec.where_clause.as_deref(), spec.chunk_size as i64, offset,
                ),
                fetcher::fetch_batch(
                    &target_client, &spec.schema, &spec.table_name, &columns, &spec.primary_key,
                    spec.where_clause.as_deref(), spec.chunk_size as i64, offset,
                ),
            );

            let source_rows = match source_res {
                Ok((rows, _)) => rows,
                Err(e) => {
                    error_batch_count += 1;
                    self.record_batch_error(&checkpoint_store, &audit_sink, spec, batch_id, offset, &e).await?;
                    break;
                }
            };
            let target_rows = match target_res {
                Ok((rows, _)) => rows,
                Err(e) => {
                    error_batch_count += 1;
                    self.record_batch_error(&checkpoint_store, &audit_sink, spec, batch_id, offset, &e).await?;
                    break;
                }
            };

            if source_rows.is_empty() && target_rows.is_empty() {
                break;
            }

            let result = process_one_batch(spec, batch_id, offset, &source_rows, &target_rows, &columns)?;

            source_rows_by_pk.extend(build_row_cache(&source_rows, &pk_idx, &result.diff.mismatch));
            source_rows_by_pk.extend(build_row_cache(&source_rows, &pk_idx, &result.diff.missing_in_target));
            target_rows_by_pk.extend(build_row_cache(&target_rows, &pk_idx, &result.diff.missing_in_source));

            let mismatch_count = result.diff.mismatch.len() as u64;

            if self.flags.enable_restart {
                checkpoint_store
                    .save(&BatchCheckpoint {
                        job_id: self.job_id,
                        schema: spec.schema.clone(),
                        table: spec.table_name.clone(),
                        batch_id: result.batch_id,
                        last_offset: result.offset,
                        processed_rows: result.processed_rows,
                        total_rows,
                        status: CheckpointStatus::Completed,
                        error_message: None,
                        last_processed_time: Utc::now(),
                    })
                    .await
                    .map_err(|e| batch_err(spec, batch_id, e))?;
            }

            audit_sink
                .record(&AuditEvent {
                    job_id: self.job_id,
                    event_time: Utc::now(),
                    event_type: AuditEventType::Batch,
                    schema: spec.schema.clone(),
                    table: spec.table_name.clone(),
                    batch_id: Some(result.batch_id),
                    row_counts: Some(result.processed_rows),
                    mismatch_count: Some(mismatch_count),
                    status: CheckpointStatus::Completed.as_str().to_string(),
                    error_message: None,
                    details: None,
                })
                .await
                .map_err(|e| batch_err(spec, batch_id, e))?;

            diff.merge(result.diff);
            batch_id += 1;
        }

        let (update_pks, missing_in_target_pks, no_op_update_count) = if self.flags.enable_reverification {
            self.reverify(spec, &diff).await?
        } else {
            (diff.mismatch.clone(), diff.missing_in_target.clone(), 0)
        };

        let (source_out, target_out) = sql_output_paths(&self.paths.sql_output_dir, self.job_id, &spec.schema, &spec.table_name);
        emitter::emit_sql(
            &update_pks,
            &diff.missing_in_source,
            &missing_in_target_pks,
            &spec.primary_key,
            &source_rows_by_pk,
            &target_rows_by_pk,
            &source_out,
            &target_out,
            &spec.qualified_name(),
        )
        .await
        .map_err(|e| EngineError::Emit {
            schema: spec.schema.clone(),
            table: spec.table_name.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;

        let end_time = Utc::now();
        Ok(TableSummary {
            job_id: self.job_id.to_string(),
            table_name: spec.table_name.clone(),
            schema: spec.schema.clone(),
            row_counts: total_rows,
            mismatch_count: update_pks.len(),
            missing_in_source: diff.missing_in_source.len(),
            missing_in_target: missing_in_target_pks.len(),
            status: table_status(error_batch_count, update_pks.len()),
            start_time: start_time.to_rfc3339(),
            end_time: end_time.to_rfc3339(),
            source_sql_file: source_out.display().to_string(),
            target_sql_file: target_out.display().to_string(),
            no_op_update_count,
            error_batch_count,
        })
    }

    /// Reverify mismatch and missing-in-target candidates against the target
    /// table. Returns the confirmed UPDATE set, the confirmed
    /// missing-in-target (INSERT-into-target) set, and a count of mismatch
    /// candidates that reverification discarded as no-ops.
    async fn reverify(
        &self,
        spec: &TableSpec,
        diff: &DiffSets,
    ) -> Result<(HashSet<PkTuple>, HashSet<PkTuple>, usize)> {
        // The reverifier spawns one task per candidate PK, so it needs a
        // connection it owns outright rather than a round-robin handle shared
        // with the rest of the table run.
        let dedicated = self
            .target_pool
            .connect_dedicated()
            .await
            .map_err(|e| reverify_err(spec, e))?;
        let reverifier = Reverifier::new(Arc::new(dedicated), 8);

        let predicate = resolve_update_predicate(self.flags.reverify_compat_mode);
        if self.flags.reverify_compat_mode {
            tracing::warn!(
                "reverify_compat_mode is enabled: UPDATE candidates are being confirmed with the \
                 historical absent-from-target predicate, which misclassifies rows still present \
                 in target as missing"
            );
        }

        let update_pks = match predicate {
            UpdatePredicate::PresentInTarget => reverifier
                .reverify_present_in_target(&spec.schema, &spec.table_name, &spec.primary_key, &diff.mismatch)
                .await
                .map_err(|e| reverify_err(spec, e))?,
            UpdatePredicate::AbsentFromTarget => reverifier
                .reverify_absent_from_target(&spec.schema, &spec.table_name, &spec.primary_key, &diff.mismatch)
                .await
                .map_err(|e| reverify_err(spec, e))?,
        };
        let no_op_update_count = diff.mismatch.len() - update_pks.len();

        let missing_in_target_pks = reverifier
            .reverify_absent_from_target(&spec.schema, &spec.table_name, &spec.primary_key, &diff.missing_in_target)
            .await
            .map_err(|e| reverify_err(spec, e))?;

        Ok((update_pks, missing_in_target_pks, no_op_update_count))
    }

    async fn record_batch_error(
        &self,
        checkpoint_store: &CheckpointStore<'_>,
        audit_sink: &AuditSink<'_>,
        spec: &TableSpec,
        batch_id: u64,
        offset: i64,
        err: &anyhow::Error,
    ) -> Result<()> {
        if self.flags.enable_restart {
            checkpoint_store
                .save(&BatchCheckpoint {
                    job_id: self.job_id,
                    schema: spec.schema.clone(),
                    table: spec.table_name.clone(),
                    batch_id,
                    last_offset: offset,
                    processed_rows: 0,
                    total_rows: 0,
                    status: CheckpointStatus::Error,
                    error_message: Some(err.to_string()),
                    last_processed_time: Utc::now(),
                })
                .await
                .map_err(|e| batch_err(spec, batch_id, e))?;
        }
        audit_sink
            .record(&AuditEvent {
                job_id: self.job_id,
                event_time: Utc::now(),
                event_type: AuditEventType::Error,
                schema: spec.schema.clone(),
                table: spec.table_name.clone(),
                batch_id: Some(batch_id),
                row_counts: None,
                mismatch_count: None,
                status: CheckpointStatus::Error.as_str().to_string(),
                error_message: Some(err.to_string()),
                details: None,
            })
            .await
            .map_err(|e| batch_err(spec, batch_id, e))?;
        Ok(())
    }
}

/// Write the full run's [`TableSummary`] rows to the report CSV.
pub fn write_final_report(paths: &Paths, summaries: &[TableSummary]) -> Result<()> {
    let path = PathBuf::from(&paths.report_path);
    report::write_report(&path, summaries)
        .context("failed to write comparison report")
        .map_err(|e| EngineError::Emit {
            schema: String::new(),
            table: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_output_paths_are_deterministic_per_job() {
        let job_id = Uuid::nil();
        let (src, tgt) = sql_output_paths(".", job_id, "public", "orders");
        assert_eq!(
            src,
            PathBuf::from(format!("./{job_id}_public_orders_source.sql"))
        );
        assert_eq!(
            tgt,
            PathBuf::from(format!("./{job_id}_public_orders_target.sql"))
        );
    }

    #[test]
    fn build_row_cache_only_keeps_wanted_pks() {
        let rows = vec![
            Row::new(vec!["id".to_string()], vec![Some("1".to_string())]),
            Row::new(vec!["id".to_string()], vec![Some("2".to_string())]),
        ];
        let mut wanted = HashSet::new();
        wanted.insert(PkTuple(vec![Some("2".to_string())]));
        let cache = build_row_cache(&rows, &[0], &wanted);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key(&PkTuple(vec![Some("2".to_string())])));
    }

    #[test]
    fn table_status_prioritizes_errors_over_mismatches() {
        assert_eq!(table_status(1, 3), "COMPLETED_WITH_ERRORS");
    }

    #[test]
    fn table_status_reports_mismatch_when_updates_survive() {
        assert_eq!(table_status(0, 1), "MISMATCH");
    }

    #[test]
    fn table_status_reports_completed_when_clean() {
        assert_eq!(table_status(0, 0), "COMPLETED");
    }
}
