// ABOUTME: AuditSink - append-only audit trail to the audit table and the audit log file
// ABOUTME: Grounded on modules/audit_logger.py and the reference tool's tracing call-site idiom

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::model::AuditEvent;

/// Writes [`AuditEvent`]s to `paths.audit_table` (when `flags.enable_audit_table`
/// is set) and always emits a structured `tracing` event.
pub struct AuditSink<'a> {
    client: Option<&'a Client>,
    audit_table: String,
}

impl<'a> AuditSink<'a> {
    /// `client` is `None` when `enable_audit_table` is off; the sink then only
    /// logs via `tracing`, matching the reference tool's behavior of treating
    /// the audit table as an optional extra over the log file.
    pub fn new(client: Option<&'a Client>, audit_table: &str) -> Self {
        Self {
            client,
            audit_table: audit_table.to_string(),
        }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let Some(client) = self.client else {
            return Ok(());
        };
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                job_id UUID NOT NULL,
                event_time TIMESTAMPTZ NOT NULL,
                event_type TEXT NOT NULL,
                schema_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                batch_id BIGINT,
                row_counts BIGINT,
                mismatch_count BIGINT,
                status TEXT NOT NULL,
                error_message TEXT,
                details TEXT
            )",
            self.audit_table
        );
        client
            .execute(&sql, &[])
            .await
            .context("failed to create audit table")?;
        Ok(())
    }

    pub async fn record(&self, event: &AuditEvent) -> Result<()> {
        match event.event_type.as_str() {
            "ERROR" => tracing::error!(
                job_id = %event.job_id,
                schema = %event.schema,
                table = %event.table,
                batch_id = ?event.batch_id,
                status = %event.status,
                error = ?event.error_message,
                "audit event",
            ),
            _ => tracing::info!(
                job_id = %event.job_id,
                schema = %event.schema,
                table = %event.table,
                batch_id = ?event.batch_id,
                row_counts = ?event.row_counts,
                mismatch_count = ?event.mismatch_count,
                status = %event.status,
                "audit event",
            ),
        }

        let Some(client) = self.client else {
            return Ok(());
        };

        let sql = format!(
            "INSERT INTO {} (job_id, event_time, event_type, schema_name, table_name, batch_id, row_counts, mismatch_count, status, error_message, details)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            self.audit_table
        );
        let batch_id = event.batch_id.map(|b| b as i64);
        let row_counts = event.row_counts.map(|r| r as i64);
        let mismatch_count = event.mismatch_count.map(|m| m as i64);
        client
            .execute(
                &sql,
                &[
                    &event.job_id,
                    &event.event_time,
                    &event.event_type.as_str(),
                    &event.schema,
                    &event.table,
                    &batch_id,
                    &row_counts,
                    &mismatch_count,
                    &event.status,
                    &event.error_message,
                    &event.details,
                ],
            )
            .await
            .context("failed to insert audit event")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditEventType;
    use chrono::Utc;

    fn event(event_type: AuditEventType) -> AuditEvent {
        AuditEvent {
            job_id: uuid::Uuid::nil(),
            event_time: Utc::now(),
            event_type,
            schema: "public".to_string(),
            table: "orders".to_string(),
            batch_id: Some(3),
            row_counts: Some(1000),
            mismatch_count: Some(2),
            status: "COMPLETED".to_string(),
            error_message: None,
            details: None,
        }
    }

    #[tokio::test]
    async fn record_without_client_only_logs() {
        let sink = AuditSink::new(None, "DB_SENTINEL_AUDIT");
        sink.record(&event(AuditEventType::Batch)).await.unwrap();
        sink.record(&event(AuditEventType::Error)).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_schema_without_client_is_a_noop() {
        let sink = AuditSink::new(None, "DB_SENTINEL_AUDIT");
        sink.ensure_schema().await.unwrap();
    }
}
