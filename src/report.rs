// ABOUTME: Writes the per-run comparison report CSV
// ABOUTME: Grounded on db_sentinel.py's csv.DictWriter usage; column order matches TableSummary exactly

use std::path::Path;

use anyhow::{Context, Result};

use crate::model::TableSummary;

/// Write one row per table summary to `path`, in `TableSummary`'s field order.
/// Overwrites any existing file, matching the reference tool's one-report-per-run behavior.
pub fn write_report(path: &Path, summaries: &[TableSummary]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to open report file {}", path.display()))?;
    for summary in summaries {
        writer
            .serialize(summary)
            .context("failed to serialize table summary row")?;
    }
    writer.flush().context("failed to flush report file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> TableSummary {
        TableSummary {
            job_id: "11111111-1111-1111-1111-111111111111".to_string(),
            table_name: "orders".to_string(),
            schema: "public".to_string(),
            row_counts: 100,
            mismatch_count: 1,
            missing_in_source: 0,
            missing_in_target: 2,
            status: "COMPLETED".to_string(),
            start_time: "2026-01-01T00:00:00Z".to_string(),
            end_time: "2026-01-01T00:01:00Z".to_string(),
            source_sql_file: "source.sql".to_string(),
            target_sql_file: "target.sql".to_string(),
            no_op_update_count: 0,
            error_batch_count: 0,
        }
    }

    #[test]
    fn write_report_produces_header_and_row() {
        let path = std::env::temp_dir().join(format!("report-{}.csv", uuid::Uuid::new_v4()));
        write_report(&path, &[summary()]).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "job_id,table_name,schema,row_counts,mismatch_count,missing_in_source,missing_in_target,status,start_time,end_time,source_sql_file,target_sql_file,no_op_update_count,error_batch_count"
        );
        assert!(lines.next().unwrap().starts_with("11111111-1111-1111-1111-111111111111,orders,public,100,1,0,2,COMPLETED"));
        let _ = std::fs::remove_file(&path);
    }
}
