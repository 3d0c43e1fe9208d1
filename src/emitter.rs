// ABOUTME: SqlEmitter - renders remediation SQL for the verified diff sets
// ABOUTME: Value encoding matches the reference tool's utils::quote_literal exactly

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::model::{PkTuple, Row};

/// Quote a SQL text literal: wrap in single quotes, doubling any embedded `'`.
/// Identical to the reference tool's `utils::quote_literal`.
fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push('\'');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Render one value: `NULL` for null, else a quoted text literal. No
/// type-aware quoting — numeric and date values are rendered as quoted
/// strings too; a type-aware rewrite is future work.
fn sql_value(value: &Option<String>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(v) => quote_literal(v),
    }
}

fn column_value<'a>(row: &'a Row, col: &str) -> Option<&'a Option<String>> {
    row.columns
        .iter()
        .position(|c| c == col)
        .map(|i| &row.values[i])
}

fn render_insert(qualified_table: &str, row: &Row) -> String {
    let cols = row.columns.join(", ");
    let vals: Vec<String> = row.values.iter().map(sql_value).collect();
    format!(
        "INSERT INTO {qualified_table} ({cols}) VALUES ({});\n",
        vals.join(", ")
    )
}

fn render_update(qualified_table: &str, row: &Row, pk_columns: &[String]) -> String {
    let set_clause: Vec<String> = row
        .columns
        .iter()
        .zip(row.values.iter())
        .filter(|(c, _)| !pk_columns.contains(c))
        .map(|(c, v)| format!("{c} = {}", sql_value(v)))
        .collect();

    let where_clause: Vec<String> = pk_columns
        .iter()
        .map(|c| {
            let v = column_value(row, c).expect("pk column present in row");
            format!("{c} = {}", sql_value(v))
        })
        .collect();

    format!(
        "UPDATE {qualified_table} SET {} WHERE {};\n",
        set_clause.join(", "),
        where_clause.join(" AND ")
    )
}

/// Append remediation SQL for one table's verified diff sets to the source
/// and target output files.
///
/// `source_out` collects the statements meant to be reviewed alongside the
/// source row data that produced them: UPDATEs for confirmed mismatches and
/// INSERTs for rows missing from target, both rendered from source rows.
/// `target_out` collects INSERTs for rows missing from source
/// (`missing_in_source`), rendered from target rows.
///
/// PKs are sorted before rendering so output is deterministic across runs
/// given the same inputs, independent of `HashSet` iteration order.
#[allow(clippy::too_many_arguments)]
pub async fn emit_sql(
    update_pks: &HashSet<PkTuple>,
    missing_in_source_pks: &HashSet<PkTuple>,
    missing_in_target_pks: &HashSet<PkTuple>,
    pk_columns: &[String],
    source_rows: &HashMap<PkTuple, Row>,
    target_rows: &HashMap<PkTuple, Row>,
    source_out: &Path,
    target_out: &Path,
    qualified_table: &str,
) -> Result<()> {
    let mut source_sql = String::new();
    let mut target_sql = String::new();

    let mut sorted_updates: Vec<&PkTuple> = update_pks.iter().collect();
    sorted_updates.sort();
    for pk in sorted_updates {
        let row = source_rows
            .get(pk)
            .with_context(|| format!("update PK {pk} missing from source row cache"))?;
        source_sql.push_str(&render_update(qualified_table, row, pk_columns));
    }

    let mut sorted_missing_in_target: Vec<&PkTuple> = missing_in_target_pks.iter().collect();
    sorted_missing_in_target.sort();
    for pk in sorted_missing_in_target {
        let row = source_rows
            .get(pk)
            .with_context(|| format!("missing-in-target PK {pk} missing from source row cache"))?;
        source_sql.push_str(&render_insert(qualified_table, row));
    }

    let mut sorted_missing_in_source: Vec<&PkTuple> = missing_in_source_pks.iter().collect();
    sorted_missing_in_source.sort();
    for pk in sorted_missing_in_source {
        let row = target_rows
            .get(pk)
            .with_context(|| format!("missing-in-source PK {pk} missing from target row cache"))?;
        target_sql.push_str(&render_insert(qualified_table, row));
    }

    append_file(source_out, &source_sql).await?;
    append_file(target_out, &target_sql).await?;
    Ok(())
}

async fn append_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    file.write_all(contents.as_bytes())
        .await
        .with_context(|| format!("failed to write to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cols: &[&str], vals: &[Option<&str>]) -> Row {
        Row::new(
            cols.iter().map(|s| s.to_string()).collect(),
            vals.iter().map(|v| v.map(|s| s.to_string())).collect(),
        )
    }

    fn pk(v: &str) -> PkTuple {
        PkTuple(vec![Some(v.to_string())])
    }

    #[test]
    fn quote_literal_doubles_interior_quotes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal("plain"), "'plain'");
    }

    #[test]
    fn sql_value_renders_null() {
        assert_eq!(sql_value(&None), "NULL");
        assert_eq!(sql_value(&Some("x".to_string())), "'x'");
    }

    #[test]
    fn render_insert_lists_all_columns() {
        let r = row(&["id", "name"], &[Some("2"), Some("b")]);
        let sql = render_insert("public.users", &r);
        assert_eq!(sql, "INSERT INTO public.users (id, name) VALUES ('2', 'b');\n");
    }

    #[test]
    fn render_update_excludes_pk_from_set_clause() {
        let r = row(&["id", "name"], &[Some("2"), Some("b")]);
        let sql = render_update("public.users", &r, &["id".to_string()]);
        assert_eq!(sql, "UPDATE public.users SET name = 'b' WHERE id = '2';\n");
    }

    #[tokio::test]
    async fn emit_sql_writes_expected_statements() {
        let dir = std::env::temp_dir().join(format!("db-sentinel-test-{}", uuid::Uuid::new_v4()));
        let source_out = dir.join("source.sql");
        let target_out = dir.join("target.sql");

        let mut source_rows = HashMap::new();
        source_rows.insert(pk("2"), row(&["id", "name"], &[Some("2"), Some("b")]));
        let mut target_rows = HashMap::new();
        target_rows.insert(pk("3"), row(&["id", "name"], &[Some("3"), Some("c")]));

        let mut update_pks = HashSet::new();
        update_pks.insert(pk("2"));
        let mut missing_in_source = HashSet::new();
        missing_in_source.insert(pk("3"));
        let missing_in_target = HashSet::new();

        emit_sql(
            &update_pks,
            &missing_in_source,
            &missing_in_target,
            &["id".to_string()],
            &source_rows,
            &target_rows,
            &source_out,
            &target_out,
            "public.users",
        )
        .await
        .unwrap();

        let source_contents = tokio::fs::read_to_string(&source_out).await.unwrap();
        let target_contents = tokio::fs::read_to_string(&target_out).await.unwrap();

        assert_eq!(
            source_contents,
            "UPDATE public.users SET name = 'b' WHERE id = '2';\n"
        );
        assert_eq!(
            target_contents,
            "INSERT INTO public.users (id, name) VALUES ('3', 'c');\n"
        );

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
