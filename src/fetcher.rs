// ABOUTME: BatchFetcher - deterministic, ordered paged reads from one side
// ABOUTME: Grounded on modules/batch_fetcher.py's query shape and xmin/reconciler.rs's PkBatchReader

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::model::Row;

/// Quote a PostgreSQL identifier, doubling embedded double-quotes.
pub(crate) fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Fetch at most `size` rows from `schema.table`, ordered deterministically by
/// `pk_columns`, starting at `offset`. Returns the rows alongside the actual
/// column names used.
///
/// Every projected column is cast to `::text` so the resulting [`Row`] values
/// are always textual, matching the canonicalization the fingerprint needs
/// and the untyped SQL emission the remediation output needs.
pub async fn fetch_batch(
    client: &Client,
    schema: &str,
    table: &str,
    columns: &[String],
    pk_columns: &[String],
    filter: Option<&str>,
    size: i64,
    offset: i64,
) -> Result<(Vec<Row>, Vec<String>)> {
    let col_list: Vec<String> = columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(c)))
        .collect();
    let order_by: Vec<String> = pk_columns.iter().map(|c| quote_ident(c)).collect();

    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        col_list.join(", "),
        quote_ident(schema),
        quote_ident(table)
    );
    if let Some(f) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(f);
    }
    sql.push_str(&format!(
        " ORDER BY {} OFFSET $1 ROWS FETCH NEXT $2 ROWS ONLY",
        order_by.join(", ")
    ));

    tracing::debug!("batch fetch SQL: {sql}");

    let rows = client
        .query(&sql, &[&offset, &size])
        .await
        .with_context(|| format!("failed to fetch batch from {schema}.{table} at offset {offset}"))?;

    let result: Vec<Row> = rows
        .iter()
        .map(|r| {
            let values: Vec<Option<String>> = (0..columns.len()).map(|i| r.get(i)).collect();
            Row::new(columns.to_vec(), values)
        })
        .collect();

    Ok((result, columns.to_vec()))
}

/// Discover column names via a zero-row probe, used when a table's projection
/// is unspecified.
pub async fn discover_columns(client: &Client, schema: &str, table: &str) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT * FROM {}.{} WHERE 1=0",
        quote_ident(schema),
        quote_ident(table)
    );
    let stmt = client
        .prepare(&sql)
        .await
        .with_context(|| format!("failed to probe columns for {schema}.{table}"))?;
    Ok(stmt.columns().iter().map(|c| c.name().to_string()).collect())
}

/// Count rows in `schema.table`, honoring the optional filter.
pub async fn count_rows(
    client: &Client,
    schema: &str,
    table: &str,
    filter: Option<&str>,
) -> Result<i64> {
    let mut sql = format!(
        "SELECT COUNT(1) FROM {}.{}",
        quote_ident(schema),
        quote_ident(table)
    );
    if let Some(f) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(f);
    }
    tracing::debug!("count SQL: {sql}");

    let row = client
        .query_one(&sql, &[])
        .await
        .with_context(|| format!("failed to count rows in {schema}.{table}"))?;
    Ok(row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
