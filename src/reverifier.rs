// ABOUTME: Reverifier - confirms candidate diffs against the target table before emission
// ABOUTME: Bounded concurrency via Arc<Semaphore> + tokio::spawn, replacing modules/reverifier.py's ThreadPoolExecutor

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio_postgres::Client;

use crate::fetcher::quote_ident;
use crate::model::PkTuple;

/// Which predicate governs which candidate set a reverifier run confirms.
///
/// The original Python's `verify_primary_keys` always checks "is this PK
/// absent from target" and is reused unchanged for mismatch/UPDATE
/// candidates, which actually need the opposite check ("is this PK present in
/// target, so an UPDATE is the right statement and not an INSERT"). This is a
/// defect in the original; [`UpdatePredicate::PresentInTarget`] is the
/// corrected default. [`UpdatePredicate::AbsentFromTarget`] reproduces the
/// historical (defective) wiring for `flags.reverify_compat_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePredicate {
    PresentInTarget,
    AbsentFromTarget,
}

/// Choose the UPDATE-candidate predicate.
pub fn resolve_update_predicate(compat_mode: bool) -> UpdatePredicate {
    if compat_mode {
        UpdatePredicate::AbsentFromTarget
    } else {
        UpdatePredicate::PresentInTarget
    }
}

/// Confirms candidate PKs against the target table with a bounded number of
/// concurrent connections in flight.
pub struct Reverifier {
    client: Arc<Client>,
    max_concurrency: usize,
}

impl Reverifier {
    pub fn new(client: Arc<Client>, max_concurrency: usize) -> Self {
        Self {
            client,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Of `candidates`, return the subset still absent from `schema.table`
    /// (`COUNT = 0`), used to confirm `missing_in_target` before emitting INSERTs.
    pub async fn reverify_absent_from_target(
        &self,
        schema: &str,
        table: &str,
        pk_columns: &[String],
        candidates: &HashSet<PkTuple>,
    ) -> Result<HashSet<PkTuple>> {
        let existence = self.check_existence(schema, table, pk_columns, candidates).await?;
        Ok(existence
            .into_iter()
            .filter_map(|(pk, exists)| if exists { None } else { Some(pk) })
            .collect())
    }

    /// Of `candidates`, return the subset present in `schema.table`
    /// (`COUNT > 0`), used to confirm mismatch/UPDATE candidates.
    pub async fn reverify_present_in_target(
        &self,
        schema: &str,
        table: &str,
        pk_columns: &[String],
        candidates: &HashSet<PkTuple>,
    ) -> Result<HashSet<PkTuple>> {
        let existence = self.check_existence(schema, table, pk_columns, candidates).await?;
        Ok(existence
            .into_iter()
            .filter_map(|(pk, exists)| if exists { Some(pk) } else { None })
            .collect())
    }

    async fn check_existence(
        &self,
        schema: &str,
        table: &str,
        pk_columns: &[String],
        candidates: &HashSet<PkTuple>,
    ) -> Result<HashMap<PkTuple, bool>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(candidates.len());

        for pk in candidates.iter().cloned() {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let schema = schema.to_string();
            let table = table.to_string();
            let pk_columns = pk_columns.to_vec();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let exists = row_exists(&client, &schema, &table, &pk_columns, &pk).await?;
                Ok::<(PkTuple, bool), anyhow::Error>((pk, exists))
            }));
        }

        let mut results = HashMap::with_capacity(handles.len());
        for handle in handles {
            let (pk, exists) = handle.await.context("reverifier task panicked")??;
            results.insert(pk, exists);
        }
        Ok(results)
    }
}

async fn row_exists(
    client: &Client,
    schema: &str,
    table: &str,
    pk_columns: &[String],
    pk: &PkTuple,
) -> Result<bool> {
    let where_clause: Vec<String> = pk_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
        .collect();
    let sql = format!(
        "SELECT 1 FROM {}.{} WHERE {} LIMIT 1",
        quote_ident(schema),
        quote_ident(table),
        where_clause.join(" AND ")
    );
    let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = pk
        .0
        .iter()
        .map(|v| v as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect();

    let row = client
        .query_opt(&sql, &params)
        .await
        .with_context(|| format!("reverify existence check failed for {schema}.{table}"))?;
    Ok(row.is_some())
}
