// ABOUTME: RowHasher - fingerprints rows into (pk-tuple, digest) pairs
// ABOUTME: Corrects the PK/exclusion-index conflation present in modules/row_hasher.py

use sha2::{Digest, Sha256};

use crate::model::{pk_indices, FingerprintMap, Row};

/// Hash each row, keyed by its primary-key tuple, excluding `exclude_columns`
/// from the fingerprint.
///
/// Unlike the original Python (`modules/row_hasher.py`), which derives both
/// the hashed-column indices and the PK indices from the same exclusion-list
/// membership test (leaving PK extraction effectively unimplemented), PK
/// indices here are always derived from `pk_columns` directly.
///
/// # Errors
///
/// Returns the name of the first primary-key column absent from `col_names`.
pub fn hash_rows(
    rows: &[Row],
    col_names: &[String],
    exclude_columns: &[String],
    pk_columns: &[String],
) -> Result<FingerprintMap, String> {
    let pk_idx = pk_indices(col_names, pk_columns)?;
    let hash_idx: Vec<usize> = (0..col_names.len())
        .filter(|&i| !exclude_columns.contains(&col_names[i]))
        .collect();

    let mut map = FingerprintMap::with_capacity(rows.len());
    for row in rows {
        let pk = row.pk_tuple(&pk_idx);
        let fingerprint = fingerprint_row(row, &hash_idx);
        map.insert(pk, fingerprint);
    }
    Ok(map)
}

/// Canonicalize and hash the selected columns of one row.
///
/// `NULL` maps to the empty string, every other value to its textual
/// representation; values are joined with a single `|` separator before
/// SHA-256 digesting and hex-encoding.
fn fingerprint_row(row: &Row, hash_idx: &[usize]) -> String {
    let parts: Vec<&str> = hash_idx
        .iter()
        .map(|&i| row.values[i].as_deref().unwrap_or(""))
        .collect();
    let canonical = parts.join("|");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
