// ABOUTME: Comparator - pure set-difference over two fingerprint maps
// ABOUTME: Grounded on modules/comparator.py, using HashSet membership per xmin/reconciler.rs

use crate::model::{DiffSets, FingerprintMap};

/// Compare two fingerprint maps, producing the three disjoint PK sets.
///
/// Pure and infallible: no I/O, no error path.
pub fn compare(src: &FingerprintMap, tgt: &FingerprintMap) -> DiffSets {
    let mut diff = DiffSets::default();

    for (pk, src_hash) in src {
        match tgt.get(pk) {
            None => {
                diff.missing_in_target.insert(pk.clone());
            }
            Some(tgt_hash) if tgt_hash != src_hash => {
                diff.mismatch.insert(pk.clone());
            }
            Some(_) => {}
        }
    }

    for pk in tgt.keys() {
        if !src.contains_key(pk) {
            diff.missing_in_source.insert(pk.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PkTuple;

    fn pk(v: &str) -> PkTuple {
        PkTuple(vec![Some(v.to_string())])
    }

    #[test]
    fn identical_maps_produce_no_diff() {
        let mut src = FingerprintMap::new();
        src.insert(pk("1"), "h1".to_string());
        let tgt = src.clone();
        let diff = compare(&src, &tgt);
        assert!(diff.is_empty());
    }

    #[test]
    fn mismatch_detected_when_hash_differs() {
        let mut src = FingerprintMap::new();
        src.insert(pk("1"), "h1".to_string());
        let mut tgt = FingerprintMap::new();
        tgt.insert(pk("1"), "h2".to_string());
        let diff = compare(&src, &tgt);
        assert_eq!(diff.mismatch, [pk("1")].into_iter().collect());
    }

    #[test]
    fn missing_in_target_when_only_in_source() {
        let mut src = FingerprintMap::new();
        src.insert(pk("1"), "h1".to_string());
        let tgt = FingerprintMap::new();
        let diff = compare(&src, &tgt);
        assert_eq!(diff.missing_in_target, [pk("1")].into_iter().collect());
    }

    #[test]
    fn missing_in_source_when_only_in_target() {
        let src = FingerprintMap::new();
        let mut tgt = FingerprintMap::new();
        tgt.insert(pk("1"), "h1".to_string());
        let diff = compare(&src, &tgt);
        assert_eq!(diff.missing_in_source, [pk("1")].into_iter().collect());
    }

    #[test]
    fn three_sets_are_pairwise_disjoint() {
        let mut src = FingerprintMap::new();
        src.insert(pk("1"), "h1".to_string()); // mismatch
        src.insert(pk("2"), "h2".to_string()); // missing_in_target
        let mut tgt = FingerprintMap::new();
        tgt.insert(pk("1"), "h1-different".to_string());
        tgt.insert(pk("3"), "h3".to_string()); // missing_in_source

        let diff = compare(&src, &tgt);
        assert!(diff.mismatch.is_disjoint(&diff.missing_in_target));
        assert!(diff.mismatch.is_disjoint(&diff.missing_in_source));
        assert!(diff.missing_in_target.is_disjoint(&diff.missing_in_source));
        assert_eq!(diff.mismatch.len(), 1);
        assert_eq!(diff.missing_in_target.len(), 1);
        assert_eq!(diff.missing_in_source.len(), 1);
    }
}
