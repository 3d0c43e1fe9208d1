// ABOUTME: Emitter output-format assertions - exact SQL text for each candidate set

use std::collections::{HashMap, HashSet};

use db_sentinel::emitter::emit_sql;
use db_sentinel::model::{PkTuple, Row};

fn row(cols: &[&str], vals: &[Option<&str>]) -> Row {
    Row::new(
        cols.iter().map(|s| s.to_string()).collect(),
        vals.iter().map(|v| v.map(|s| s.to_string())).collect(),
    )
}

fn pk(v: &str) -> PkTuple {
    PkTuple(vec![Some(v.to_string())])
}

fn scratch_paths() -> (std::path::PathBuf, std::path::PathBuf) {
    let dir = std::env::temp_dir().join(format!("db-sentinel-emitter-test-{}", uuid::Uuid::new_v4()));
    (dir.join("source.sql"), dir.join("target.sql"))
}

#[tokio::test]
async fn update_statement_uses_source_row_and_targets_the_source_file() {
    let (source_out, target_out) = scratch_paths();

    let mut source_rows = HashMap::new();
    source_rows.insert(pk("1"), row(&["id", "name"], &[Some("1"), Some("new-name")]));

    let update_pks: HashSet<PkTuple> = [pk("1")].into_iter().collect();

    emit_sql(
        &update_pks,
        &HashSet::new(),
        &HashSet::new(),
        &["id".to_string()],
        &source_rows,
        &HashMap::new(),
        &source_out,
        &target_out,
        "public.accounts",
    )
    .await
    .unwrap();

    let source_contents = tokio::fs::read_to_string(&source_out).await.unwrap();
    assert_eq!(
        source_contents,
        "UPDATE public.accounts SET name = 'new-name' WHERE id = '1';\n"
    );
    assert!(!target_out.exists() || tokio::fs::read_to_string(&target_out).await.unwrap().is_empty());

    let _ = tokio::fs::remove_file(&source_out).await;
    let _ = tokio::fs::remove_file(&target_out).await;
}

#[tokio::test]
async fn missing_in_target_emits_insert_from_source_row_into_source_file() {
    let (source_out, target_out) = scratch_paths();

    let mut source_rows = HashMap::new();
    source_rows.insert(pk("5"), row(&["id", "name"], &[Some("5"), Some("e")]));

    let missing_in_target: HashSet<PkTuple> = [pk("5")].into_iter().collect();

    emit_sql(
        &HashSet::new(),
        &HashSet::new(),
        &missing_in_target,
        &["id".to_string()],
        &source_rows,
        &HashMap::new(),
        &source_out,
        &target_out,
        "public.accounts",
    )
    .await
    .unwrap();

    let source_contents = tokio::fs::read_to_string(&source_out).await.unwrap();
    assert_eq!(
        source_contents,
        "INSERT INTO public.accounts (id, name) VALUES ('5', 'e');\n"
    );

    let _ = tokio::fs::remove_file(&source_out).await;
    let _ = tokio::fs::remove_file(&target_out).await;
}

#[tokio::test]
async fn missing_in_source_emits_insert_from_target_row_into_target_file() {
    let (source_out, target_out) = scratch_paths();

    let mut target_rows = HashMap::new();
    target_rows.insert(pk("9"), row(&["id", "name"], &[Some("9"), Some("only-on-target")]));

    let missing_in_source: HashSet<PkTuple> = [pk("9")].into_iter().collect();

    emit_sql(
        &HashSet::new(),
        &missing_in_source,
        &HashSet::new(),
        &["id".to_string()],
        &HashMap::new(),
        &target_rows,
        &source_out,
        &target_out,
        "public.accounts",
    )
    .await
    .unwrap();

    let target_contents = tokio::fs::read_to_string(&target_out).await.unwrap();
    assert_eq!(
        target_contents,
        "INSERT INTO public.accounts (id, name) VALUES ('9', 'only-on-target');\n"
    );

    let _ = tokio::fs::remove_file(&source_out).await;
    let _ = tokio::fs::remove_file(&target_out).await;
}

#[tokio::test]
async fn embedded_quote_in_text_value_is_doubled() {
    let (source_out, target_out) = scratch_paths();

    let mut source_rows = HashMap::new();
    source_rows.insert(pk("1"), row(&["id", "name"], &[Some("1"), Some("O'Brien")]));
    let missing_in_target: HashSet<PkTuple> = [pk("1")].into_iter().collect();

    emit_sql(
        &HashSet::new(),
        &HashSet::new(),
        &missing_in_target,
        &["id".to_string()],
        &source_rows,
        &HashMap::new(),
        &source_out,
        &target_out,
        "public.accounts",
    )
    .await
    .unwrap();

    let source_contents = tokio::fs::read_to_string(&source_out).await.unwrap();
    assert_eq!(
        source_contents,
        "INSERT INTO public.accounts (id, name) VALUES ('1', 'O''Brien');\n"
    );

    let _ = tokio::fs::remove_file(&source_out).await;
    let _ = tokio::fs::remove_file(&target_out).await;
}

#[tokio::test]
async fn null_value_renders_as_sql_null() {
    let (source_out, target_out) = scratch_paths();

    let mut source_rows = HashMap::new();
    source_rows.insert(pk("1"), row(&["id", "name"], &[Some("1"), None]));
    let missing_in_target: HashSet<PkTuple> = [pk("1")].into_iter().collect();

    emit_sql(
        &HashSet::new(),
        &HashSet::new(),
        &missing_in_target,
        &["id".to_string()],
        &source_rows,
        &HashMap::new(),
        &source_out,
        &target_out,
        "public.accounts",
    )
    .await
    .unwrap();

    let source_contents = tokio::fs::read_to_string(&source_out).await.unwrap();
    assert_eq!(
        source_contents,
        "INSERT INTO public.accounts (id, name) VALUES ('1', NULL);\n"
    );

    let _ = tokio::fs::remove_file(&source_out).await;
    let _ = tokio::fs::remove_file(&target_out).await;
}
