use chainquery::fewshot::{Example, FewshotStore, ResultPreview, StoreError};

fn example(name: &str, sql: &str, notes: &str) -> Example {
    Example {
        name: name.into(),
        sql: sql.into(),
        preview: ResultPreview {
            columns: vec!["tx_count".into()],
            rows: vec![vec!["42".into()]],
            notes: notes.into(),
        },
    }
}

fn temp_store() -> (tempfile::TempDir, FewshotStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FewshotStore::new(dir.path().join("fewshots.json"));
    (dir, store)
}

#[test]
fn round_trip_preserves_fields_and_insertion_order() {
    let (_dir, store) = temp_store();

    assert!(store.add_example(example("first", "SELECT 1", "a")).expect("add"));
    assert!(store.add_example(example("second", "SELECT 2", "b")).expect("add"));
    let newest = example("third", "SELECT 3", "c");
    assert!(store.add_example(newest.clone()).expect("add"));

    let loaded = store.load().expect("load");
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0].name, "first");
    assert_eq!(loaded[1].name, "second");
    // The newest entry sits at the end with every field intact.
    assert_eq!(loaded[2], newest);
}

#[test]
fn duplicate_name_keeps_the_first_write() {
    let (_dir, store) = temp_store();

    assert!(store
        .add_example(example("tx count", "SELECT COUNT(*) AS tx_count FROM transactions", "v1"))
        .expect("add"));
    let inserted = store
        .add_example(example("tx count", "SELECT 999 AS tx_count", "v2"))
        .expect("second add is a no-op, not an error");
    assert!(!inserted);

    let loaded = store.load().expect("load");
    assert_eq!(loaded.len(), 1);
    assert_eq!(
        loaded[0].sql, "SELECT COUNT(*) AS tx_count FROM transactions",
        "later attempts are dropped, not merged"
    );
    assert_eq!(loaded[0].preview.notes, "v1");
}

#[test]
fn missing_file_loads_as_empty() {
    let (_dir, store) = temp_store();
    assert!(store.load().expect("load").is_empty());
}

#[test]
fn corrupt_file_fails_to_load() {
    let (dir, store) = temp_store();
    std::fs::write(dir.path().join("fewshots.json"), "{ not an array").expect("write");

    let err = store.load().unwrap_err();
    assert!(matches!(err, StoreError::Format(_)));
}

#[test]
fn corrupt_file_fails_add_rather_than_clobbering_it() {
    let (dir, store) = temp_store();
    let path = dir.path().join("fewshots.json");
    std::fs::write(&path, "{ not an array").expect("write");

    let err = store.add_example(example("q", "SELECT 1", "")).unwrap_err();
    assert!(matches!(err, StoreError::Format(_)));
    // The unreadable file is left as-is for inspection.
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "{ not an array");
}

#[test]
fn add_creates_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FewshotStore::new(dir.path().join("nested/deeper/fewshots.json"));
    assert!(store.add_example(example("q", "SELECT 1", "")).expect("add"));
    assert_eq!(store.load().expect("load").len(), 1);
}

#[test]
fn stored_file_uses_the_wire_format() {
    let (dir, store) = temp_store();
    store.add_example(example("q", "SELECT 1", "note")).expect("add");

    let raw = std::fs::read_to_string(dir.path().join("fewshots.json")).expect("read");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    let entry = &parsed.as_array().expect("array")[0];
    assert_eq!(entry["query_name"], "q");
    assert_eq!(entry["query_sql"], "SELECT 1");
    assert_eq!(entry["expected_result"]["notes"], "note");
    assert_eq!(entry["expected_result"]["rows"][0][0], "42");
}
