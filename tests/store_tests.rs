use keyword_scan::store::{load_targets_from_path, JsonFileStore, UrlStore};
use keyword_scan::types::{ScanStatus, ScanSummary};

fn summary(id: &str) -> ScanSummary {
    ScanSummary {
        id: id.to_string(),
        keywords: vec!["admin".into()],
        urls_scanned: vec!["example.onion".into()],
        matches: Vec::new(),
        errors: Vec::new(),
        status: ScanStatus::Complete,
        started_at: "2024-01-01T00:00:00Z".into(),
        completed_at: Some("2024-01-01T00:00:01Z".into()),
    }
}

#[tokio::test]
async fn missing_files_read_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("urls.json"), dir.path().join("history.json"));
    assert!(store.enabled_urls().await.unwrap().is_empty());
    assert!(store.history().await.unwrap().is_empty());
}

#[tokio::test]
async fn only_enabled_urls_are_returned() {
    let dir = tempfile::tempdir().unwrap();
    let urls_path = dir.path().join("urls.json");
    std::fs::write(
        &urls_path,
        r#"[
            {"id": "1", "url": "a.onion", "name": "A", "status": "enabled", "addedAt": "2024-01-01T00:00:00"},
            {"id": "2", "url": "b.onion", "name": "B", "status": "disabled"},
            {"url": " c.onion "}
        ]"#,
    )
    .unwrap();
    let store = JsonFileStore::new(&urls_path, dir.path().join("history.json"));
    assert_eq!(store.enabled_urls().await.unwrap(), vec!["a.onion", "c.onion"]);
}

#[tokio::test]
async fn invalid_url_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let urls_path = dir.path().join("urls.json");
    std::fs::write(&urls_path, "{not json").unwrap();
    let store = JsonFileStore::new(&urls_path, dir.path().join("history.json"));
    let err = store.enabled_urls().await.unwrap_err();
    assert!(format!("{err:#}").contains("invalid JSON"));
}

#[tokio::test]
async fn history_appends_and_lists_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");
    let store = JsonFileStore::new(dir.path().join("urls.json"), &history_path);

    store.record_scan(summary("first")).await.unwrap();
    store.record_scan(summary("second")).await.unwrap();

    let ids: Vec<_> = store.history().await.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["second", "first"]);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&history_path).unwrap()).unwrap();
    assert_eq!(raw.as_array().map(Vec::len), Some(2));
    assert_eq!(raw[0]["urlsScanned"][0], "example.onion");
}

#[test]
fn targets_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("targets.txt");
    std::fs::write(&path, "# targets\nexample.onion\n\nhttps://b.test\n").unwrap();
    assert_eq!(
        load_targets_from_path(&path).unwrap(),
        vec!["example.onion", "https://b.test"]
    );
}
