// ==============================================
// FILE STORE PERSISTENCE (integration)
// ==============================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stashkit::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    name: String,
    count: u32,
}

fn sample() -> Payload {
    Payload {
        name: "alice".to_string(),
        count: 3,
    }
}

#[tokio::test]
async fn put_get_round_trips_up_to_entry_equality() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());

    store
        .put("user::1", Entry::new(sample(), Some(Duration::from_secs(300))))
        .await
        .unwrap();

    let entry: Entry<Payload> = store.get("user::1").await.unwrap().unwrap();
    assert_eq!(*entry.value(), sample());
    let remaining = entry.ttl_remaining().unwrap();
    assert!(remaining > Duration::from_secs(295));
    assert!(remaining <= Duration::from_secs(300));
}

#[tokio::test]
async fn filenames_are_base64url_of_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.put("users/1?weird key", Entry::permanent(sample())).await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|dirent| dirent.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with(".cache"));
    // URL-safe alphabet only, no padding.
    let stem = names[0].trim_end_matches(".cache");
    assert!(stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

    let keys = Store::<Payload>::keys(&store).await.unwrap();
    assert_eq!(keys, ["users/1?weird key"]);
}

#[tokio::test]
async fn custom_extensions_are_honored() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::with_extension(dir.path(), ".stash");
    store.put("k", Entry::permanent(sample())).await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|dirent| dirent.unwrap().file_name().into_string().unwrap())
        .collect();
    assert!(names[0].ends_with(".stash"));
    assert!(Store::<Payload>::contains_key(&store, "k").await.unwrap());
}

#[tokio::test]
async fn corrupt_files_are_deleted_and_read_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.put("k", Entry::permanent(sample())).await.unwrap();

    // Clobber the file mid-"write".
    let path = std::fs::read_dir(dir.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    std::fs::write(&path, "{\"value\": truncated").unwrap();

    let loaded: Option<Entry<Payload>> = store.get("k").await.unwrap();
    assert!(loaded.is_none());
    assert!(!path.exists());
    // Healed: the store no longer lists the key.
    assert_eq!(Store::<Payload>::len(&store).await.unwrap(), 0);
}

#[tokio::test]
async fn missing_directory_reads_as_empty_and_writes_create_it() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("does").join("not").join("exist");
    let store = FileStore::new(&nested);

    assert_eq!(Store::<Payload>::keys(&store).await.unwrap().len(), 0);
    assert!(Store::<Payload>::get(&store, "k").await.unwrap().is_none());

    store.put("k", Entry::permanent(sample())).await.unwrap();
    assert!(nested.is_dir());
    assert!(Store::<Payload>::contains_key(&store, "k").await.unwrap());
}

#[tokio::test]
async fn clear_removes_only_store_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.put("a", Entry::permanent(sample())).await.unwrap();
    store.put("b", Entry::permanent(sample())).await.unwrap();
    std::fs::write(dir.path().join("unrelated.txt"), "keep me").unwrap();

    Store::<Payload>::clear(&store).await.unwrap();
    assert_eq!(Store::<Payload>::len(&store).await.unwrap(), 0);
    assert!(dir.path().join("unrelated.txt").exists());
}

#[tokio::test]
async fn persisted_documents_use_the_wire_format() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store
        .put("k", Entry::new(sample(), Some(Duration::from_secs(60))))
        .await
        .unwrap();

    let path = std::fs::read_dir(dir.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

    assert!(document.get("value").is_some());
    assert!(document.get("createdAt").unwrap().is_string());
    assert!(document.get("expiresAt").unwrap().is_string());
}
