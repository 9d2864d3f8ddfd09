use bytes::Bytes;
use unicloud::object_store::{LocalStore, ObjectStore};

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from("hello world");
    store.put("user-1/test-key.bin", data.clone()).await.unwrap();

    let retrieved = store.get("user-1/test-key.bin").await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_local_store_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(!store.exists("user-1/missing.bin").await.unwrap());

    store.put("user-1/present.txt", Bytes::from("data")).await.unwrap();
    assert!(store.exists("user-1/present.txt").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("user-1/to-delete.txt", Bytes::from("data")).await.unwrap();
    assert!(store.exists("user-1/to-delete.txt").await.unwrap());

    store.delete("user-1/to-delete.txt").await.unwrap();
    assert!(!store.exists("user-1/to-delete.txt").await.unwrap());
}

#[tokio::test]
async fn test_local_store_delete_nonexistent() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    // Deleting a nonexistent key should not error
    store.delete("user-1/nonexistent").await.unwrap();
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.get("user-1/missing.bin").await;
    assert!(result.is_err());
    assert!(matches!(
        result.unwrap_err(),
        unicloud::object_store::ObjectStoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_local_store_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store.put("user-1/key", Bytes::from("first")).await.unwrap();
    store.put("user-1/key", Bytes::from("second")).await.unwrap();

    let data = store.get("user-1/key").await.unwrap();
    assert_eq!(data, Bytes::from("second"));
}

#[tokio::test]
async fn test_local_store_nested_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    store
        .put("12345/0f1e2d3c.pdf", Bytes::from("ciphertext"))
        .await
        .unwrap();
    assert!(dir.path().join("12345").join("0f1e2d3c.pdf").exists());
    assert_eq!(
        store.get("12345/0f1e2d3c.pdf").await.unwrap(),
        Bytes::from("ciphertext")
    );
}

#[tokio::test]
async fn test_local_store_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path().join("objects")).unwrap();

    for key in ["../outside", "a/../../b", "/absolute", "a//b", "", "a\\b"] {
        let result = store.put(key, Bytes::from("x")).await;
        assert!(
            matches!(
                result,
                Err(unicloud::object_store::ObjectStoreError::InvalidKey(_))
            ),
            "key {key:?} should be rejected"
        );
    }
    assert!(!dir.path().join("outside").exists());
}
