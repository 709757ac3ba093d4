use super::*;
use crate::hash::compute_hash_from_bytes;
use std::sync::{Arc, Barrier};
use tempfile::TempDir;

fn setup_store() -> (TempDir, ContentStore) {
    let tmp = TempDir::new().unwrap();
    let store = ContentStore::new(tmp.path().join("gallery.db.mpa"));
    store.ensure_dirs().unwrap();
    (tmp, store)
}

fn write_temp(store: &ContentStore, name: &str, content: &[u8]) -> PathBuf {
    let path = store.upload_dir().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn count_files(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[test]
fn test_layout_is_sharded_by_hash_prefix() {
    let (_tmp, store) = setup_store();
    let hash = compute_hash_from_bytes(b"layout");

    let blob = store.blob_path(&hash).unwrap();
    assert_eq!(blob, store.root().join("images").join(&hash[..3]).join(&hash[3..]));

    let large = store.preview_path(&hash, PreviewSize::Large).unwrap();
    let thumb = store.preview_path(&hash, PreviewSize::Thumbnail).unwrap();
    let shard = store.root().join("preview").join(&hash[..3]);
    assert_eq!(large, shard.join(format!("{}.1", &hash[3..])));
    assert_eq!(thumb, shard.join(format!("{}.2", &hash[3..])));
}

#[test]
fn test_malformed_hash_never_becomes_a_path() {
    let (_tmp, store) = setup_store();
    assert!(store.blob_path("../../etc/passwd").is_err());
    assert!(store.preview_path("ab", PreviewSize::Large).is_err());
}

#[test]
fn test_ingest_renames_into_place() {
    let (_tmp, store) = setup_store();
    let content = b"first upload";
    let hash = compute_hash_from_bytes(content);
    let temp = write_temp(&store, "0", content);

    let outcome = store.ingest(&temp, &hash).unwrap();
    assert!(outcome.created);
    assert!(!temp.exists(), "temp file should have been renamed away");
    assert_eq!(std::fs::read(&outcome.path).unwrap(), content);
}

#[test]
fn test_ingest_existing_blob_is_dedup() {
    let (_tmp, store) = setup_store();
    let content = b"same bytes";
    let hash = compute_hash_from_bytes(content);

    let first = store.ingest(&write_temp(&store, "0", content), &hash).unwrap();
    let temp = write_temp(&store, "1", content);
    let second = store.ingest(&temp, &hash).unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.path, second.path);
    assert!(!temp.exists(), "dedup should discard the temp file");
    assert_eq!(count_files(store.images_dir()), 1);
}

#[test]
fn test_ingest_missing_temp_file_fails() {
    let (_tmp, store) = setup_store();
    let hash = compute_hash_from_bytes(b"never written");
    let missing = store.upload_dir().join("missing");

    assert!(store.ingest(&missing, &hash).is_err());
    assert!(!store.blob_path(&hash).unwrap().exists());
}

#[test]
fn test_serialized_concurrent_ingest_leaves_one_blob() {
    let (_tmp, store) = setup_store();
    let store = Arc::new(store);
    let lock = Arc::new(std::sync::Mutex::new(()));
    let content = b"raced content";
    let hash = compute_hash_from_bytes(content);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = Arc::clone(&store);
            let lock = Arc::clone(&lock);
            let barrier = Arc::clone(&barrier);
            let hash = hash.clone();
            let temp = write_temp(&store, &format!("race-{}", i), content);
            std::thread::spawn(move || {
                barrier.wait();
                let _guard = lock.lock().unwrap();
                store.ingest(&temp, &hash).unwrap().created
            })
        })
        .collect();

    let created: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();

    assert_eq!(created, 1);
    assert_eq!(count_files(store.images_dir()), 1);
    assert_eq!(count_files(store.upload_dir()), 0);
}

#[test]
fn test_orphan_paths_and_remove_if_exists() {
    let (_tmp, store) = setup_store();
    let hash = compute_hash_from_bytes(b"orphan");
    let paths = store.orphan_paths(&hash).unwrap();
    assert_eq!(paths.len(), 3);

    // Nothing on disk yet: removal is a no-op, not an error
    for path in &paths {
        assert!(!remove_file_if_exists(path).unwrap());
    }

    std::fs::create_dir_all(paths[0].parent().unwrap()).unwrap();
    std::fs::write(&paths[0], b"x").unwrap();
    assert!(remove_file_if_exists(&paths[0]).unwrap());
    assert!(!paths[0].exists());
}

#[test]
fn test_remove_blob_and_previews_tolerates_missing_files() {
    let (_tmp, store) = setup_store();
    let content = b"blob with one preview";
    let hash = compute_hash_from_bytes(content);
    store.ingest(&write_temp(&store, "0", content), &hash).unwrap();
    let large = store.preview_path(&hash, PreviewSize::Large).unwrap();
    std::fs::create_dir_all(large.parent().unwrap()).unwrap();
    std::fs::write(&large, b"jpeg").unwrap();

    assert_eq!(store.remove_blob_and_previews(&hash).unwrap(), 2);
    assert_eq!(count_files(store.root()), 0);
    assert_eq!(store.remove_blob_and_previews(&hash).unwrap(), 0);
}
