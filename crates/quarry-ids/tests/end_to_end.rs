//! End-to-end flow: an initial indexing run against a plain root, then an
//! incremental run staged through the tiered provider, with the id header
//! persisted as a side file between runs.

use std::path::PathBuf;
use std::sync::Arc;

use quarry_core::{DocRef, PartitionedHash, SearchType, ShortHash};
use quarry_ids::{load_header, save_header, StableIdHeader, StableIdStorage};
use quarry_store::TypedStore;
use quarry_vfs::{FileSystem, LocalFs, TieredFs};

fn open_storage(fs: Arc<dyn FileSystem>, header: StableIdHeader) -> StableIdStorage {
    // Surface store/vfs tracing when the suite runs with RUST_LOG set.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let store = TypedStore::open(fs, TypedStore::<PartitionedHash, DocRef>::config()).unwrap();
    StableIdStorage::new(store, header)
}

#[test]
fn ids_stay_stable_across_staged_incremental_runs() {
    let temp = tempfile::tempdir().unwrap();
    let snapshot = temp.path().join("snapshot");
    let staging = temp.path().join("staging");
    let header_path = temp.path().join("header.json");
    std::fs::create_dir_all(&snapshot).unwrap();
    std::fs::create_dir_all(&staging).unwrap();

    let file_a = ShortHash::of(b"src/Widget.java");
    let file_b = ShortHash::of(b"src/Frame.java");
    let file_c = ShortHash::of(b"src/Button.java");

    // First run: plain root, two files indexed.
    let (id_a, id_b) = {
        let storage = open_storage(Arc::new(LocalFs::new(&snapshot)), StableIdHeader::new());

        let (created_a, id_a) = storage.try_reserve(SearchType::TextSource, file_a).unwrap();
        let (created_b, id_b) = storage.try_reserve(SearchType::TextSource, file_b).unwrap();
        assert!(created_a && created_b);
        assert_ne!(id_a, id_b);

        storage.ensure_all_types();
        let header = storage.close().unwrap();
        save_header(&header_path, &header).unwrap();
        (id_a, id_b)
    };

    // Incremental run: the snapshot becomes the read-only backing layer and
    // all mutation stages into the overlay.
    {
        let header = load_header(&header_path).unwrap().unwrap();
        let tiered = Arc::new(TieredFs::new(&snapshot, &staging));
        let storage = open_storage(tiered, header);

        // Previously indexed entities resolve to their original ids without
        // re-reservation.
        let (created, again_a) = storage.try_reserve(SearchType::TextSource, file_a).unwrap();
        assert!(!created);
        assert_eq!(again_a, id_a);
        assert_eq!(
            storage.try_get(SearchType::TextSource, file_b).unwrap(),
            Some(id_b)
        );

        // A new entity gets a fresh id from the persisted counter.
        let (created, id_c) = storage.try_reserve(SearchType::TextSource, file_c).unwrap();
        assert!(created);
        assert_ne!(id_c, id_a);
        assert_ne!(id_c, id_b);

        let header = storage.close().unwrap();
        save_header(&header_path, &header).unwrap();
    }

    // The snapshot's store files were never mutated in place.
    let seg_1 = snapshot.join("kv/seg_1.kvs");
    assert!(seg_1.is_file());
}

#[test]
fn staged_run_reports_superseded_snapshot_files_as_deletions() {
    let temp = tempfile::tempdir().unwrap();
    let snapshot = temp.path().join("snapshot");
    let staging = temp.path().join("staging");
    std::fs::create_dir_all(&snapshot).unwrap();
    std::fs::create_dir_all(&staging).unwrap();

    {
        let storage = open_storage(Arc::new(LocalFs::new(&snapshot)), StableIdHeader::new());
        storage
            .try_reserve(SearchType::Definition, ShortHash::of(b"Widget"))
            .unwrap();
        storage.close().unwrap();
    }

    let tiered = Arc::new(TieredFs::new(&snapshot, &staging));
    let fs: Arc<dyn FileSystem> = tiered.clone();
    let store = TypedStore::<PartitionedHash, DocRef>::open(
        fs,
        TypedStore::<PartitionedHash, DocRef>::config(),
    )
    .unwrap();
    let storage = StableIdStorage::new(store, StableIdHeader::new());

    storage
        .try_reserve(SearchType::Definition, ShortHash::of(b"Frame"))
        .unwrap();
    let header = storage.close().unwrap();
    drop(header);

    // Close flushed and merged: the first run's segment is now logically
    // deleted in favor of the merged one staged in the overlay.
    let deletions = tiered.deletions();
    assert!(
        deletions.contains(&PathBuf::from("kv/seg_1.kvs")),
        "expected the superseded snapshot segment in {deletions:?}"
    );
    assert!(snapshot.join("kv/seg_1.kvs").is_file());
}

#[test]
fn header_side_file_survives_a_run_with_no_new_ids() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("store");
    let header_path = temp.path().join("header.json");
    std::fs::create_dir_all(&root).unwrap();

    {
        let storage = open_storage(Arc::new(LocalFs::new(&root)), StableIdHeader::new());
        storage
            .try_reserve(SearchType::Project, ShortHash::of(b"core"))
            .unwrap();
        storage.ensure_all_types();
        save_header(&header_path, &storage.header()).unwrap();
        storage.close().unwrap();
    }

    let header = load_header(&header_path).unwrap().unwrap();
    let storage = open_storage(Arc::new(LocalFs::new(&root)), header);
    let (created, _) = storage
        .try_reserve(SearchType::Project, ShortHash::of(b"core"))
        .unwrap();
    assert!(!created);

    let final_header = storage.close().unwrap();
    assert_eq!(
        final_header
            .allocator(SearchType::Project)
            .unwrap()
            .next_fresh(),
        2
    );
}
