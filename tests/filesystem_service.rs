mod common;

use common::{FlakyStore, ROOT, file, local_store, read_string, service_with_root};
use cloud_storage::{
    models::resource::ResourceKind,
    services::filesystem::FileSystemService,
    store::{ObjectStore, StorageError},
};
use std::io::{Cursor, Read};

#[tokio::test]
async fn upload_creates_markers_and_listing_shows_one_level() {
    let (service, _dir) = service_with_root().await;

    let uploaded = service
        .upload_resource(vec![file("docs/readme.md", "hello")], ROOT)
        .await
        .unwrap();
    assert_eq!(uploaded.len(), 2);
    assert_eq!(uploaded[0].full_path(), "user-7-files/docs/");
    assert_eq!(uploaded[1].full_path(), "user-7-files/docs/readme.md");
    assert_eq!(uploaded[1].size, Some(5));

    let store = service.store();
    assert!(store.object_exists("user-7-files/docs/").await.unwrap());
    assert!(store.object_exists("user-7-files/docs/readme.md").await.unwrap());

    let root = service.get_directory_info(ROOT).await.unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].name, "docs/");
    assert_eq!(root[0].kind, ResourceKind::Directory);

    let docs = service.get_directory_info("user-7-files/docs/").await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "readme.md");
    assert_eq!(docs[0].size, Some(5));
    assert_eq!(docs[0].path, "user-7-files/docs/");
}

#[tokio::test]
async fn create_directory_requires_parent() {
    let (service, _dir) = service_with_root().await;

    let err = service
        .create_directory("user-7-files/missing/sub/")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(ref key) if key == "user-7-files/missing/"));

    let created = service.create_directory("user-7-files/music/").await.unwrap();
    assert_eq!(created.name, "music/");
    assert_eq!(created.size, None);

    let again = service.create_directory("user-7-files/music/").await.unwrap_err();
    assert!(matches!(again, StorageError::AlreadyExists(_)));
}

#[tokio::test]
async fn directory_info_of_missing_folder_is_not_found() {
    let (service, _dir) = service_with_root().await;
    let err = service
        .get_directory_info("user-7-files/nope/")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn delete_folder_removes_everything_beneath_it() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(
            vec![file("docs/readme.md", "hello"), file("docs/deep/x.txt", "x")],
            ROOT,
        )
        .await
        .unwrap();

    service.delete_resource("user-7-files/docs/").await.unwrap();

    let store = service.store();
    for key in [
        "user-7-files/docs/",
        "user-7-files/docs/readme.md",
        "user-7-files/docs/deep/",
        "user-7-files/docs/deep/x.txt",
    ] {
        assert!(!store.object_exists(key).await.unwrap(), "{key} survived");
    }
    assert!(store.object_exists(ROOT).await.unwrap());

    let err = service.delete_resource("user-7-files/docs/").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn move_refuses_existing_destination() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(vec![file("a.txt", "alpha"), file("b.txt", "beta")], ROOT)
        .await
        .unwrap();

    let err = service
        .move_resource("user-7-files/a.txt", "user-7-files/b.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(_)));

    let store = service.store();
    assert_eq!(read_string(store, "user-7-files/a.txt").await, "alpha");
    assert_eq!(read_string(store, "user-7-files/b.txt").await, "beta");
}

#[tokio::test]
async fn move_rejects_subtree_cycles() {
    let (service, _dir) = service_with_root().await;
    service.create_directory("user-7-files/a/").await.unwrap();

    for to in ["user-7-files/a/b/", "user-7-files/a/"] {
        let err = service
            .move_resource("user-7-files/a/", to)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)), "{to}");
    }
    assert!(service.store().object_exists("user-7-files/a/").await.unwrap());
}

#[tokio::test]
async fn move_checks_source_and_destination_parent() {
    let (service, _dir) = service_with_root().await;

    let missing_source = service
        .move_resource("user-7-files/ghost.txt", "user-7-files/new.txt")
        .await
        .unwrap_err();
    assert!(matches!(missing_source, StorageError::NotFound(ref key) if key == "user-7-files/ghost.txt"));

    service
        .upload_resource(vec![file("a.txt", "alpha")], ROOT)
        .await
        .unwrap();
    let missing_parent = service
        .move_resource("user-7-files/a.txt", "user-7-files/nowhere/a.txt")
        .await
        .unwrap_err();
    assert!(matches!(missing_parent, StorageError::NotFound(ref key) if key == "user-7-files/nowhere/"));
}

#[tokio::test]
async fn move_file_preserves_content() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(vec![file("a.txt", "alpha")], ROOT)
        .await
        .unwrap();
    let before = service.get_resource_info("user-7-files/a.txt").await.unwrap();

    let moved = service
        .move_resource("user-7-files/a.txt", "user-7-files/renamed.txt")
        .await
        .unwrap();
    assert_eq!(moved.name, "renamed.txt");
    assert_eq!(moved.size, before.size);

    let store = service.store();
    assert!(!store.object_exists("user-7-files/a.txt").await.unwrap());
    let after = service
        .get_resource_info("user-7-files/renamed.txt")
        .await
        .unwrap();
    assert_eq!(after.size, Some(5));
    assert_eq!(read_string(store, "user-7-files/renamed.txt").await, "alpha");
}

#[tokio::test]
async fn move_folder_carries_its_members() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(
            vec![file("src/a.txt", "alpha"), file("src/nested/b.txt", "beta")],
            ROOT,
        )
        .await
        .unwrap();

    let moved = service
        .move_resource("user-7-files/src/", "user-7-files/dst/")
        .await
        .unwrap();
    assert_eq!(moved.kind, ResourceKind::Directory);
    assert_eq!(moved.name, "dst/");

    let store = service.store();
    assert!(!store.object_exists("user-7-files/src/").await.unwrap());
    assert!(!store.object_exists("user-7-files/src/a.txt").await.unwrap());
    assert!(store.object_exists("user-7-files/dst/nested/").await.unwrap());
    assert_eq!(read_string(store, "user-7-files/dst/a.txt").await, "alpha");
    assert_eq!(read_string(store, "user-7-files/dst/nested/b.txt").await, "beta");
}

#[tokio::test]
async fn upload_collision_aborts_whole_batch() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(vec![file("B.txt", "old")], ROOT)
        .await
        .unwrap();

    let err = service
        .upload_resource(vec![file("A.txt", "new a"), file("B.txt", "new b")], ROOT)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(ref key) if key == "user-7-files/B.txt"));

    let store = service.store();
    assert!(!store.object_exists("user-7-files/A.txt").await.unwrap());
    assert_eq!(read_string(store, "user-7-files/B.txt").await, "old");
}

#[tokio::test]
async fn upload_rejects_duplicates_and_empty_batches() {
    let (service, _dir) = service_with_root().await;

    let dup = service
        .upload_resource(vec![file("a.txt", "1"), file("./a.txt", "2")], ROOT)
        .await
        .unwrap_err();
    assert!(matches!(dup, StorageError::AlreadyExists(_)));

    let empty = service.upload_resource(vec![], ROOT).await.unwrap_err();
    assert!(matches!(empty, StorageError::InvalidArgument(_)));

    let escape = service
        .upload_resource(vec![file("../other.txt", "x")], ROOT)
        .await
        .unwrap_err();
    assert!(matches!(escape, StorageError::InvalidArgument(_)));
}

#[tokio::test]
async fn upload_tolerates_a_failing_member() {
    let (local, _dir) = local_store().await;
    let store = FlakyStore::new(local);
    let service = FileSystemService::new(store.clone());
    service.create_root_directory_for_user(7).await.unwrap();
    store.fail_put("user-7-files/B.txt");

    let uploaded = service
        .upload_resource(vec![file("A.txt", "a"), file("B.txt", "b")], ROOT)
        .await
        .unwrap();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].name, "A.txt");

    assert!(store.object_exists("user-7-files/A.txt").await.unwrap());
    assert!(!store.object_exists("user-7-files/B.txt").await.unwrap());
}

#[tokio::test]
async fn upload_fails_when_no_file_could_be_stored() {
    let (local, _dir) = local_store().await;
    let store = FlakyStore::new(local);
    let service = FileSystemService::new(store.clone());
    service.create_root_directory_for_user(7).await.unwrap();
    store.fail_put("user-7-files/A.txt");

    let err = service
        .upload_resource(vec![file("A.txt", "a")], ROOT)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Connection { .. }));
}

#[tokio::test]
async fn search_is_case_insensitive_substring() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(
            vec![file("notes/Proxy.md", "p"), file("other.txt", "o")],
            ROOT,
        )
        .await
        .unwrap();

    let found = service.search_resources_by_query("prox", ROOT).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Proxy.md");
    assert_eq!(found[0].path, "user-7-files/notes/");

    let folders = service.search_resources_by_query("NOTES", ROOT).await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].kind, ResourceKind::Directory);
}

#[tokio::test]
async fn file_download_streams_payload() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(vec![file("docs/readme.md", "hello")], ROOT)
        .await
        .unwrap();

    let download = service
        .download_resource("user-7-files/docs/readme.md")
        .await
        .unwrap();
    assert_eq!(download.filename(), "readme.md");

    let mut out = Vec::new();
    let sent = download.stream_to(&mut out).await.unwrap();
    assert_eq!(sent, 5);
    assert_eq!(out, b"hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn folder_download_is_a_zip_of_the_subtree() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(
            vec![file("docs/readme.md", "hello"), file("docs/sub/x.txt", "x")],
            ROOT,
        )
        .await
        .unwrap();
    service.create_directory("user-7-files/docs/empty/").await.unwrap();

    let download = service.download_resource("user-7-files/docs/").await.unwrap();
    assert_eq!(download.filename(), "docs.zip");
    assert_eq!(download.content_type(), "application/zip");

    let mut out = Vec::new();
    download.stream_to(&mut out).await.unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(out)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["empty/", "readme.md", "sub/", "sub/x.txt"]);

    let mut contents = String::new();
    archive
        .by_name("readme.md")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "hello");
}

#[tokio::test]
async fn download_of_missing_resource_is_not_found() {
    let (service, _dir) = service_with_root().await;
    let err = service
        .download_resource("user-7-files/ghost/")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn failed_source_removal_rolls_back_the_copy() {
    let (local, _dir) = local_store().await;
    let store = FlakyStore::new(local);
    let service = FileSystemService::new(store.clone());
    service.create_root_directory_for_user(7).await.unwrap();
    service
        .upload_resource(vec![file("a.txt", "alpha")], ROOT)
        .await
        .unwrap();
    store.fail_remove("user-7-files/a.txt");

    let err = service
        .move_resource("user-7-files/a.txt", "user-7-files/b.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Connection { .. }));

    assert!(!store.object_exists("user-7-files/b.txt").await.unwrap());
    assert_eq!(read_string(store.inner(), "user-7-files/a.txt").await, "alpha");
}

#[tokio::test]
async fn failed_copy_leaves_no_partial_destination() {
    let (local, _dir) = local_store().await;
    let store = FlakyStore::new(local);
    let service = FileSystemService::new(store.clone());
    service.create_root_directory_for_user(7).await.unwrap();
    service
        .upload_resource(vec![file("src/a.txt", "a"), file("src/b.txt", "b")], ROOT)
        .await
        .unwrap();
    store.fail_copy("user-7-files/dst/b.txt");

    let err = service
        .move_resource("user-7-files/src/", "user-7-files/dst/")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Connection { .. }));

    let leftovers = store.list_objects("user-7-files/dst/", true).await.unwrap();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    assert!(store.object_exists("user-7-files/src/b.txt").await.unwrap());
}

#[tokio::test]
async fn dotted_names_are_ordinary_names() {
    let (service, _dir) = service_with_root().await;

    let uploaded = service
        .upload_resource(vec![file("ok.txt", "ok"), file("notes..txt", "n")], ROOT)
        .await
        .unwrap();
    let names: Vec<&str> = uploaded.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["ok.txt", "notes..txt"]);

    let created = service.create_directory("user-7-files/v1..2/").await.unwrap();
    assert_eq!(created.name, "v1..2/");
    service
        .upload_resource(vec![file("v1..2.txt", "v")], "user-7-files/v1..2/")
        .await
        .unwrap();
    assert_eq!(
        read_string(service.store(), "user-7-files/v1..2/v1..2.txt").await,
        "v"
    );
}

#[tokio::test]
async fn folder_delete_continues_past_a_failing_member() {
    let (local, _dir) = local_store().await;
    let store = FlakyStore::new(local);
    let service = FileSystemService::new(store.clone());
    service.create_root_directory_for_user(7).await.unwrap();
    service
        .upload_resource(
            vec![file("docs/a.txt", "a"), file("docs/b.txt", "b"), file("docs/sub/c.txt", "c")],
            ROOT,
        )
        .await
        .unwrap();
    store.fail_remove("user-7-files/docs/a.txt");

    service.delete_resource("user-7-files/docs/").await.unwrap();

    assert!(store.object_exists("user-7-files/docs/a.txt").await.unwrap());
    for key in [
        "user-7-files/docs/",
        "user-7-files/docs/b.txt",
        "user-7-files/docs/sub/",
        "user-7-files/docs/sub/c.txt",
    ] {
        assert!(!store.object_exists(key).await.unwrap(), "{key} survived");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn folder_download_skips_unreadable_member() {
    let (local, _dir) = local_store().await;
    let store = FlakyStore::new(local);
    let service = FileSystemService::new(store.clone());
    service.create_root_directory_for_user(7).await.unwrap();
    service
        .upload_resource(
            vec![file("docs/a.txt", "a"), file("docs/b.txt", "bee")],
            ROOT,
        )
        .await
        .unwrap();
    store.fail_get("user-7-files/docs/a.txt");

    let download = service.download_resource("user-7-files/docs/").await.unwrap();
    let mut out = Vec::new();
    download.stream_to(&mut out).await.unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(out)).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert_eq!(names, vec!["b.txt"]);
    let mut contents = String::new();
    archive
        .by_name("b.txt")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "bee");
}

#[tokio::test(flavor = "multi_thread")]
async fn folder_download_stops_when_client_goes_away() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(vec![file("docs/readme.md", "hello")], ROOT)
        .await
        .unwrap();

    let (sink, client) = tokio::io::duplex(16);
    drop(client);
    let download = service.download_resource("user-7-files/docs/").await.unwrap();
    let err = download.stream_to(sink).await.unwrap_err();
    assert!(matches!(err, StorageError::Connection { op: "download", .. }));
}

#[tokio::test]
async fn search_ignores_the_folder_separator() {
    let (service, _dir) = service_with_root().await;
    service
        .upload_resource(vec![file("docs/readme.md", "hello")], ROOT)
        .await
        .unwrap();

    let found = service.search_resources_by_query("/", ROOT).await.unwrap();
    assert!(found.is_empty(), "{found:?}");
}
