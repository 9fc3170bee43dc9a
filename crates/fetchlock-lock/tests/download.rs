mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use fetchlock_lock::{DownloadEvent, DownloadOptions, Error, ExistingFilePolicy, Source, ops};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test(flavor = "multi_thread")]
async fn second_download_does_no_network_io() {
    let server = MockServer::start().await;
    serve(&server, "/a.txt", "abcdef", 1).await;
    serve(&server, "/b.txt", "test content", 1).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(
        lock_dir.path(),
        &[
            resource(&[&format!("{}/a.txt", server.uri())], ABCDEF),
            resource(&[&format!("{}/b.txt", server.uri())], TEST_CONTENT),
        ],
        context(None),
    );

    let first = lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    assert!(first.placements.iter().all(|p| matches!(p.source, Source::Origin(_))));

    let second = lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    assert_eq!(second.placements.len(), 2);
    assert!(second.placements.iter().all(|p| p.source == Source::Local));

    assert_eq!(read(out.path().join("a.txt")), "abcdef");
    assert_eq!(read(out.path().join("b.txt")), "test content");
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_mirror_falls_back_to_next() {
    let server = MockServer::start().await;
    serve(&server, "/x", "abcdef", 1).await;

    let good = format!("{}/x", server.uri());
    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &[resource(&[UNREACHABLE, &good], ABCDEF)], context(None));

    let report = lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    assert_eq!(report.placements[0].source, Source::Origin(good));
    assert_eq!(report.placements[0].url, UNREACHABLE);
    assert_eq!(read(out.path().join("x")), "abcdef");
}

#[tokio::test(flavor = "multi_thread")]
async fn mismatching_mirror_falls_back_to_next() {
    let server = MockServer::start().await;
    serve(&server, "/bad/x", "abcdeg", 1).await;
    serve(&server, "/good/x", "abcdef", 1).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(
        lock_dir.path(),
        &[resource(
            &[&format!("{}/bad/x", server.uri()), &format!("{}/good/x", server.uri())],
            ABCDEF,
        )],
        context(None),
    );

    lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    assert_eq!(read(out.path().join("x")), "abcdef");
}

#[tokio::test(flavor = "multi_thread")]
async fn bogus_integrity_fails_without_leaving_files() {
    let server = MockServer::start().await;
    serve(&server, "/x", "abcdef", 1).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(
        lock_dir.path(),
        &[resource(&[&format!("{}/x", server.uri())], "sha256-bogus")],
        context(None),
    );

    let err = lock.download(out.path(), DownloadOptions::default()).await.unwrap_err();
    assert!(err.to_string().contains("integrity mismatch"), "{err}");
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn all_mirrors_failing_reports_first_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let second = format!("{}/missing", server.uri());
    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &[resource(&[UNREACHABLE, &second], ABCDEF)], context(None));

    let err = lock.download(out.path(), DownloadOptions::default()).await.unwrap_err();
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    match &failures[0].error {
        Error::Fetch(fetch) => assert!(fetch.to_string().contains("127.0.0.1:1"), "{fetch}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tags_select_resources() {
    let server = MockServer::start().await;
    serve(&server, "/both", "abcdef", 2).await;
    serve(&server, "/other", "test content", 2).await;

    let mut both = resource(&[&format!("{}/both", server.uri())], ABCDEF);
    both.tags = vec!["tag1".into(), "tag2".into()];
    let mut other = resource(&[&format!("{}/other", server.uri())], TEST_CONTENT);
    other.tags = vec!["tag3".into()];

    let lock_dir = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &[both, other], context(None));

    let out = tempdir().unwrap();
    let report = lock
        .download(out.path(), DownloadOptions::default().with_required_tags(["tag1"]))
        .await
        .unwrap();
    assert_eq!(report.placements.len(), 1);
    assert!(out.path().join("both").exists());
    assert!(!out.path().join("other").exists());

    let out = tempdir().unwrap();
    lock.download(out.path(), DownloadOptions::default().with_excluded_tags(["tag1"]))
        .await
        .unwrap();
    assert!(!out.path().join("both").exists());
    assert!(out.path().join("other").exists());

    let out = tempdir().unwrap();
    let report = lock
        .download(
            out.path(),
            DownloadOptions::default()
                .with_required_tags(["tag1"])
                .with_excluded_tags(["tag2"]),
        )
        .await;
    assert!(matches!(report, Err(Error::NothingToDownload)));

    let out = tempdir().unwrap();
    lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    assert!(out.path().join("both").exists());
    assert!(out.path().join("other").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_selection_is_nothing_to_download() {
    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &[resource(&[UNREACHABLE], ABCDEF)], context(None));

    let result = lock
        .download(out.path(), DownloadOptions::default().with_required_tags(["nope"]))
        .await;
    assert!(matches!(result, Err(Error::NothingToDownload)));
}

#[tokio::test(flavor = "multi_thread")]
async fn target_must_be_a_directory() {
    let lock_dir = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &[resource(&[UNREACHABLE], ABCDEF)], context(None));

    let file = lock_dir.path().join("fetchlock.lock");
    let result = lock.download(&file, DownloadOptions::default()).await;
    assert!(matches!(result, Err(Error::NotADirectory { .. })));

    let missing = lock_dir.path().join("nope");
    let result = lock.download(&missing, DownloadOptions::default()).await;
    assert!(matches!(result, Err(Error::NotADirectory { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_batch_failure_reports_every_failure() {
    let server = MockServer::start().await;
    serve(&server, "/ok1", "abcdef", 1).await;
    serve(&server, "/ok2", "test content", 1).await;
    serve(&server, "/ok3", "hello world", 1).await;
    serve(&server, "/corrupt", "abcdeg", 1).await;

    let uri = server.uri();
    let resources = [
        resource(&[&format!("{uri}/ok1")], ABCDEF),
        resource(&[&format!("{uri}/gone")], ABCDEF),
        resource(&[&format!("{uri}/ok2")], TEST_CONTENT),
        resource(&[&format!("{uri}/corrupt")], ABCDEF),
        resource(&[&format!("{uri}/ok3")], HELLO_WORLD),
    ];
    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &resources, context(None));

    let err = lock.download(out.path(), DownloadOptions::default()).await.unwrap_err();
    let failed: Vec<_> = err.failures().iter().map(|f| f.url.clone()).collect();
    assert_eq!(failed, vec![format!("{uri}/gone"), format!("{uri}/corrupt")]);

    let text = err.to_string();
    assert!(text.starts_with("2 resources failed"), "{text}");
    assert!(text.contains("/gone"));
    assert!(text.contains("/corrupt"));
    assert!(text.contains("integrity mismatch"));

    assert_eq!(read(out.path().join("ok1")), "abcdef");
    assert_eq!(read(out.path().join("ok2")), "test content");
    assert_eq!(read(out.path().join("ok3")), "hello world");
    assert!(!out.path().join("gone").exists());
    assert!(!out.path().join("corrupt").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_existing_file_is_an_error_by_default() {
    let server = MockServer::start().await;
    serve(&server, "/x", "abcdef", 0).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    std::fs::write(out.path().join("x"), "user edits").unwrap();
    let lock = lock_with(lock_dir.path(), &[resource(&[&format!("{}/x", server.uri())], ABCDEF)], context(None));

    let err = lock.download(out.path(), DownloadOptions::default()).await.unwrap_err();
    assert!(matches!(err.failures()[0].error, Error::ExistingFileCorrupt { .. }));
    assert_eq!(read(out.path().join("x")), "user edits");
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_existing_file_is_replaced_on_request() {
    let server = MockServer::start().await;
    serve(&server, "/x", "abcdef", 1).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    std::fs::write(out.path().join("x"), "user edits").unwrap();
    let lock = lock_with(lock_dir.path(), &[resource(&[&format!("{}/x", server.uri())], ABCDEF)], context(None));

    let options = DownloadOptions::default().with_existing(ExistingFilePolicy::Replace);
    lock.download(out.path(), options).await.unwrap();
    assert_eq!(read(out.path().join("x")), "abcdef");
}

#[tokio::test(flavor = "multi_thread")]
async fn dynamic_resource_is_fetched_every_time() {
    let server = MockServer::start().await;
    serve(&server, "/latest", "abcdef", 2).await;

    let mut latest = resource(&[&format!("{}/latest", server.uri())], ABCDEF);
    latest.dynamic = true;
    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &[latest], context(None));

    lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    let report = lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    assert!(matches!(report.placements[0].source, Source::Origin(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn explicit_filename_names_the_target() {
    let server = MockServer::start().await;
    serve(&server, "/download", "abcdef", 1).await;

    let mut r = resource(&[&format!("{}/download", server.uri())], ABCDEF);
    r.filename = Some("tool.bin".into());
    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &[r], context(None));

    lock.download(out.path(), DownloadOptions::default()).await.unwrap();
    assert_eq!(read(out.path().join("tool.bin")), "abcdef");
    assert!(!out.path().join("download").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_batch_reports_every_resource() {
    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(
        lock_dir.path(),
        &[
            resource(&["http://127.0.0.1:1/a"], ABCDEF),
            resource(&["http://127.0.0.1:1/b"], ABCDEF),
        ],
        context(None),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = lock
        .download(out.path(), DownloadOptions::default().with_cancel(cancel))
        .await
        .unwrap_err();
    assert_eq!(err.failures().len(), 2);
    assert!(err.failures().iter().all(|f| matches!(f.error, Error::Cancelled)));
}

#[tokio::test(flavor = "multi_thread")]
async fn bounded_batch_places_everything() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let mut resources = Vec::new();
    for i in 0..4 {
        serve(&server, &format!("/f{i}"), "abcdef", 1).await;
        resources.push(resource(&[&format!("{uri}/f{i}")], ABCDEF));
    }

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(lock_dir.path(), &resources, context(None));

    let report = lock
        .download(out.path(), DownloadOptions::default().with_max_concurrent(1))
        .await
        .unwrap();
    let urls: Vec<_> = report.placements.iter().map(|p| p.url.clone()).collect();
    let expected: Vec<_> = (0..4).map(|i| format!("{uri}/f{i}")).collect();
    assert_eq!(urls, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn observer_sees_start_and_outcome() {
    let server = MockServer::start().await;
    serve(&server, "/ok", "abcdef", 1).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock = lock_with(
        lock_dir.path(),
        &[
            resource(&[&format!("{}/ok", server.uri())], ABCDEF),
            resource(&[UNREACHABLE], ABCDEF),
        ],
        context(None),
    );

    let started = Arc::new(AtomicUsize::new(0));
    let placed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let (s, p, f) = (started.clone(), placed.clone(), failed.clone());
    let options = DownloadOptions::default().with_observer(Arc::new(move |event: &DownloadEvent| {
        let counter = match event {
            DownloadEvent::Started { .. } => &s,
            DownloadEvent::Placed(_) => &p,
            DownloadEvent::Failed { .. } => &f,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(lock.download(out.path(), options).await.is_err());
    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(placed.load(Ordering::SeqCst), 1);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_permission_fails_before_network() {
    let server = MockServer::start().await;
    serve(&server, "/x", "abcdef", 0).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock_path = write_lock(lock_dir.path(), &[resource(&[&format!("{}/x", server.uri())], ABCDEF)]);

    let result = ops::download(context(None), &lock_path, out.path(), "9z", DownloadOptions::default()).await;
    assert!(matches!(result, Err(Error::Fs(_))));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn permission_mode_is_applied() {
    use std::os::unix::fs::PermissionsExt;

    let server = MockServer::start().await;
    serve(&server, "/x", "abcdef", 1).await;

    let lock_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let lock_path = write_lock(lock_dir.path(), &[resource(&[&format!("{}/x", server.uri())], ABCDEF)]);

    ops::download(context(None), &lock_path, out.path(), "600", DownloadOptions::default())
        .await
        .unwrap();
    let mode = std::fs::metadata(out.path().join("x")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    // A verified local file still gets the requested mode.
    ops::download(context(None), &lock_path, out.path(), "640", DownloadOptions::default())
        .await
        .unwrap();
    let mode = std::fs::metadata(out.path().join("x")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
}
