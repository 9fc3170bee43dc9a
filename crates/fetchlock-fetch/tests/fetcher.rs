use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fetchlock_fetch::{FetchError, Fetcher, ReqwestClient, staging_name};
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> Fetcher<ReqwestClient> {
    Fetcher::new(ReqwestClient::new().unwrap())
}

#[tokio::test]
async fn fetch_writes_body_to_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.txt"))
        .and(header("accept", "*/*"))
        .respond_with(ResponseTemplate::new(200).set_body_string("abcdef"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("file.txt");
    let written = fetcher()
        .fetch(&format!("{}/file.txt", server.uri()), &dest, None)
        .await
        .unwrap();

    assert_eq!(written, 6);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "abcdef");
}

#[tokio::test]
async fn fetch_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hidden"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("private");
    fetcher()
        .fetch(&format!("{}/private", server.uri()), &dest, Some("s3cret"))
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hidden");
}

#[tokio::test]
async fn fetch_error_status_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("missing");
    let url = format!("{}/missing", server.uri());
    let err = fetcher().fetch(&url, &dest, None).await.unwrap_err();

    match &err {
        FetchError::Request { url: failed, message } => {
            assert_eq!(failed, &url);
            assert!(message.contains("404"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("failed to download"));
    assert!(!dest.exists());
}

#[tokio::test]
async fn fetch_unreachable_host_is_request_error() {
    let dir = tempdir().unwrap();
    let err = fetcher()
        .fetch("http://127.0.0.1:1/x", &dir.path().join("x"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Request { .. }));
}

#[tokio::test]
async fn fetch_rejects_invalid_url() {
    let dir = tempdir().unwrap();
    let err = fetcher()
        .fetch("no scheme here", &dir.path().join("x"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl { .. }));
}

#[tokio::test]
async fn fetch_staged_stages_next_to_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("test content"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let url = format!("{}/a.bin", server.uri());
    let target = dir.path().join("a.bin");
    let staged = fetcher().fetch_staged(&url, &target, None).await.unwrap();

    assert_eq!(staged.path(), dir.path().join(staging_name(&url, &target)));
    assert_eq!(std::fs::read_to_string(staged.path()).unwrap(), "test content");

    let staged_path = staged.path().to_path_buf();
    drop(staged);
    assert!(!staged_path.exists());
}

#[tokio::test]
async fn same_url_for_two_targets_stages_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shared.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let url = format!("{}/shared.bin", server.uri());
    let fetcher = fetcher();
    let one = dir.path().join("one.bin");
    let two = dir.path().join("two.bin");
    let (first, second) = tokio::join!(
        fetcher.fetch_staged(&url, &one, None),
        fetcher.fetch_staged(&url, &two, None),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.path(), second.path());
    first.commit(&dir.path().join("one.bin")).unwrap();
    second.commit(&dir.path().join("two.bin")).unwrap();
    assert_eq!(std::fs::read_to_string(dir.path().join("one.bin")).unwrap(), "hello world");
    assert_eq!(std::fs::read_to_string(dir.path().join("two.bin")).unwrap(), "hello world");
}

#[tokio::test]
async fn fetch_to_temp_file_is_removed_on_drop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tmp.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .mount(&server)
        .await;

    let temp = fetcher()
        .fetch_to_temp_file(&format!("{}/tmp.bin", server.uri()), None)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&temp).unwrap(), "hello world");

    let temp_path = temp.to_path_buf();
    drop(temp);
    assert!(!temp_path.exists());
}

#[tokio::test]
async fn progress_callback_sees_every_byte() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p"))
        .respond_with(ResponseTemplate::new(200).set_body_string("test content"))
        .mount(&server)
        .await;

    let seen = Arc::new(AtomicU64::new(0));
    let counter = seen.clone();
    let fetcher = fetcher().with_progress(Arc::new(move |n| {
        counter.fetch_add(n, Ordering::SeqCst);
    }));

    let dir = tempdir().unwrap();
    fetcher
        .fetch(&format!("{}/p", server.uri()), &dir.path().join("p"), None)
        .await
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn content_length_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let result = fetcher().content_length(&format!("{}/gone", server.uri())).await;
    assert!(matches!(result, Err(FetchError::Request { .. })));
}
