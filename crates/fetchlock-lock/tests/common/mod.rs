#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fetchlock_fetch::{CacheToken, Fetcher, ReqwestClient};
use fetchlock_lock::{Context, Lock, Resource};
use fetchlock_verify::Integrity;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ABCDEF: &str = "sha256-vvV+x/U6bUC+tkCngKY5yDvCmsipgW8fxsXG3Nk8RyE=";
pub const TEST_CONTENT: &str = "sha256-auinVVUgn9bEQVfArtgBbnY/9DWhnPGG92hjFAFD/3I=";
pub const HELLO_WORLD: &str = "sha256-uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=";
pub const ABCDEG: &str = "sha256-paUR7FiZytq9xOK777EG5zHHGNLMAizw9I82TVHtArs=";

/// A port nothing listens on.
pub const UNREACHABLE: &str = "http://127.0.0.1:1/x";

pub const TOKEN: &str = "s3cret";

pub fn context(token: Option<&str>) -> Arc<Context<ReqwestClient>> {
    let client = ReqwestClient::new().unwrap();
    Arc::new(Context::new(Fetcher::new(client), token.map(CacheToken::new)))
}

pub fn resource(urls: &[&str], integrity: &str) -> Resource {
    Resource::new(urls.iter().map(|u| u.to_string()).collect(), Integrity::from(integrity))
}

/// Writes `resources` as a lock file in `dir` and opens it.
pub fn lock_with(dir: &Path, resources: &[Resource], ctx: Arc<Context<ReqwestClient>>) -> Lock<ReqwestClient> {
    let path = write_lock(dir, resources);
    Lock::open(path, false, ctx).unwrap()
}

pub fn write_lock(dir: &Path, resources: &[Resource]) -> PathBuf {
    let mut content = String::new();
    for resource in resources {
        content.push_str("[[Resource]]\n");
        content.push_str(&toml::to_string(resource).unwrap());
        content.push('\n');
    }
    let path = dir.join("fetchlock.lock");
    std::fs::write(&path, content).unwrap();
    path
}

/// Serves `body` on GET `route` and expects exactly `times` hits.
pub async fn serve(server: &MockServer, route: &str, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(times)
        .mount(server)
        .await;
}

pub fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path).unwrap()
}
