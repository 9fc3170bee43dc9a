use std::fmt;
use std::path::Path;
use std::sync::Arc;

use fetchlock_fs::StagedFile;
use fetchlock_verify::Integrity;

use crate::error::{FetchError, Result};
use crate::fetcher::{Fetcher, request_headers};
use crate::http::HttpClient;

/// Environment variable holding the cache bearer token.
pub const CACHE_TOKEN_ENV: &str = "FETCHLOCK_CACHE_TOKEN";

/// Bearer credential for the cache service. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheToken(String);

impl CacheToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads [`CACHE_TOKEN_ENV`]; an empty value counts as unset.
    pub fn from_env() -> Option<Self> {
        std::env::var(CACHE_TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .map(Self)
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CacheToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CacheToken(<redacted>)")
    }
}

/// `<base>/<integrity>`. Trailing slashes on the base are ignored.
pub fn object_url(base: &str, integrity: &Integrity) -> String {
    format!("{}/{}", base.trim_end_matches('/'), integrity)
}

/// Content-addressed object storage reached over plain HTTP verbs.
///
/// Reads and writes both require the token; without one every operation
/// fails before touching the network.
pub struct CacheClient<C: HttpClient> {
    fetcher: Arc<Fetcher<C>>,
    token:   Option<CacheToken>,
}

impl<C: HttpClient> CacheClient<C> {
    pub fn new(fetcher: Arc<Fetcher<C>>, token: Option<CacheToken>) -> Self {
        Self { fetcher, token }
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    fn token(&self, operation: &'static str) -> Result<&str> {
        self.token
            .as_ref()
            .map(CacheToken::expose)
            .ok_or(FetchError::MissingCredential { operation })
    }

    /// Download the object for `integrity` to `destination`.
    pub async fn get(&self, base: &str, integrity: &Integrity, destination: &Path) -> Result<u64> {
        let token = self.token("cache download")?;
        self.fetcher
            .fetch(&object_url(base, integrity), destination, Some(token))
            .await
    }

    /// Download the object for `integrity` into a staging file next to `target`.
    pub async fn get_staged(&self, base: &str, integrity: &Integrity, target: &Path) -> Result<StagedFile> {
        let token = self.token("cache download")?;
        self.fetcher
            .fetch_staged(&object_url(base, integrity), target, Some(token))
            .await
    }

    /// Upload `source` as the object for `integrity`.
    pub async fn put(&self, base: &str, integrity: &Integrity, source: &Path) -> Result<()> {
        let token = self.token("cache upload")?;
        let url = object_url(base, integrity);
        tracing::debug!(%url, "uploading to cache");
        self.fetcher
            .client()
            .put_file(&url, &request_headers(Some(token)), source)
            .await
            .map_err(|e| FetchError::request(&url, &e))
    }

    pub async fn delete(&self, base: &str, integrity: &Integrity) -> Result<()> {
        let token = self.token("cache delete")?;
        let url = object_url(base, integrity);
        tracing::debug!(%url, "deleting from cache");
        self.fetcher
            .client()
            .delete(&url, &request_headers(Some(token)))
            .await
            .map_err(|e| FetchError::request(&url, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        let integrity = Integrity::of_bytes(fetchlock_verify::Algorithm::Sha256, b"abcdef");
        let expected = format!("https://cache.local/objects/{integrity}");
        assert_eq!(object_url("https://cache.local/objects", &integrity), expected);
        assert_eq!(object_url("https://cache.local/objects/", &integrity), expected);
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = CacheToken::new("s3cret");
        assert!(!format!("{token:?}").contains("s3cret"));
    }
}
