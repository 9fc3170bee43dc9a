use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// A boxed stream of response body chunks.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Asynchronous HTTP transport.
///
/// The fetch and cache layers only ever need these four verbs. Implementations
/// follow redirects, apply their own timeouts, and must report non-2xx
/// statuses as errors; a body is never handed out for a failed response.
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation using `reqwest`
/// - test doubles
///
/// [`ReqwestClient`]: crate::ReqwestClient
pub trait HttpClient: Send + Sync {
    /// Error type for HTTP operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue a GET and return the response body as a stream.
    ///
    /// # Errors
    ///
    /// DNS failure, connection error, or a non-success status.
    fn stream(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<BoxStream<'static, Result<Bytes, Self::Error>>, Self::Error>> + Send;

    /// Query Content-Length without downloading the body.
    ///
    /// `Ok(None)` when the server does not announce a length.
    fn head(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<Option<u64>, Self::Error>> + Send;

    /// Upload the file at `path` as the request body of a PUT.
    fn put_file(
        &self,
        url: &str,
        headers: &[(String, String)],
        path: &Path,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn delete(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    use futures_util::StreamExt;
    use reqwest::header::CONTENT_LENGTH;
    use reqwest::{Client, Proxy, RequestBuilder};
    use tokio_util::io::ReaderStream;
    use url::Url;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    pub enum ClientError {
        #[error(transparent)]
        Http(#[from] reqwest::Error),

        #[error("cannot read request body '{}': {source}", path.display())]
        Body {
            path:   PathBuf,
            #[source]
            source: io::Error,
        },
    }

    #[derive(Debug, thiserror::Error)]
    pub enum ClientConfigError {
        #[error("invalid proxy '{url}': {source}")]
        Proxy {
            url:    Url,
            #[source]
            source: reqwest::Error,
        },

        #[error("failed to build http client: {0}")]
        Build(#[source] reqwest::Error),
    }

    /// Settings for the shared HTTP client.
    ///
    /// `timeout` bounds a whole request including the body, so it stays unset
    /// by default; large artifacts would otherwise be cut off mid-stream.
    #[derive(Debug, Clone)]
    pub struct ClientConfig {
        pub connect_timeout: Option<Duration>,
        pub timeout:         Option<Duration>,
        pub proxies:         Vec<Url>,
        pub user_agent:      String,
    }

    impl Default for ClientConfig {
        fn default() -> Self {
            Self {
                connect_timeout: Some(Duration::from_secs(30)),
                timeout:         None,
                proxies:         Vec::new(),
                user_agent:      concat!("fetchlock/", env!("CARGO_PKG_VERSION")).to_string(),
            }
        }
    }

    impl ClientConfig {
        pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
            self.connect_timeout = Some(timeout);
            self
        }

        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = Some(timeout);
            self
        }

        pub fn with_proxy(mut self, proxy: Url) -> Self {
            self.proxies.push(proxy);
            self
        }

        pub fn build(self) -> Result<ReqwestClient, ClientConfigError> {
            let mut builder = Client::builder().user_agent(self.user_agent);
            if let Some(timeout) = self.connect_timeout {
                builder = builder.connect_timeout(timeout);
            }
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }

            let (secure, insecure): (Vec<Url>, Vec<Url>) =
                self.proxies.into_iter().partition(|u| u.scheme() == "https");
            for url in secure {
                let proxy = Proxy::https(url.as_str())
                    .map_err(|source| ClientConfigError::Proxy { url: url.clone(), source })?;
                builder = builder.proxy(proxy);
            }
            for url in insecure {
                let proxy = Proxy::http(url.as_str())
                    .map_err(|source| ClientConfigError::Proxy { url: url.clone(), source })?;
                builder = builder.proxy(proxy);
            }

            let client = builder.build().map_err(ClientConfigError::Build)?;
            Ok(ReqwestClient { client })
        }
    }

    /// Production HTTP client implementation using reqwest.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: Client,
    }

    impl ReqwestClient {
        /// Create a client with [`ClientConfig::default`].
        pub fn new() -> Result<Self, ClientConfigError> {
            ClientConfig::default().build()
        }
    }

    fn with_headers(mut request: RequestBuilder, headers: &[(String, String)]) -> RequestBuilder {
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        request
    }

    impl HttpClient for ReqwestClient {
        type Error = ClientError;

        async fn stream(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> Result<BoxStream<'static, Result<Bytes, Self::Error>>, Self::Error> {
            let response = with_headers(self.client.get(url), headers)
                .send()
                .await?
                .error_for_status()?;

            let stream = response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from));
            Ok(Box::pin(stream))
        }

        async fn head(&self, url: &str, headers: &[(String, String)]) -> Result<Option<u64>, Self::Error> {
            let response = with_headers(self.client.head(url), headers)
                .send()
                .await?
                .error_for_status()?;

            let content_length = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());

            Ok(content_length)
        }

        async fn put_file(&self, url: &str, headers: &[(String, String)], path: &Path) -> Result<(), Self::Error> {
            let body_error = |source| ClientError::Body {
                path: path.to_path_buf(),
                source,
            };
            let file = tokio::fs::File::open(path).await.map_err(body_error)?;
            let len = file.metadata().await.map_err(body_error)?.len();

            let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
            with_headers(self.client.put(url), headers)
                .header(CONTENT_LENGTH, len)
                .body(body)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }

        async fn delete(&self, url: &str, headers: &[(String, String)]) -> Result<(), Self::Error> {
            with_headers(self.client.delete(url), headers)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }
    }

}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{ClientConfig, ClientConfigError, ClientError, ReqwestClient};
