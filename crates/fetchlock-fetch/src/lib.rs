//! Single-attempt HTTP retrieval and a content-addressed cache client.
//!
//! - [`HttpClient`]: the transport seam; [`ReqwestClient`] in production,
//!   anything else in tests
//! - [`Fetcher`]: one GET per call, streamed to disk, never retried
//! - [`CacheClient`]: GET/PUT/DELETE of objects keyed by their integrity
//!
//! Nothing here verifies content. Callers own that decision, because what a
//! mismatch means depends on where the bytes came from.

mod cache;
mod error;
mod fetcher;
mod http;

pub use cache::{CACHE_TOKEN_ENV, CacheClient, CacheToken, object_url};
pub use error::{FetchError, Result};
pub use fetcher::{Fetcher, ProgressFn, request_headers, staging_name};
pub use http::{BoxStream, HttpClient};

#[cfg(feature = "reqwest")]
pub use http::{ClientConfig, ClientConfigError, ClientError, ReqwestClient};
