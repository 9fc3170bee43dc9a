use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use crate::CACHE_TOKEN_ENV;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport, DNS and status failures. `message` holds the full cause chain.
    #[error("failed to download '{url}': {message}")]
    Request { url: String, message: String },

    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{operation} requires a cache credential ({CACHE_TOKEN_ENV} is not set)")]
    MissingCredential { operation: &'static str },
}

impl FetchError {
    pub(crate) fn request(url: &str, err: &(dyn StdError + 'static)) -> Self {
        Self::Request {
            url:     url.to_string(),
            message: describe(err),
        }
    }
}

/// Renders an error and its sources as `outer: inner: root`.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

pub type Result<T> = std::result::Result<T, FetchError>;
