//! The lock file and everything that reads from or writes to it.
//!
//! A [`Lock`] holds an ordered list of [`Resource`]s, each one a set of
//! mirror URLs that must all serve content matching one integrity string.
//! Adding a resource fetches it once to learn its digest; downloading
//! replays that digest against the local directory, an optional
//! content-addressed cache, and the mirrors, in that order.
//!
//! Network access goes through a [`Context`], built once by the caller:
//!
//! ```no_run
//! # async fn run() -> fetchlock_lock::Result<()> {
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use fetchlock_fetch::{CacheToken, Fetcher, ReqwestClient};
//! use fetchlock_lock::{Context, DownloadOptions, Lock};
//!
//! let client = ReqwestClient::new().expect("http client");
//! let ctx = Arc::new(Context::new(Fetcher::new(client), CacheToken::from_env()));
//! let lock = Lock::open("fetchlock.lock", false, ctx)?;
//! let report = lock.download(Path::new("vendor"), DownloadOptions::default()).await?;
//! println!("{} files in place", report.placements.len());
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod lock;
pub mod ops;
mod resource;

pub use context::Context;
pub use error::{Error, ResourceFailure, Result};
pub use lock::{
    DownloadEvent, DownloadObserver, DownloadOptions, DownloadReport, LocalCheck, LocalStatus, Lock, NewResource,
    VerifyReport,
};
pub use resource::{ExistingFilePolicy, Placement, Resource, ResourceOptions, Source};
