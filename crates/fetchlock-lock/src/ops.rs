//! One function per command, taking already-parsed arguments.
//!
//! Each opens the lock file, does its work and saves when it changed
//! anything. None of them read the environment.

use std::path::Path;
use std::sync::Arc;

use fetchlock_fetch::HttpClient;
use fetchlock_fs::FileMode;
use fetchlock_verify::Integrity;

use crate::context::Context;
use crate::error::Result;
use crate::lock::{DownloadOptions, DownloadReport, Lock, NewResource, VerifyReport};
use crate::resource::Resource;

/// Lock a new resource and return its integrity.
pub async fn add<C: HttpClient>(ctx: Arc<Context<C>>, lock_path: &Path, new: NewResource) -> Result<Integrity> {
    let mut lock = Lock::open(lock_path, true, ctx)?;
    let integrity = lock.add_resource(new).await?.integrity.clone();
    lock.save()?;
    Ok(integrity)
}

/// Download the selected resources into `dir`.
///
/// `perm` is an octal mode such as `"644"`; empty leaves permissions alone.
/// It is validated before anything touches the network.
pub async fn download<C: HttpClient + 'static>(
    ctx: Arc<Context<C>>,
    lock_path: &Path,
    dir: &Path,
    perm: &str,
    mut options: DownloadOptions,
) -> Result<DownloadReport> {
    if let Some(mode) = FileMode::parse_optional(perm)? {
        options.mode = Some(mode);
    }
    let lock = Lock::open(lock_path, false, ctx)?;
    lock.download(dir, options).await
}

/// Remove every resource listing any of `urls`; returns how many went.
pub async fn delete<C: HttpClient>(ctx: Arc<Context<C>>, lock_path: &Path, urls: &[String]) -> Result<usize> {
    let mut lock = Lock::open(lock_path, false, ctx)?;
    let mut removed = 0;
    for url in urls {
        removed += lock.delete_resource(url).await;
    }
    lock.save()?;
    Ok(removed)
}

pub async fn update<C: HttpClient>(ctx: Arc<Context<C>>, lock_path: &Path, url: &str) -> Result<()> {
    let mut lock = Lock::open(lock_path, false, ctx)?;
    lock.update_resource(url).await
}

pub async fn verify<C: HttpClient>(
    ctx: Arc<Context<C>>,
    lock_path: &Path,
    dir: &Path,
    required_tags: &[String],
    excluded_tags: &[String],
) -> Result<VerifyReport> {
    let lock = Lock::open(lock_path, false, ctx)?;
    lock.verify(dir, required_tags, excluded_tags).await
}

pub fn list<C: HttpClient>(ctx: Arc<Context<C>>, lock_path: &Path) -> Result<Vec<Resource>> {
    Ok(Lock::open(lock_path, false, ctx)?.resources().to_vec())
}
