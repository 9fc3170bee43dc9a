//! A single locked artifact and its fetch/verify/place state machine.
//!
//! [`Resource::download`] walks three states in order and stops at the first
//! that places a verified file:
//!
//! 1. local: a file already at the target path is verified in place
//! 2. cache: the content-addressed cache is asked for the object
//! 3. origin: every URL is tried in declared order
//!
//! Every download is staged next to the target and renamed into place only
//! after its digest matched, so the final name never holds unverified bytes.

use std::path::{Path, PathBuf};

use fetchlock_fetch::{HttpClient, object_url};
use fetchlock_fs::FileMode;
use fetchlock_verify::{Algorithm, Integrity, VerificationError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::context::Context;
use crate::error::{Error, Result};

/// One `[[Resource]]` entry of the lock file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// Mirrors in trial order. The first one also names the resource.
    pub urls:      Vec<String>,
    pub integrity: Integrity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags:      Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename:  Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_uri: Option<String>,
    /// Upstream content is expected to change; the local shortcut is skipped.
    #[serde(default, skip_serializing_if = "is_false")]
    pub dynamic:   bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// What to do when the target path holds a file with the wrong digest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExistingFilePolicy {
    /// Report [`Error::ExistingFileCorrupt`] and leave the file alone.
    #[default]
    Fail,
    /// Download again and replace the file.
    Replace,
}

/// Per-resource knobs shared by every task of a batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceOptions {
    pub mode:     Option<FileMode>,
    pub existing: ExistingFilePolicy,
}

/// Where a placed file came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Local,
    Cache,
    Origin(String),
}

/// A verified file sitting under its final name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub url:    String,
    pub path:   PathBuf,
    pub source: Source,
}

impl Resource {
    pub fn new(urls: Vec<String>, integrity: Integrity) -> Self {
        Self {
            urls,
            integrity,
            tags: Vec::new(),
            filename: None,
            cache_uri: None,
            dynamic: false,
        }
    }

    /// The first URL, used to name the resource in reports.
    pub fn id(&self) -> &str {
        self.urls.first().map(String::as_str).unwrap_or_default()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u == url)
    }

    /// `true` when every required tag is present and no excluded tag is.
    pub fn matches(&self, required: &[String], excluded: &[String]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag))
            && !excluded.iter().any(|tag| self.tags.contains(tag))
    }

    /// File name under the download directory: the explicit `Filename`, or
    /// the last path segment of the first URL.
    pub fn local_name(&self) -> Result<String> {
        if let Some(name) = self.filename.as_deref().filter(|name| !name.is_empty()) {
            return Ok(name.to_string());
        }
        let url = self.urls.first().ok_or(Error::NoUrls)?;
        file_name_from_url(url)
    }

    pub async fn download<C: HttpClient>(
        &self,
        ctx: &Context<C>,
        dir: &Path,
        options: &ResourceOptions,
    ) -> Result<Placement> {
        if self.urls.is_empty() {
            return Err(Error::NoUrls);
        }
        let target = dir.join(self.local_name()?);

        if !self.dynamic && target.is_file() {
            let context = target.display().to_string();
            match verify_in_background(&target, &self.integrity, &context).await? {
                Ok(()) => {
                    debug!(path = %target.display(), "existing file verified");
                    return self.placed(target, Source::Local, options);
                }
                Err(source) if source.is_mismatch() => match options.existing {
                    ExistingFilePolicy::Fail => {
                        return Err(Error::ExistingFileCorrupt { path: target, source });
                    }
                    ExistingFilePolicy::Replace => {
                        warn!(path = %target.display(), "existing file is corrupt, downloading again");
                    }
                },
                Err(source) => return Err(source.into()),
            }
        }

        if let Some(base) = &self.cache_uri {
            if !ctx.cache().has_credential() {
                debug!(url = self.id(), "no cache credential, skipping cache");
            } else if self.try_cache(ctx, base, &target).await? {
                return self.placed(target, Source::Cache, options);
            }
        }

        self.try_origin(ctx, &target, options).await
    }

    /// `Ok(false)` when the cache could not be reached; a corrupt object is an error.
    async fn try_cache<C: HttpClient>(&self, ctx: &Context<C>, base: &str, target: &Path) -> Result<bool> {
        let staged = match ctx.cache().get_staged(base, &self.integrity, target).await {
            Ok(staged) => staged,
            Err(err) => {
                warn!(url = self.id(), %err, "cache unavailable, falling back to origin");
                return Ok(false);
            }
        };

        let url = object_url(base, &self.integrity);
        match verify_in_background(staged.path(), &self.integrity, &url).await? {
            Ok(()) => {}
            Err(source) if source.is_mismatch() => return Err(Error::CacheCorrupt { url, source }),
            Err(source) => return Err(source.into()),
        }

        staged.commit(target)?;
        Ok(true)
    }

    async fn try_origin<C: HttpClient>(
        &self,
        ctx: &Context<C>,
        target: &Path,
        options: &ResourceOptions,
    ) -> Result<Placement> {
        let mut first_error = None;

        for url in &self.urls {
            debug!(url, "trying mirror");
            let staged = match ctx.fetcher().fetch_staged(url, target, None).await {
                Ok(staged) => staged,
                Err(err) => {
                    warn!(url, %err, "mirror failed");
                    first_error.get_or_insert(Error::from(err));
                    continue;
                }
            };

            if let Err(err) = verify_in_background(staged.path(), &self.integrity, url).await? {
                warn!(url, %err, "mirror served unexpected content");
                first_error.get_or_insert(Error::from(err));
                continue;
            }

            staged.commit(target)?;
            let placement = self.placed(target.to_path_buf(), Source::Origin(url.clone()), options)?;

            if let Some(base) = &self.cache_uri {
                if !ctx.cache().has_credential() {
                    debug!(url = self.id(), "no cache credential, not seeding cache");
                } else if let Err(err) = ctx.cache().put(base, &self.integrity, target).await {
                    warn!(url = self.id(), %err, "failed to seed cache");
                }
            }
            return Ok(placement);
        }

        debug_assert!(first_error.is_some(), "every mirror failed without an error");
        Err(first_error.unwrap_or(Error::NoUrls))
    }

    fn placed(&self, path: PathBuf, source: Source, options: &ResourceOptions) -> Result<Placement> {
        if let Some(mode) = options.mode {
            mode.apply(&path)?;
        }
        info!(url = self.id(), path = %path.display(), ?source, "placed");
        Ok(Placement {
            url: self.id().to_string(),
            path,
            source,
        })
    }
}

pub(crate) fn file_name_from_url(url: &str) -> Result<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.path_segments()?.next_back().map(str::to_string))
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .ok_or_else(|| Error::NoFileName { url: url.to_string() })
}

/// Digest check on the blocking pool. The outer error is a failed task.
pub(crate) async fn verify_in_background(
    path: &Path,
    expected: &Integrity,
    context: &str,
) -> Result<std::result::Result<(), VerificationError>> {
    let (path, expected, context) = (path.to_path_buf(), expected.clone(), context.to_string());
    Ok(tokio::task::spawn_blocking(move || fetchlock_verify::verify(path, &expected, &context)).await?)
}

pub(crate) async fn compute_in_background(path: &Path, algorithm: Algorithm) -> Result<Integrity> {
    let path = path.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || fetchlock_verify::compute(path, algorithm)).await??)
}
