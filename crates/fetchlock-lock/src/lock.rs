use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fetchlock_fetch::{FetchError, HttpClient};
use fetchlock_fs::{FileMode, atomic_write};
use fetchlock_verify::{Algorithm, Integrity, VerificationError};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{Error, ResourceFailure, Result};
use crate::resource::{
    ExistingFilePolicy, Placement, Resource, ResourceOptions, compute_in_background, file_name_from_url,
    verify_in_background,
};

#[derive(Deserialize)]
struct ManifestFile {
    #[serde(rename = "Resource", default)]
    resources: Vec<Resource>,
}

#[derive(Serialize)]
struct ManifestRef<'a> {
    #[serde(rename = "Resource", skip_serializing_if = "is_empty")]
    resources: &'a [Resource],
}

fn is_empty(resources: &&[Resource]) -> bool {
    resources.is_empty()
}

/// Input for [`Lock::add_resource`].
#[derive(Clone, Debug)]
pub struct NewResource {
    pub urls:      Vec<String>,
    pub algorithm: Algorithm,
    pub tags:      Vec<String>,
    pub filename:  Option<String>,
    pub cache_uri: Option<String>,
    pub dynamic:   bool,
}

impl NewResource {
    pub fn new(urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            urls:      urls.into_iter().map(Into::into).collect(),
            algorithm: Algorithm::RECOMMENDED,
            tags:      Vec::new(),
            filename:  None,
            cache_uri: None,
            dynamic:   false,
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_cache_uri(mut self, cache_uri: impl Into<String>) -> Self {
        self.cache_uri = Some(cache_uri.into());
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }
}

/// Progress notifications emitted by [`Lock::download`].
#[derive(Clone, Debug)]
pub enum DownloadEvent {
    Started { url: String },
    Placed(Placement),
    Failed { url: String, message: String },
}

pub type DownloadObserver = Arc<dyn Fn(&DownloadEvent) + Send + Sync>;

/// Options for [`Lock::download`].
#[derive(Clone, Default)]
pub struct DownloadOptions {
    pub required_tags:  Vec<String>,
    pub excluded_tags:  Vec<String>,
    pub mode:           Option<FileMode>,
    pub existing:       ExistingFilePolicy,
    /// Upper bound on resources in flight. `None` starts all of them at once.
    pub max_concurrent: Option<usize>,
    pub cancel:         CancellationToken,
    pub observer:       Option<DownloadObserver>,
}

impl std::fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("required_tags", &self.required_tags)
            .field("excluded_tags", &self.excluded_tags)
            .field("mode", &self.mode)
            .field("existing", &self.existing)
            .field("max_concurrent", &self.max_concurrent)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl DownloadOptions {
    pub fn with_required_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_existing(mut self, existing: ExistingFilePolicy) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: DownloadObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Placements of a successful batch, in lock file order.
#[derive(Clone, Debug, Default)]
pub struct DownloadReport {
    pub placements: Vec<Placement>,
}

/// State of one resource's file in a directory, without touching the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalStatus {
    Verified,
    Missing,
    Corrupt { actual: Integrity },
}

#[derive(Clone, Debug)]
pub struct LocalCheck {
    pub url:    String,
    pub path:   PathBuf,
    pub status: LocalStatus,
}

#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    pub checks: Vec<LocalCheck>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.checks.iter().all(|check| check.status == LocalStatus::Verified)
    }
}

/// The lock file: an ordered list of resources bound to a path.
///
/// A `Lock` is mutated from one control path only. [`Lock::download`] takes
/// `&self` and never changes the resource list.
pub struct Lock<C: HttpClient> {
    path:      PathBuf,
    resources: Vec<Resource>,
    ctx:       Arc<Context<C>>,
}

impl<C: HttpClient> Lock<C> {
    /// Load the lock file at `path`.
    ///
    /// A missing file is [`Error::NotFound`] unless `create_if_missing` is
    /// set, in which case the lock starts empty and is written on [`save`].
    ///
    /// [`save`]: Lock::save
    pub fn open(path: impl Into<PathBuf>, create_if_missing: bool, ctx: Arc<Context<C>>) -> Result<Self> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound && create_if_missing => String::new(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NotFound { path }),
            Err(source) => return Err(Error::Io { path, source }),
        };

        let manifest: ManifestFile = toml::from_str(&content).map_err(|source| Error::Parse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), resources = manifest.resources.len(), "opened lock file");

        Ok(Self {
            path,
            resources: manifest.resources,
            ctx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn contains(&self, url: &str) -> bool {
        self.resources.iter().any(|r| r.contains_url(url))
    }

    /// Fetch the first URL once, lock its digest and append the resource.
    ///
    /// When a cache is configured the object is uploaded from the same
    /// download, and a failed upload fails the add.
    pub async fn add_resource(&mut self, new: NewResource) -> Result<&Resource> {
        let first = new.urls.first().ok_or(Error::NoUrls)?.clone();
        if let Some(url) = new.urls.iter().find(|url| self.contains(url)) {
            return Err(Error::AlreadyPresent { url: url.clone() });
        }
        if new.cache_uri.is_some() && !self.ctx.cache().has_credential() {
            return Err(FetchError::MissingCredential { operation: "cache upload" }.into());
        }

        if new.filename.as_deref().is_none_or(str::is_empty) {
            file_name_from_url(&first)?;
        }

        let temp = self.ctx.fetcher().fetch_to_temp_file(&first, None).await?;
        let integrity = compute_in_background(&temp, new.algorithm).await?;

        if let Some(base) = &new.cache_uri {
            self.ctx.cache().put(base, &integrity, &temp).await?;
        }

        let resource = Resource {
            urls: new.urls,
            integrity,
            tags: new.tags,
            filename: new.filename,
            cache_uri: new.cache_uri,
            dynamic: new.dynamic,
        };

        info!(url = %first, integrity = %resource.integrity, "added resource");
        self.resources.push(resource);
        Ok(&self.resources[self.resources.len() - 1])
    }

    /// Remove every resource that lists `url`, returning how many went.
    ///
    /// Cache eviction is best effort.
    pub async fn delete_resource(&mut self, url: &str) -> usize {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.resources)
            .into_iter()
            .partition(|r| r.contains_url(url));
        self.resources = kept;

        for resource in &removed {
            let Some(base) = &resource.cache_uri else { continue };
            if let Err(err) = self.ctx.cache().delete(base, &resource.integrity).await {
                warn!(url = resource.id(), %err, "failed to evict cache object");
            }
        }
        removed.len()
    }

    /// Re-fetch the resource containing `url`, lock its new digest and save.
    ///
    /// The stored digest's algorithm is kept.
    pub async fn update_resource(&mut self, url: &str) -> Result<()> {
        let index = self
            .resources
            .iter()
            .position(|r| r.contains_url(url))
            .ok_or_else(|| Error::ResourceNotFound { url: url.to_string() })?;

        let (first, algorithm, previous, cache_uri) = {
            let resource = &self.resources[index];
            (
                resource.urls.first().ok_or(Error::NoUrls)?.clone(),
                resource.integrity.algorithm()?,
                resource.integrity.clone(),
                resource.cache_uri.clone(),
            )
        };

        let temp = self.ctx.fetcher().fetch_to_temp_file(&first, None).await?;
        let integrity = compute_in_background(&temp, algorithm).await?;

        if integrity != previous {
            info!(url = %first, from = %previous, to = %integrity, "integrity changed");
            if let Some(base) = &cache_uri {
                if let Err(err) = self.ctx.cache().put(base, &integrity, &temp).await {
                    warn!(url = %first, %err, "failed to seed cache");
                }
            }
        }

        self.resources[index].integrity = integrity;
        self.save()
    }

    /// Write the lock file through a sibling temp file.
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string(&ManifestRef {
            resources: &self.resources,
        })?;
        atomic_write(&self.path, content.as_bytes())?;
        debug!(path = %self.path.display(), "saved lock file");
        Ok(())
    }

    fn select<'a>(&'a self, required: &'a [String], excluded: &'a [String]) -> impl Iterator<Item = &'a Resource> {
        self.resources.iter().filter(move |r| r.matches(required, excluded))
    }

    /// Check the selected resources' files in `dir` without any network I/O.
    pub async fn verify(&self, dir: &Path, required_tags: &[String], excluded_tags: &[String]) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for resource in self.select(required_tags, excluded_tags) {
            let path = dir.join(resource.local_name()?);
            let status = if !path.is_file() {
                LocalStatus::Missing
            } else {
                let context = path.display().to_string();
                match verify_in_background(&path, &resource.integrity, &context).await? {
                    Ok(()) => LocalStatus::Verified,
                    Err(VerificationError::Mismatch { actual, .. }) => LocalStatus::Corrupt { actual },
                    Err(err) => return Err(err.into()),
                }
            };
            report.checks.push(LocalCheck {
                url: resource.id().to_string(),
                path,
                status,
            });
        }
        Ok(report)
    }
}

impl<C: HttpClient + 'static> Lock<C> {
    /// Download every selected resource into `dir`, one task per resource.
    ///
    /// Failures do not cancel siblings. When any resource fails the result is
    /// [`Error::Aggregate`] with every failure in lock file order.
    pub async fn download(&self, dir: &Path, options: DownloadOptions) -> Result<DownloadReport> {
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(Error::NotADirectory { path: dir.to_path_buf() }),
        }

        let selected: Vec<Resource> = self
            .select(&options.required_tags, &options.excluded_tags)
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(Error::NothingToDownload);
        }
        debug!(count = selected.len(), dir = %dir.display(), "starting batch download");

        let limiter = options.max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let resource_options = ResourceOptions {
            mode:     options.mode,
            existing: options.existing,
        };

        let total = selected.len();
        let mut tasks = JoinSet::new();
        for (index, resource) in selected.into_iter().enumerate() {
            let ctx = self.ctx.clone();
            let dir = dir.to_path_buf();
            let cancel = options.cancel.clone();
            let limiter = limiter.clone();
            let observer = options.observer.clone();

            tasks.spawn(async move {
                let url = resource.id().to_string();
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    outcome = async {
                        let _permit = match &limiter {
                            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
                            None => None,
                        };
                        notify(&observer, DownloadEvent::Started { url: url.clone() });
                        resource.download(&ctx, &dir, &resource_options).await
                    } => outcome,
                };

                match &outcome {
                    Ok(placement) => notify(&observer, DownloadEvent::Placed(placement.clone())),
                    Err(err) => notify(&observer, DownloadEvent::Failed {
                        url:     url.clone(),
                        message: err.to_string(),
                    }),
                }
                (index, url, outcome)
            });
        }

        let mut outcomes: Vec<Option<(String, Result<Placement>)>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, url, outcome) = joined?;
            outcomes[index] = Some((url, outcome));
        }

        let mut placements = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (url, outcome) in outcomes.into_iter().flatten() {
            match outcome {
                Ok(placement) => placements.push(placement),
                Err(error) => failures.push(ResourceFailure { url, error }),
            }
        }

        if failures.is_empty() {
            Ok(DownloadReport { placements })
        } else {
            Err(Error::Aggregate(failures))
        }
    }
}

fn notify(observer: &Option<DownloadObserver>, event: DownloadEvent) {
    if let Some(observer) = observer {
        observer(&event);
    }
}
