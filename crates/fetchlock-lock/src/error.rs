use std::fmt;
use std::io;
use std::path::PathBuf;

use fetchlock_fetch::FetchError;
use fetchlock_verify::VerificationError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("'{url}' is already present in the lock file")]
    AlreadyPresent { url: String },

    #[error("lock file '{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("no resource in the lock file contains '{url}'")]
    ResourceNotFound { url: String },

    #[error("resource has no urls")]
    NoUrls,

    #[error("cannot derive a file name from '{url}'")]
    NoFileName { url: String },

    #[error(transparent)]
    Integrity(#[from] VerificationError),

    /// A file already sits at the target path and its content is not the
    /// locked content.
    #[error("existing file '{}' is corrupt: {source}", path.display())]
    ExistingFileCorrupt {
        path:   PathBuf,
        #[source]
        source: VerificationError,
    },

    /// The cache answered but served the wrong bytes. Never retried against origin.
    #[error("cache object '{url}' is corrupt: {source}")]
    CacheCorrupt {
        url:    String,
        #[source]
        source: VerificationError,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Fs(#[from] fetchlock_fs::Error),

    #[error("failed to access '{}': {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{}' is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("no resources match the requested tags")]
    NothingToDownload,

    #[error("download cancelled")]
    Cancelled,

    #[error("failed to parse lock file '{}': {source}", path.display())]
    Parse {
        path:   PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize lock file: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{}", describe_failures(.0))]
    Aggregate(Vec<ResourceFailure>),
}

impl Error {
    /// Failures carried by an [`Error::Aggregate`], empty otherwise.
    pub fn failures(&self) -> &[ResourceFailure] {
        match self {
            Self::Aggregate(failures) => failures,
            _ => &[],
        }
    }
}

/// One failed resource of a batch, named by its first URL.
#[derive(Debug)]
pub struct ResourceFailure {
    pub url:   String,
    pub error: Error,
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.error)
    }
}

fn describe_failures(failures: &[ResourceFailure]) -> String {
    let mut message = match failures.len() {
        1 => "1 resource failed".to_string(),
        n => format!("{n} resources failed"),
    };
    for failure in failures {
        message.push_str("\n  ");
        message.push_str(&failure.to_string());
    }
    message
}

pub type Result<T> = std::result::Result<T, Error>;
