use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move '{}' to '{}': {source}", from.display(), to.display())]
    Rename {
        from:   PathBuf,
        to:     PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to set permissions on '{}': {source}", path.display())]
    Permissions {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' is not a valid permission definition")]
    InvalidMode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
