use std::io;
use std::path::PathBuf;

use crate::Integrity;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("integrity mismatch for '{context}': got '{actual}' expected '{expected}'")]
    Mismatch {
        context:  String,
        expected: Integrity,
        actual:   Integrity,
    },

    #[error("unknown hash algorithm '{name}' (available algorithms: {available})")]
    UnknownAlgorithm { name: String, available: String },

    #[error("invalid integrity string '{0}'")]
    Malformed(String),

    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

impl VerificationError {
    pub fn is_mismatch(&self) -> bool { matches!(self, Self::Mismatch { .. }) }
}

pub type Result<T> = std::result::Result<T, VerificationError>;
