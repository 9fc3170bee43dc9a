use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::{Algorithm, Result, VerificationError};

/// Files are hashed in blocks of this size.
pub const CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// An `<algo>-<base64>` digest string.
///
/// Comparison is exact string equality, so the same bytes hashed with two
/// different algorithms never compare equal. Values read from a manifest are
/// kept verbatim; [`Integrity::algorithm`] validates the prefix lazily.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Integrity(String);

impl Integrity {
    pub fn new(algorithm: Algorithm, digest: &[u8]) -> Self {
        Self(format!("{algorithm}-{}", STANDARD.encode(digest)))
    }

    pub fn of_bytes(algorithm: Algorithm, data: &[u8]) -> Self {
        Self::new(algorithm, &algorithm.digest(data))
    }

    /// Parses and validates the algorithm prefix.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let integrity = Self(s.into());
        integrity.algorithm()?;
        Ok(integrity)
    }

    pub fn algorithm(&self) -> Result<Algorithm> { parse_algorithm(&self.0) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<String> for Integrity {
    fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for Integrity {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// Returns the algorithm named before the first `-`.
pub fn parse_algorithm(integrity: &str) -> Result<Algorithm> {
    let (name, _) = integrity
        .split_once('-')
        .ok_or_else(|| VerificationError::Malformed(integrity.to_string()))?;
    name.parse()
}

pub fn compute_reader<R: Read>(mut reader: R, algorithm: Algorithm) -> io::Result<Integrity> {
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Integrity::new(algorithm, &hasher.finalize()))
}

pub fn compute(path: impl AsRef<Path>, algorithm: Algorithm) -> Result<Integrity> {
    let path = path.as_ref();
    let io_err = |source| VerificationError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    compute_reader(file, algorithm).map_err(io_err)
}

/// Recomputes the digest of `path` with the algorithm named by `expected`.
///
/// `context` is the URL or path reported in a [`VerificationError::Mismatch`].
pub fn verify(path: impl AsRef<Path>, expected: &Integrity, context: &str) -> Result<()> {
    let algorithm = expected.algorithm()?;
    let actual = compute(path, algorithm)?;
    if actual == *expected {
        Ok(())
    } else {
        Err(VerificationError::Mismatch {
            context: context.to_string(),
            expected: expected.clone(),
            actual,
        })
    }
}
