use std::fmt;
use std::str::FromStr;

use digest::Digest;

use crate::VerificationError;

/// Incremental hash state.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// Adapts any RustCrypto [`Digest`] to [`Hasher`].
pub struct DigestHasher<D: Digest + Send>(D);

impl<D: Digest + Send> DigestHasher<D> {
    pub fn new() -> Self { Self(D::new()) }
}

impl<D: Digest + Send> Default for DigestHasher<D> {
    fn default() -> Self { Self::new() }
}

impl<D: Digest + Send> Hasher for DigestHasher<D> {
    fn update(&mut self, data: &[u8]) { Digest::update(&mut self.0, data); }
    fn finalize(self: Box<Self>) -> Vec<u8> { self.0.finalize().to_vec() }
}

/// Registered digest algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512];

    /// Used when the caller does not ask for a specific algorithm.
    pub const RECOMMENDED: Algorithm = Self::Sha256;

    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    pub fn hasher(self) -> Box<dyn Hasher> {
        match self {
            Self::Sha1 => Box::new(DigestHasher::<sha1::Sha1>::new()),
            Self::Sha256 => Box::new(DigestHasher::<sha2::Sha256>::new()),
            Self::Sha384 => Box::new(DigestHasher::<sha2::Sha384>::new()),
            Self::Sha512 => Box::new(DigestHasher::<sha2::Sha512>::new()),
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Comma separated list of every registered name, for error messages.
    pub fn available() -> String {
        Self::ALL.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Algorithm {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| VerificationError::UnknownAlgorithm {
                name:      s.to_string(),
                available: Self::available(),
            })
    }
}
