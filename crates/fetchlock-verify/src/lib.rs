//! Algorithm-tagged integrity strings for downloaded artifacts.
//!
//! An integrity string has the form `<algo>-<base64(digest)>`, the same shape
//! as a W3C subresource integrity value. Files are hashed incrementally in
//! bounded chunks so verifying a large artifact never loads it into memory.
//!
//! # Example
//!
//! ```
//! use fetchlock_verify::{Algorithm, Integrity};
//!
//! let integrity = Integrity::of_bytes(Algorithm::Sha256, b"abcdef");
//! assert_eq!(integrity.as_str(), "sha256-vvV+x/U6bUC+tkCngKY5yDvCmsipgW8fxsXG3Nk8RyE=");
//! assert_eq!(integrity.algorithm().unwrap(), Algorithm::Sha256);
//! ```

pub use self::error::{Result, VerificationError};
pub use self::hasher::{Algorithm, DigestHasher, Hasher};
pub use self::integrity::{CHUNK_SIZE, Integrity, compute, compute_reader, parse_algorithm, verify};

mod error;
mod hasher;
mod integrity;
