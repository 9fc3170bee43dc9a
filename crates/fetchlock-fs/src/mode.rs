use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::{Error, Result};

/// Unix permission bits applied to placed files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    pub fn from_bits(bits: u32) -> Self { Self(bits & 0o7777) }

    pub fn bits(self) -> u32 { self.0 }

    /// Parses an optional octal string such as `"644"`.
    ///
    /// An empty (or all-whitespace) string means "leave permissions alone".
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse().map(Some)
    }

    /// On non-unix targets only the write bit is honoured, as the readonly flag.
    pub fn apply(self, path: &Path) -> Result<()> {
        let map_err = |source| Error::Permissions {
            path: path.to_path_buf(),
            source,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.0))
                .map_err(map_err)?;
        }

        #[cfg(not(unix))]
        {
            let mut perms = std::fs::metadata(path).map_err(map_err)?.permissions();
            perms.set_readonly(self.0 & 0o222 == 0);
            std::fs::set_permissions(path, perms).map_err(map_err)?;
        }

        Ok(())
    }
}

impl FromStr for FileMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match u32::from_str_radix(s, 8) {
            Ok(bits) if bits <= 0o7777 => Ok(Self(bits)),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:o}", self.0) }
}
