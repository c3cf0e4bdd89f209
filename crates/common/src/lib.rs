pub mod error;
pub mod exit_codes;
pub mod manifest;
pub mod probe;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// A substitutable technology axis inside a generated project.
///
/// Every adapter in the registry belongs to exactly one category, and a
/// migration always swaps two adapters of the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Auth,
    Database,
    Orm,
    Storage,
    Email,
}

impl Category {
    /// All categories, in manifest order.
    pub fn all() -> &'static [Category] {
        &[
            Category::Auth,
            Category::Database,
            Category::Orm,
            Category::Storage,
            Category::Email,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Auth => "auth",
            Category::Database => "database",
            Category::Orm => "orm",
            Category::Storage => "storage",
            Category::Email => "email",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = error::MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auth" | "authentication" => Ok(Category::Auth),
            "database" | "db" => Ok(Category::Database),
            "orm" => Ok(Category::Orm),
            "storage" | "object-storage" => Ok(Category::Storage),
            "email" | "mail" => Ok(Category::Email),
            other => Err(error::MigrationError::InternalError(format!(
                "unknown category `{other}` (expected auth, database, orm, storage or email)"
            ))),
        }
    }
}

/// Seconds since the Unix epoch. All persisted timestamps use this form.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hex-encoded BLAKE3 digest of a byte slice.
///
/// # Examples
/// ```
/// # use common::checksum_bytes;
/// let h1 = checksum_bytes(b"export default {}\n");
/// let h2 = checksum_bytes(b"export default {}\n");
/// assert_eq!(h1, h2);
/// assert_eq!(h1.len(), 64);
/// ```
pub fn checksum_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Hex-encoded BLAKE3 digest of a file's contents.
pub fn checksum_file(path: &Path) -> std::io::Result<String> {
    Ok(checksum_bytes(&std::fs::read(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for cat in Category::all() {
            let parsed: Category = cat.as_str().parse().unwrap();
            assert_eq!(parsed, *cat);
        }
    }

    #[test]
    fn test_category_aliases() {
        assert_eq!("db".parse::<Category>().unwrap(), Category::Database);
        assert_eq!("mail".parse::<Category>().unwrap(), Category::Email);
        assert!("graphql".parse::<Category>().is_err());
    }

    #[test]
    fn test_checksum_distinguishes_content() {
        assert_ne!(checksum_bytes(b"a"), checksum_bytes(b"b"));
    }

    #[test]
    fn test_checksum_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(checksum_file(&path).unwrap(), checksum_bytes(b"hello"));
    }
}
