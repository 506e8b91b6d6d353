//! Storage names for incoming files.

use uuid::Uuid;

/// Suffix marking encrypted artifacts, so retrieval can branch on the name alone.
pub const CIPHERED_SUFFIX: &str = "-ciphered";

/// Extension reported for files without one.
pub const NO_EXTENSION: &str = "filext";

/// Generates collision-resistant, time-ordered storage names.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameGenerator;

impl NameGenerator {
    pub fn new_name(encrypted: bool) -> String {
        let id = Uuid::now_v7();
        if encrypted {
            format!("{}{}", id, CIPHERED_SUFFIX)
        } else {
            id.to_string()
        }
    }

    /// Lowercase suffix after the last dot, or [`NO_EXTENSION`].
    ///
    /// A leading dot alone (".env") does not start an extension.
    pub fn extension_of(filename: &str) -> String {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
            _ => NO_EXTENSION.to_string(),
        }
    }

    /// Stored name: generated name plus the original extension.
    pub fn full_name(new_name: &str, extension: &str) -> String {
        format!("{}.{}", new_name, extension)
    }

    pub fn is_ciphered(name: &str) -> bool {
        name.contains(CIPHERED_SUFFIX)
    }
}
