//! Aggregate outcome of one upload request.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Public view of a file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileJson {
    pub filename: String,
    pub fullname: String,
    pub newname: String,
    pub fieldname: String,
    pub encoding: String,
    pub mimetype: String,
    pub ext: String,
    pub folder: String,
    #[serde(rename = "fullPath")]
    pub full_path: String,
    pub error: Option<String>,
    pub finished: bool,
    pub failed: bool,
    pub size: u64,
}

/// Request-level messages and failed files share the `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorEntry {
    Message(String),
    File(FileJson),
}

impl ErrorEntry {
    pub fn message(&self) -> Option<&str> {
        match self {
            ErrorEntry::Message(msg) => Some(msg),
            ErrorEntry::File(file) => file.error.as_deref(),
        }
    }
}

/// One form field, serialized as a single-key object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "std::collections::BTreeMap<String, String>")]
pub struct FormField {
    pub name: String,
    pub value: String,
}

impl Serialize for FormField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.value)?;
        map.end()
    }
}

impl From<std::collections::BTreeMap<String, String>> for FormField {
    fn from(map: std::collections::BTreeMap<String, String>) -> Self {
        let (name, value) = map.into_iter().next().unwrap_or_default();
        FormField { name, value }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub warnings: Vec<String>,
    pub errors: Vec<ErrorEntry>,
    pub files: Vec<FileJson>,
    pub fields: Vec<FormField>,
}

impl UploadResult {
    /// Result of a request rejected before its body was read.
    pub fn rejected(message: impl Into<String>) -> Self {
        UploadResult {
            errors: vec![ErrorEntry::Message(message.into())],
            ..Default::default()
        }
    }

    /// Request errors first, then failed files; only clean files land in `files`.
    pub fn assemble(
        warnings: Vec<String>,
        messages: Vec<String>,
        entries: impl IntoIterator<Item = FileJson>,
        fields: Vec<FormField>,
    ) -> Self {
        let mut errors: Vec<ErrorEntry> = messages.into_iter().map(ErrorEntry::Message).collect();
        let mut files = Vec::new();
        for file in entries {
            if file.error.is_some() {
                errors.push(ErrorEntry::File(file));
            } else {
                files.push(file);
            }
        }
        UploadResult {
            warnings,
            errors,
            files,
            fields,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Messages of every error, in order.
    pub fn error_messages(&self) -> Vec<&str> {
        self.errors.iter().filter_map(ErrorEntry::message).collect()
    }
}
