//! Per-file state.

use sealpost_processing::NameGenerator;
use sealpost_storage::Destination;

use crate::result::FileJson;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileState {
    #[default]
    Open,
    Piping,
    Finished,
    Failed,
}

impl FileState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Finished | FileState::Failed)
    }
}

/// Lifecycle events reported by a file pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// The sink is attached and bytes are flowing to it.
    Piping,
    Finish { size: u64 },
    Fail { error: String, size: u64 },
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub index: usize,
    pub field_name: String,
    pub original_filename: String,
    pub new_name: String,
    pub extension: String,
    pub encoding: String,
    pub declared_mime: String,
    pub size_bytes: u64,
    pub error: Option<String>,
    state: FileState,
}

impl FileEntry {
    pub fn new(
        index: usize,
        field_name: impl Into<String>,
        original_filename: impl Into<String>,
        encoding: impl Into<String>,
        declared_mime: impl Into<String>,
        encrypted: bool,
    ) -> Self {
        let original_filename = original_filename.into();
        FileEntry {
            index,
            field_name: field_name.into(),
            extension: NameGenerator::extension_of(&original_filename),
            original_filename,
            new_name: NameGenerator::new_name(encrypted),
            encoding: encoding.into(),
            declared_mime: declared_mime.into(),
            size_bytes: 0,
            error: None,
            state: FileState::Open,
        }
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn full_name(&self) -> String {
        NameGenerator::full_name(&self.new_name, &self.extension)
    }

    /// Apply one lifecycle event. Returns `true` when the entry just became terminal.
    ///
    /// Terminal states ignore every later event.
    pub fn transition(&mut self, event: FileEvent) -> bool {
        if self.state.is_terminal() {
            tracing::debug!(
                file_index = self.index,
                state = ?self.state,
                event = ?event,
                "Ignoring event for settled file"
            );
            return false;
        }

        match event {
            FileEvent::Piping => {
                self.state = FileState::Piping;
                false
            }
            FileEvent::Finish { size } => {
                self.size_bytes = size;
                self.state = FileState::Finished;
                true
            }
            FileEvent::Fail { error, size } => {
                self.size_bytes = size;
                self.error = Some(error);
                self.state = FileState::Failed;
                true
            }
        }
    }

    pub fn to_json(&self, destination: &Destination) -> FileJson {
        let full_name = self.full_name();
        FileJson {
            filename: self.original_filename.clone(),
            fullname: full_name.clone(),
            newname: self.new_name.clone(),
            fieldname: self.field_name.clone(),
            encoding: self.encoding.clone(),
            mimetype: self.declared_mime.clone(),
            ext: self.extension.clone(),
            folder: destination.display_folder(),
            full_path: destination.full_path(&full_name),
            error: self.error.clone(),
            finished: self.state == FileState::Finished,
            failed: self.state == FileState::Failed,
            size: self.size_bytes,
        }
    }
}
