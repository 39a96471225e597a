//! User-facing description of a file or folder.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceKind {
    File,
    Directory,
}

/// `{path, name, size, type}` as returned to clients.
///
/// Always derived from the store on read, never persisted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Directory containing the resource, with trailing `/`.
    pub path: String,

    /// Last segment; folders keep their trailing `/`.
    pub name: String,

    /// Byte count. Absent for folders and empty files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

impl ResourceRecord {
    pub fn is_directory(&self) -> bool {
        self.kind == ResourceKind::Directory
    }

    /// Full key this record describes.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.path, self.name)
    }

    /// The same record with `root` removed from the front of `path`, for
    /// presenting keys relative to a user's namespace.
    pub fn relative_to(mut self, root: &str) -> Self {
        if let Some(rest) = self.path.strip_prefix(root) {
            self.path = rest.to_string();
        }
        self
    }
}
