use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of a directory entry as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    Image,
    Video,
    Audio,
    /// Anything the server reports that this client does not know about
    #[serde(other)]
    Other,
}

/// One record of a directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: u64,
    /// Creation time in milliseconds since the Unix epoch
    #[serde(default)]
    pub created_at: i64,
    /// Modification time in milliseconds since the Unix epoch
    #[serde(default)]
    pub updated_at: i64,
}

impl DirectoryEntry {
    pub fn folder(name: impl Into<String>, now_ms: i64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Folder,
            size: 0,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Body of `GET /image-browsing/<virtual path>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<DirectoryEntry>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /image-browsing/batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub paths: Vec<String>,
}

/// Per-path result inside a [`BatchResponse`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub data: Vec<DirectoryEntry>,
    #[serde(default)]
    pub validator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    #[serde(default)]
    pub data: HashMap<String, BatchItem>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `DELETE /image-browsing/delete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub uri: String,
    pub file_list: Vec<String>,
}

/// Body of `PUT /image-browsing/<virtual path>`; `filename` is the new full virtual path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    pub filename: String,
}

/// Body of `POST /image-browsing/move`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub file_list: Vec<String>,
    pub target_folder: String,
}

/// Envelope returned by every mutation route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
