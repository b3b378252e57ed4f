//! Seam between the cache and the host application's HTTP routes

use crate::error::TransportError;
use async_trait::async_trait;
use image_browsing_protocol::DirectoryEntry;
use std::collections::HashMap;

/// Outcome of a (possibly conditional) listing read
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResponse {
    /// The supplied validator still matches; no body was sent
    NotModified,
    Modified {
        listing: Vec<DirectoryEntry>,
        validator: Option<String>,
    },
}

/// One path of a batch read
#[derive(Debug, Clone, PartialEq)]
pub struct BatchListing {
    pub listing: Vec<DirectoryEntry>,
    pub validator: Option<String>,
}

/// What a create request carries
#[derive(Debug, Clone, PartialEq)]
pub enum NewEntry {
    Folder { name: String },
    File { name: String, contents: Vec<u8> },
}

impl NewEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Folder { name } | Self::File { name, .. } => name,
        }
    }
}

/// Network operations the cache needs. Paths are normalized virtual paths
/// such as `/output/cats`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read a folder listing; `validator` makes the request conditional
    async fn fetch_listing(
        &self,
        path: &str,
        validator: Option<&str>,
    ) -> Result<FetchResponse, TransportError>;

    /// Read several folders in one round trip
    async fn fetch_batch(
        &self,
        paths: &[String],
    ) -> Result<HashMap<String, BatchListing>, TransportError>;

    async fn create(&self, folder: &str, entry: &NewEntry) -> Result<(), TransportError>;

    /// Delete `file_list` (full virtual paths) from `folder`
    async fn delete(&self, folder: &str, file_list: &[String]) -> Result<(), TransportError>;

    /// Rename `path` to the full virtual path `new_path`
    async fn rename(&self, path: &str, new_path: &str) -> Result<(), TransportError>;

    async fn move_entries(
        &self,
        file_list: &[String],
        target_folder: &str,
    ) -> Result<(), TransportError>;
}
