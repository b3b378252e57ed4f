//! File operations, reconciled with the cache
//!
//! Every operation edits the cached listing first so the change shows up at
//! once, then calls the server. Either way the affected folders are brought
//! back in line with the server afterwards: the current folder is refreshed,
//! any other affected folder is dropped from the cache. A rejected operation
//! therefore rolls its own optimistic edit back.

use super::Navigator;
use crate::error::{CacheError, Result, TransportError};
use crate::events::{ListingSource, NavigationEvent};
use crate::optimistic::{pending_file, OptimisticLayer};
use crate::path;
use crate::transport::{NewEntry, Transport};
use chrono::Utc;
use image_browsing_protocol::DirectoryEntry;
use std::sync::Arc;
use tracing::{debug, warn};

/// A single path segment usable as an entry name
fn entry_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CacheError::InvalidPath(name.to_string()));
    }
    Ok(name)
}

impl Navigator {
    pub async fn create_folder(&self, folder: &str, name: &str) -> Result<()> {
        let folder = path::normalize(folder)?;
        let name = entry_name(name)?;

        let placeholder = DirectoryEntry::folder(name, Utc::now().timestamp_millis());
        self.optimistic(&folder, |layer| layer.apply_add(&folder, placeholder));

        let result = self
            .transport()
            .create(
                &folder,
                &NewEntry::Folder {
                    name: name.to_string(),
                },
            )
            .await;
        let created = path::join(&folder, name);
        self.reconcile(&[folder], &[created], result).await
    }

    pub async fn upload(&self, folder: &str, name: &str, contents: Vec<u8>) -> Result<()> {
        let folder = path::normalize(folder)?;
        let name = entry_name(name)?;

        let placeholder = pending_file(name, contents.len() as u64);
        self.optimistic(&folder, |layer| layer.apply_add(&folder, placeholder));

        let entry = NewEntry::File {
            name: name.to_string(),
            contents,
        };
        let result = self.transport().create(&folder, &entry).await;
        self.reconcile(&[folder], &[], result).await
    }

    /// Delete the entries called `names` from `folder`
    pub async fn delete(&self, folder: &str, names: &[&str]) -> Result<()> {
        let folder = path::normalize(folder)?;
        let names = names
            .iter()
            .map(|name| entry_name(name))
            .collect::<Result<Vec<_>>>()?;
        if names.is_empty() {
            return Ok(());
        }

        for name in &names {
            self.optimistic(&folder, |layer| layer.apply_remove(&folder, name));
        }

        let file_list: Vec<String> = names.iter().map(|name| path::join(&folder, name)).collect();
        let result = self.transport().delete(&folder, &file_list).await;
        self.reconcile(&[folder], &file_list, result).await
    }

    /// Rename the entry at `entry_path` to `new_name`, keeping it in the same folder
    pub async fn rename(&self, entry_path: &str, new_name: &str) -> Result<()> {
        let old_path = path::normalize(entry_path)?;
        let new_name = entry_name(new_name)?;
        let Some(folder) = path::parent(&old_path).map(str::to_string) else {
            return Err(CacheError::InvalidPath(old_path));
        };
        let old_name = path::file_name(&old_path).to_string();
        let new_path = path::join(&folder, new_name);

        self.optimistic(&folder, |layer| {
            layer.apply_rename(&folder, &old_name, new_name)
        });

        let result = self.transport().rename(&old_path, &new_path).await;
        self.reconcile(&[folder], &[old_path, new_path], result).await
    }

    /// Move `paths` into `target_folder`
    pub async fn move_entries(&self, paths: &[&str], target_folder: &str) -> Result<()> {
        let target = path::normalize(target_folder)?;
        let file_list = paths
            .iter()
            .map(|p| path::normalize(p))
            .collect::<Result<Vec<_>>>()?;
        if file_list.is_empty() {
            return Ok(());
        }

        let mut folders = vec![target.clone()];
        for moved in &file_list {
            let Some(parent) = path::parent(moved) else {
                return Err(CacheError::InvalidPath(moved.clone()));
            };
            if target == *moved || target.starts_with(&format!("{moved}/")) {
                return Err(CacheError::InvalidPath(target));
            }
            if !folders.iter().any(|f| f == parent) {
                folders.push(parent.to_string());
            }
        }

        for moved in &file_list {
            if let Some(parent) = path::parent(moved) {
                self.optimistic(parent, |layer| {
                    layer.apply_remove(parent, path::file_name(moved))
                });
            }
        }

        let result = self.transport().move_entries(&file_list, &target).await;
        self.reconcile(&folders, &file_list, result).await
    }

    fn transport(&self) -> &Arc<dyn Transport> {
        self.inner.conditional.transport()
    }

    /// Apply an optimistic edit and show it if `folder` is on screen
    fn optimistic<F>(&self, folder: &str, edit: F)
    where
        F: FnOnce(&OptimisticLayer) -> bool,
    {
        if !edit(&self.inner.optimistic) || !self.is_current_path(folder) {
            return;
        }
        if let Some(entry) = self.inner.store.peek(folder) {
            self.emit(NavigationEvent::ListingUpdated {
                epoch: self.current_epoch(),
                path: folder.to_string(),
                listing: entry.listing,
                source: ListingSource::Optimistic,
            });
        }
    }

    async fn reconcile(
        &self,
        folders: &[String],
        subtrees: &[String],
        result: std::result::Result<(), TransportError>,
    ) -> Result<()> {
        let outcome = match result {
            Ok(()) => {
                debug!(folders = ?folders, "Mutation confirmed");
                for prefix in subtrees {
                    self.inner.store.invalidate_prefix(prefix);
                }
                self.inner.predictor.reset_nominations();
                Ok(())
            }
            Err(e) => {
                warn!(folders = ?folders, error = %e, "Mutation failed, restoring server state");
                Err(CacheError::from(e))
            }
        };

        for folder in folders {
            if self.is_current_path(folder) {
                if let Err(e) = self.force_refresh(folder).await {
                    debug!(path = %folder, error = %e, "Refresh after mutation failed");
                }
            } else {
                self.inner.store.invalidate(folder);
            }
        }
        outcome
    }
}
