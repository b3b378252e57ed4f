//! Local edits applied to cached listings ahead of server confirmation
//!
//! Every edit replaces the whole listing and stores it without a validator,
//! so the next read of that folder is unconditional and the server's answer
//! overwrites whatever was guessed here.

use crate::store::EntryStore;
use chrono::Utc;
use image_browsing_protocol::{DirectoryEntry, EntryKind};
use mime_guess::mime;
use std::sync::Arc;
use tracing::debug;

pub struct OptimisticLayer {
    store: Arc<EntryStore>,
}

impl OptimisticLayer {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self { store }
    }

    /// Apply `edit` to the cached listing of `path`. No-op when the folder is
    /// not cached or the edit changes nothing.
    fn edit<F>(&self, path: &str, edit: F) -> bool
    where
        F: FnOnce(&mut Vec<DirectoryEntry>) -> bool,
    {
        let Some(cached) = self.store.peek(path) else {
            return false;
        };
        let mut listing = cached.listing.as_ref().clone();
        if !edit(&mut listing) {
            return false;
        }
        self.store.set(path, Arc::new(listing), None);
        true
    }

    /// Add `entry` to `path`, replacing an entry with the same name
    pub fn apply_add(&self, path: &str, entry: DirectoryEntry) -> bool {
        let applied = self.edit(path, |listing| {
            listing.retain(|existing| existing.name != entry.name);
            listing.push(entry);
            true
        });
        if applied {
            debug!(path, "Applied optimistic add");
        }
        applied
    }

    pub fn apply_remove(&self, path: &str, name: &str) -> bool {
        let applied = self.edit(path, |listing| {
            let before = listing.len();
            listing.retain(|existing| existing.name != name);
            listing.len() != before
        });
        if applied {
            debug!(path, name, "Applied optimistic remove");
        }
        applied
    }

    pub fn apply_rename(&self, path: &str, old_name: &str, new_name: &str) -> bool {
        let applied = self.edit(path, |listing| {
            let mut renamed = false;
            for existing in listing.iter_mut().filter(|e| e.name == old_name) {
                existing.name = new_name.to_string();
                existing.updated_at = Utc::now().timestamp_millis();
                renamed = true;
            }
            renamed
        });
        if applied {
            debug!(path, old_name, new_name, "Applied optimistic rename");
        }
        applied
    }
}

/// Placeholder entry for a file that is still uploading
pub fn pending_file(name: &str, size: u64) -> DirectoryEntry {
    let now = Utc::now().timestamp_millis();
    DirectoryEntry {
        name: name.to_string(),
        kind: kind_for_name(name),
        size,
        created_at: now,
        updated_at: now,
    }
}

/// Guess the entry kind from the file extension
pub fn kind_for_name(name: &str) -> EntryKind {
    let Some(guess) = mime_guess::from_path(name).first() else {
        return EntryKind::Other;
    };
    let top = guess.type_();
    if top == mime::IMAGE {
        EntryKind::Image
    } else if top == mime::VIDEO {
        EntryKind::Video
    } else if top == mime::AUDIO {
        EntryKind::Audio
    } else {
        EntryKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::storage::MemoryStore;
    use crate::testing::{folder, listing, names};

    fn setup() -> (Arc<EntryStore>, OptimisticLayer) {
        let store = Arc::new(EntryStore::new(
            &CacheConfig::default(),
            Arc::new(MemoryStore::new()),
        ));
        (Arc::clone(&store), OptimisticLayer::new(store))
    }

    fn confirmed(store: &EntryStore, path: &str, files: &[&str]) {
        store.set(path, listing(files), Some("\"v1\"".to_string()));
    }

    #[test]
    fn test_remove_marks_entry_unconfirmed() {
        let (store, layer) = setup();
        confirmed(&store, "/out", &["file1", "file2"]);
        let before = store.peek("/out").unwrap().listing;

        assert!(layer.apply_remove("/out", "file1"));

        let entry = store.peek("/out").unwrap();
        assert_eq!(names(&entry.listing), vec!["file2"]);
        assert!(!entry.is_confirmed());
        // Copy on write: earlier readers keep their snapshot
        assert_eq!(names(&before), vec!["file1", "file2"]);
    }

    #[test]
    fn test_add_replaces_same_name() {
        let (store, layer) = setup();
        confirmed(&store, "/out", &["a.png", "b.png"]);

        assert!(layer.apply_add("/out", folder("a.png")));
        assert!(layer.apply_add("/out", folder("new")));

        let data = store.get_data("/out").unwrap();
        assert_eq!(names(&data), vec!["b.png", "a.png", "new"]);
        assert!(data[1].is_folder());
    }

    #[test]
    fn test_rename() {
        let (store, layer) = setup();
        confirmed(&store, "/out", &["a.png", "b.png"]);

        assert!(layer.apply_rename("/out", "a.png", "c.png"));
        assert_eq!(names(&store.get_data("/out").unwrap()), vec!["c.png", "b.png"]);

        // Unknown names leave the confirmed entry alone
        confirmed(&store, "/out", &["a.png"]);
        assert!(!layer.apply_rename("/out", "zzz.png", "c.png"));
        assert!(store.peek("/out").unwrap().is_confirmed());
    }

    #[test]
    fn test_uncached_folder_is_noop() {
        let (store, layer) = setup();
        assert!(!layer.apply_add("/missing", folder("x")));
        assert!(!layer.apply_remove("/missing", "x"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_kind_for_name() {
        assert_eq!(kind_for_name("cat.PNG"), EntryKind::Image);
        assert_eq!(kind_for_name("clip.mp4"), EntryKind::Video);
        assert_eq!(kind_for_name("song.mp3"), EntryKind::Audio);
        assert_eq!(kind_for_name("workflow.json"), EntryKind::Other);
        assert_eq!(kind_for_name("no_extension"), EntryKind::Other);

        let pending = pending_file("cat.webp", 42);
        assert_eq!(pending.kind, EntryKind::Image);
        assert_eq!(pending.size, 42);
    }
}
