//! Scripted in-memory server used by the unit tests

use crate::error::TransportError;
use crate::path;
use crate::transport::{BatchListing, FetchResponse, NewEntry, Transport};
use crate::types::Listing;
use async_trait::async_trait;
use image_browsing_protocol::{DirectoryEntry, EntryKind};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn file(name: &str) -> DirectoryEntry {
    DirectoryEntry {
        name: name.to_string(),
        kind: EntryKind::Image,
        size: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub(crate) fn folder(name: &str) -> DirectoryEntry {
    DirectoryEntry::folder(name, 0)
}

/// Listing of image entries with the given names
pub(crate) fn listing(names: &[&str]) -> Listing {
    Arc::new(names.iter().map(|name| file(name)).collect())
}

pub(crate) fn names(listing: &[DirectoryEntry]) -> Vec<&str> {
    listing.iter().map(|entry| entry.name.as_str()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReadCall {
    pub path: String,
    pub validator: Option<String>,
}

#[derive(Default)]
struct ServerState {
    /// path -> (entries, version)
    folders: HashMap<String, (Vec<DirectoryEntry>, u64)>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    state: Mutex<ServerState>,
    reads: Mutex<Vec<ReadCall>>,
    batches: Mutex<Vec<Vec<String>>>,
    mutations: AtomicUsize,
    fail_mutations: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a ScriptedTransport);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn set_listing(&self, path: &str, entries: Vec<DirectoryEntry>) {
        let mut state = self.state();
        let version = state.folders.get(path).map(|(_, v)| v + 1).unwrap_or(1);
        state.folders.insert(path.to_string(), (entries, version));
    }

    pub fn set_files(&self, path: &str, file_names: &[&str]) {
        self.set_listing(path, file_names.iter().map(|n| file(n)).collect());
    }

    pub fn set_delay(&self, path: &str, delay: Duration) {
        self.state().delays.insert(path.to_string(), delay);
    }

    pub fn fail_reads(&self, path: &str) {
        self.state().failing.insert(path.to_string());
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn validator_for(&self, path: &str) -> Option<String> {
        self.state()
            .folders
            .get(path)
            .map(|(_, version)| format!("\"v{version}\""))
    }

    pub fn reads(&self) -> Vec<ReadCall> {
        self.reads.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    pub fn reads_for(&self, path: &str) -> usize {
        self.reads().iter().filter(|call| call.path == path).count()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn current(&self, path: &str) -> Result<(Vec<DirectoryEntry>, String), TransportError> {
        let state = self.state();
        if state.failing.contains(path) {
            return Err(TransportError::Status(500));
        }
        state
            .folders
            .get(path)
            .map(|(entries, version)| (entries.clone(), format!("\"v{version}\"")))
            .ok_or(TransportError::Status(404))
    }

    fn check_mutation(&self) -> Result<(), TransportError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(TransportError::Server("rejected".to_string()));
        }
        Ok(())
    }

    fn edit(&self, folder: &str, apply: impl FnOnce(&mut Vec<DirectoryEntry>)) {
        let mut state = self.state();
        let (entries, version) = state
            .folders
            .entry(folder.to_string())
            .or_insert_with(|| (Vec::new(), 0));
        apply(entries);
        *version += 1;
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_listing(
        &self,
        path: &str,
        validator: Option<&str>,
    ) -> Result<FetchResponse, TransportError> {
        self.reads.lock().unwrap().push(ReadCall {
            path: path.to_string(),
            validator: validator.map(str::to_string),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self);

        let delay = self.state().delays.get(path).copied();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let (entries, current) = self.current(path)?;
        if validator == Some(current.as_str()) {
            return Ok(FetchResponse::NotModified);
        }
        Ok(FetchResponse::Modified {
            listing: entries,
            validator: Some(current),
        })
    }

    async fn fetch_batch(
        &self,
        paths: &[String],
    ) -> Result<HashMap<String, BatchListing>, TransportError> {
        self.batches.lock().unwrap().push(paths.to_vec());
        tokio::task::yield_now().await;

        let mut results = HashMap::new();
        for path in paths {
            if let Ok((listing, validator)) = self.current(path) {
                results.insert(
                    path.clone(),
                    BatchListing {
                        listing,
                        validator: Some(validator),
                    },
                );
            }
        }
        Ok(results)
    }

    async fn create(&self, folder: &str, entry: &NewEntry) -> Result<(), TransportError> {
        self.check_mutation()?;
        let created = match entry {
            NewEntry::Folder { name } => self::folder(name),
            NewEntry::File { name, contents } => DirectoryEntry {
                size: contents.len() as u64,
                ..file(name)
            },
        };
        self.edit(folder, |entries| entries.push(created));
        Ok(())
    }

    async fn delete(&self, folder: &str, file_list: &[String]) -> Result<(), TransportError> {
        self.check_mutation()?;
        let doomed: HashSet<&str> = file_list.iter().map(|p| path::file_name(p)).collect();
        self.edit(folder, |entries| {
            entries.retain(|entry| !doomed.contains(entry.name.as_str()))
        });
        Ok(())
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), TransportError> {
        self.check_mutation()?;
        let folder = path::parent(old_path).unwrap_or("/").to_string();
        let old_name = path::file_name(old_path).to_string();
        let new_name = path::file_name(new_path).to_string();
        self.edit(&folder, |entries| {
            for entry in entries.iter_mut().filter(|e| e.name == old_name) {
                entry.name = new_name.clone();
            }
        });
        Ok(())
    }

    async fn move_entries(
        &self,
        file_list: &[String],
        target_folder: &str,
    ) -> Result<(), TransportError> {
        self.check_mutation()?;
        for moved in file_list {
            let folder = path::parent(moved).unwrap_or("/").to_string();
            let name = path::file_name(moved).to_string();
            let mut taken = Vec::new();
            self.edit(&folder, |entries| {
                entries.retain(|entry| {
                    if entry.name == name {
                        taken.push(entry.clone());
                        false
                    } else {
                        true
                    }
                })
            });
            self.edit(target_folder, |entries| entries.extend(taken));
        }
        Ok(())
    }
}
