//! TTL-keyed cache of filesystem metadata for federated paths.
//!
//! # Locking
//!
//! ```text
//! slots: DashMap<(mount, RepoPath), Arc<Mutex<SlotState>>>
//!        ^ sharded map, only touched to look up / create a slot
//!                                   ^ one lock per key, never shared
//! ```
//!
//! Filesystem calls run with no lock held. A refresh notes the slot's
//! generation, scans, then takes the slot lock for the short
//! compare-and-store. `invalidate` bumps the generation, so a scan that
//! started before an invalidation is handed to its caller but never stored.
//! Ancestor invalidation walks upward taking one ancestor slot lock at a
//! time, after the child's lock has been released, so the walk cannot
//! deadlock against another refresh.
//!
//! Keys carry the owning mount: with nested mounts an outer tree's entry at
//! a path never answers for the inner mount that owns that path.
//!
//! # Freshness
//!
//! An entry is served while `now - captured_at < ttl`, with `captured_at`
//! taken before the scan. When a refresh sees a different modification
//! time, kind or listing than the entry it replaces (or finds the path
//! gone), every ancestor up to the mount root is dropped so the next request
//! for any of them re-reads the filesystem.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::SharedClock;
use crate::error::{FederationError, Result};
use crate::fs::{FileSystem, is_staging_name};
use crate::mount::FederatedPath;
use crate::path::RepoPath;
use crate::types::ResourceKind;

/// Metadata reported for a federated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: ResourceKind,
    /// For containers: the newest of the directory's own mtime and those of
    /// its listed children at capture time.
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl Stat {
    pub fn is_directory(&self) -> bool {
        self.kind.is_container()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    stat: Stat,
    children: Arc<[String]>,
    captured_at: Instant,
}

impl CacheEntry {
    pub fn stat(&self) -> Stat {
        self.stat
    }

    /// Child names in listing order at capture time.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

#[derive(Debug, Default)]
struct SlotState {
    entry: Option<CacheEntry>,
    generation: u64,
}

type Slot = Arc<Mutex<SlotState>>;
type Key = (usize, RepoPath);

fn key(path: &FederatedPath) -> Key {
    (path.mount_index(), path.repo_path().clone())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MetadataCache {
    fs: Arc<dyn FileSystem>,
    clock: SharedClock,
    ttl: Duration,
    slots: DashMap<Key, Slot>,
}

impl MetadataCache {
    pub fn new(fs: Arc<dyn FileSystem>, clock: SharedClock, ttl: Duration) -> Self {
        Self {
            fs,
            clock,
            ttl,
            slots: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Metadata for `path`, from cache when fresh.
    ///
    /// A vanished path evicts its entry and fails with `NotFound`; any other
    /// filesystem error evicts and fails with `IoFailure`.
    pub async fn stat(&self, path: &FederatedPath) -> Result<Stat> {
        Ok(self.entry(path).await?.stat)
    }

    /// Child names of a container in listing order; empty for binaries.
    pub async fn list_children(&self, path: &FederatedPath) -> Result<Vec<String>> {
        Ok(self.entry(path).await?.children.to_vec())
    }

    /// Current entry for `path`, refreshing it if missing or expired.
    pub async fn entry(&self, path: &FederatedPath) -> Result<CacheEntry> {
        let slot = self.slot(path);
        if let Some(entry) = self.fresh(&slot) {
            log::debug!("cache hit: {}", path.repo_path());
            return Ok(entry);
        }
        log::debug!("cache miss: {}", path.repo_path());
        self.refresh(path, &slot).await
    }

    /// Drop the entry for `path` and discard any refresh of it in flight.
    pub fn invalidate(&self, path: &FederatedPath) {
        if let Some(slot) = self.existing_slot(path) {
            let mut state = lock(&slot);
            state.entry = None;
            state.generation += 1;
        }
    }

    /// Drop every ancestor entry up to the mount root, one lock at a time.
    pub fn invalidate_ancestors(&self, path: &FederatedPath) {
        for ancestor in path.ancestors() {
            log::debug!("invalidating ancestor {}", ancestor.repo_path());
            self.invalidate(&ancestor);
        }
    }

    /// Number of populated entries, fresh or not.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.iter().map(|s| s.value().clone()).collect();
        slots.iter().filter(|s| lock(s).entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, path: &FederatedPath) -> Slot {
        self.slots.entry(key(path)).or_default().clone()
    }

    fn existing_slot(&self, path: &FederatedPath) -> Option<Slot> {
        self.slots.get(&key(path)).map(|s| s.value().clone())
    }

    fn fresh(&self, slot: &Slot) -> Option<CacheEntry> {
        let state = lock(slot);
        let entry = state.entry.as_ref()?;
        (self.clock.elapsed_since(entry.captured_at) < self.ttl).then(|| entry.clone())
    }

    /// The cached entry for `path` if it is still within its TTL.
    fn peek_fresh(&self, path: &FederatedPath) -> Option<CacheEntry> {
        self.existing_slot(path).and_then(|slot| self.fresh(&slot))
    }

    async fn refresh(&self, path: &FederatedPath, slot: &Slot) -> Result<CacheEntry> {
        let started = lock(slot).generation;
        let captured_at = self.clock.now();
        let (stat, children) = match self.scan(path).await {
            Ok(scanned) => scanned,
            Err(err) => {
                self.evict(path, slot, started, matches!(err, FederationError::NotFound(_)));
                return Err(err);
            }
        };
        let scanned = CacheEntry {
            stat,
            children: children.into(),
            captured_at,
        };

        let (entry, changed) = {
            let mut state = lock(slot);
            if state.generation != started {
                log::debug!("{} invalidated during refresh; not storing", path.repo_path());
                return Ok(scanned);
            }
            match state.entry.as_ref() {
                // a concurrent refresh captured later than we did; keep it
                Some(existing) if existing.captured_at > captured_at => (existing.clone(), false),
                previous => {
                    let changed = previous.is_some_and(|p| {
                        p.stat != scanned.stat || p.children != scanned.children
                    });
                    state.entry = Some(scanned.clone());
                    (scanned, changed)
                }
            }
        };

        if changed {
            log::debug!("{} changed on disk", path.repo_path());
            self.invalidate_ancestors(path);
        }
        Ok(entry)
    }

    fn evict(&self, path: &FederatedPath, slot: &Slot, started: u64, vanished: bool) {
        let had_entry = {
            let mut state = lock(slot);
            if state.generation != started {
                return;
            }
            state.entry.take().is_some()
        };
        if vanished {
            self.slots.remove_if(&key(path), |_, s| Arc::ptr_eq(s, slot));
        }
        if had_entry {
            self.invalidate_ancestors(path);
        }
    }

    /// Stat `path` and, for directories, list it and stat each child.
    async fn scan(&self, path: &FederatedPath) -> Result<(Stat, Vec<String>)> {
        let fs_path = path.fs_path();
        let own = self
            .fs
            .stat(fs_path)
            .await
            .map_err(|e| FederationError::from_io(fs_path, e))?;
        let mut stat = Stat {
            kind: own.kind,
            last_modified: own.modified,
            size: own.len,
        };
        if !own.kind.is_container() {
            return Ok((stat, Vec::new()));
        }

        let names = self
            .fs
            .read_dir(fs_path)
            .await
            .map_err(|e| FederationError::from_io(fs_path, e))?;
        let mut children = Vec::with_capacity(names.len());
        for name in names {
            if is_staging_name(&name) {
                continue;
            }
            let Ok(child) = path.child(&name) else {
                log::debug!("skipping unaddressable entry {:?} in {}", name, path.repo_path());
                continue;
            };
            match self.fs.stat(child.fs_path()).await {
                Ok(child_stat) => stat.last_modified = stat.last_modified.max(child_stat.modified),
                Err(e) => log::debug!("child {} not statable: {}", child.repo_path(), e),
            }
            if let Some(cached) = self.peek_fresh(&child) {
                stat.last_modified = stat.last_modified.max(cached.stat.last_modified);
            }
            children.push(name);
        }
        Ok((stat, children))
    }
}
