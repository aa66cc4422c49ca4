use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde::Serialize;
use trove_descriptor::{DescriptorLocation, RepositoryDeclaration, RepositoryIdentity};

/// Which descriptor locations declared each repository identity.
///
/// `record` is safe to call from concurrent ancestry walks: the first declaration seen for an
/// identity is kept as its metadata, and locations accumulate as a set under a per-entry lock.
#[derive(Debug, Default)]
pub struct ProvenanceRegistry {
    entries: DashMap<RepositoryIdentity, Arc<Entry>>,
    sequence: AtomicU64,
}

#[derive(Debug)]
struct Entry {
    order: u64,
    declaration: RepositoryDeclaration,
    locations: Mutex<BTreeSet<DescriptorLocation>>,
}

impl Entry {
    fn locations(&self) -> std::sync::MutexGuard<'_, BTreeSet<DescriptorLocation>> {
        self.locations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Provenance {
        Provenance {
            declaration: self.declaration.clone(),
            locations: self.locations().iter().cloned().collect(),
        }
    }
}

/// A registry entry as of the moment it was read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub declaration: RepositoryDeclaration,
    pub locations: Vec<DescriptorLocation>,
}

impl Provenance {
    pub fn identity(&self) -> &RepositoryIdentity {
        &self.declaration.identity
    }
}

impl ProvenanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, declaration: &RepositoryDeclaration, location: &DescriptorLocation) {
        let entry = self
            .entries
            .entry(declaration.identity.clone())
            .or_insert_with(|| {
                Arc::new(Entry {
                    order: self.sequence.fetch_add(1, Ordering::Relaxed),
                    declaration: declaration.clone(),
                    locations: Mutex::default(),
                })
            })
            .clone();
        entry.locations().insert(location.clone());
    }

    pub fn lookup(&self, identity: &RepositoryIdentity) -> Option<Provenance> {
        let entry = Arc::clone(self.entries.get(identity)?.value());
        Some(entry.snapshot())
    }

    /// Every entry, in the order identities were first recorded.
    pub fn all(&self) -> Vec<Provenance> {
        let mut entries: Vec<Arc<Entry>> = self
            .entries
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        entries.sort_by_key(|e| e.order);
        entries.iter().map(|e| e.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
