use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::markers::region::RegionPos;

/// Regions that currently have a marker job, each tagged with the generation
/// of the job that owns it.
///
/// A region rebuilt after [`LiveRegions::remove`] gets a new generation, so a
/// job still running for the old one can tell its result is stale.
#[derive(Debug, Default)]
pub struct LiveRegions {
    owners: DashMap<RegionPos, u64>,
    next_generation: AtomicU64,
}

impl LiveRegions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new owner's generation, or `None` if the region is already
    /// live.
    pub fn claim(&self, region: RegionPos) -> Option<u64> {
        match self.owners.entry(region) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                entry.insert(generation);
                Some(generation)
            }
        }
    }

    pub fn is_current(&self, region: RegionPos, generation: u64) -> bool {
        self.owners
            .get(&region)
            .is_some_and(|owner| *owner == generation)
    }

    /// Gives the region up, but only if `generation` still owns it.
    pub fn release(&self, region: RegionPos, generation: u64) -> bool {
        self.owners
            .remove_if(&region, |_, owner| *owner == generation)
            .is_some()
    }

    pub fn remove(&self, region: RegionPos) -> bool {
        self.owners.remove(&region).is_some()
    }

    pub fn contains(&self, region: RegionPos) -> bool {
        self.owners.contains_key(&region)
    }

    pub fn retain(&self, mut keep: impl FnMut(RegionPos) -> bool) {
        self.owners.retain(|region, _| keep(*region));
    }

    pub fn regions(&self) -> Vec<RegionPos> {
        self.owners.iter().map(|entry| *entry.key()).collect()
    }

    pub fn clear(&self) {
        self.owners.clear();
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
