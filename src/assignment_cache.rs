//! Per-user snapshots of server assignments.
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    cache_store::{CacheEntry, CacheStore},
    experiment::{Experiment, ExperimentResponse, TrackConfig},
    identity::UserIdentity,
};

/// The cacheable part of an experiment response.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Snapshot {
    pub results: Vec<Experiment>,
    pub out_list: Vec<Experiment>,
    pub track_config: TrackConfig,
}

impl Snapshot {
    /// Keep only experiments the server allows to be cached.
    pub fn cacheable(response: &ExperimentResponse) -> Snapshot {
        let cacheable = |experiments: &[Experiment]| {
            experiments
                .iter()
                .filter(|experiment| experiment.cacheable)
                .cloned()
                .collect()
        };
        Snapshot {
            results: cacheable(&response.results),
            out_list: cacheable(&response.out_list),
            track_config: response.track_config(),
        }
    }
}

/// Assignment snapshots keyed by [`UserIdentity::cache_key`], each valid for `ttl` after it was
/// stored.
pub(crate) struct AssignmentCache {
    snapshots: CacheStore<String, CacheEntry<Arc<Snapshot>>>,
    ttl: Duration,
}

impl AssignmentCache {
    pub fn new(capacity: usize, ttl: Duration) -> AssignmentCache {
        AssignmentCache {
            snapshots: CacheStore::new(capacity),
            ttl,
        }
    }

    /// Get the user's snapshot if it is still valid. Expired snapshots are removed.
    pub fn get(&self, identity: &UserIdentity) -> Option<Arc<Snapshot>> {
        self.get_at(identity, Utc::now())
    }

    pub(crate) fn get_at(
        &self,
        identity: &UserIdentity,
        now: DateTime<Utc>,
    ) -> Option<Arc<Snapshot>> {
        let key = identity.cache_key();
        let Some(entry) = self.snapshots.get(&key) else {
            log::debug!(target: "abtesting", distinct_id = identity.distinct_id(); "assignment cache miss");
            return None;
        };
        if !entry.is_valid(self.ttl, now) {
            log::debug!(target: "abtesting", distinct_id = identity.distinct_id(); "assignment cache entry expired");
            // A fresh snapshot may have been stored since the read above; keep it.
            self.snapshots
                .remove_if(&key, |current| !current.is_valid(self.ttl, now));
            return None;
        }
        log::debug!(target: "abtesting", distinct_id = identity.distinct_id(); "assignment cache hit");
        Some(entry.value)
    }

    /// Store a fresh snapshot for the user, replacing any previous one.
    pub fn put(&self, identity: &UserIdentity, snapshot: Snapshot) {
        self.put_at(identity, snapshot, Utc::now());
    }

    pub(crate) fn put_at(&self, identity: &UserIdentity, snapshot: Snapshot, now: DateTime<Utc>) {
        self.snapshots
            .put(identity.cache_key(), CacheEntry::new(Arc::new(snapshot), now));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.snapshots.len()
    }
}
