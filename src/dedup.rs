//! Trigger deduplication.
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    cache_store::{is_within, CacheStore},
    experiment::Experiment,
    identity::UserIdentity,
};

/// Last trigger reported for a dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TriggerRecord {
    pub last_fired_at: DateTime<Utc>,
    pub last_fired_result_id: String,
}

/// Decides whether an observed assignment should be reported.
///
/// An observation fires if its key was never fired, if the last firing is at least `ttl` old,
/// or if the server re-bucketed the user (the `result_id` changed). Checking and recording a
/// firing is a single atomic step per key.
pub(crate) struct TriggerDeduplicator {
    records: Option<CacheStore<String, TriggerRecord>>,
    ttl: Duration,
}

impl TriggerDeduplicator {
    /// Create a deduplicator holding at most `capacity` records.
    pub fn new(capacity: usize, ttl: Duration) -> TriggerDeduplicator {
        TriggerDeduplicator {
            records: Some(CacheStore::new(capacity)),
            ttl,
        }
    }

    /// A deduplicator that lets every observation through and records nothing.
    pub fn disabled() -> TriggerDeduplicator {
        TriggerDeduplicator {
            records: None,
            ttl: Duration::ZERO,
        }
    }

    /// Returns `true` if the observation should be reported, recording it as fired.
    pub fn should_fire(&self, identity: &UserIdentity, experiment: &Experiment) -> bool {
        self.should_fire_at(identity, experiment, Utc::now())
    }

    pub(crate) fn should_fire_at(
        &self,
        identity: &UserIdentity,
        experiment: &Experiment,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(records) = &self.records else {
            return true;
        };

        let key = identity.trigger_key(experiment);
        let fired = records.replace_with(key, |previous| {
            let suppress = previous.is_some_and(|record| {
                record.last_fired_result_id == experiment.result_id
                    && is_within(record.last_fired_at, self.ttl, now)
            });
            (!suppress).then(|| TriggerRecord {
                last_fired_at: now,
                last_fired_result_id: experiment.result_id.clone(),
            })
        });

        if !fired {
            log::debug!(target: "abtesting",
                distinct_id = identity.distinct_id(),
                experiment_id:display = experiment.experiment_id;
                "suppressed duplicate trigger");
        }
        fired
    }
}
