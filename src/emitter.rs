//! Trigger event construction and delivery.
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    dedup::TriggerDeduplicator,
    experiment::{Experiment, TrackConfig},
    identity::UserIdentity,
    properties::PropertyValue,
    tracker::{AnalyticsTracker, TriggerEvent, TRIGGER_EVENT_NAME},
    Properties,
};

const LIB_PLUGIN_VERSION: &str = concat!("rust_abtesting:", env!("CARGO_PKG_VERSION"));

/// Builds trigger events and hands them to the tracker.
pub(crate) struct EventEmitter {
    tracker: Box<dyn AnalyticsTracker + Send + Sync>,
    /// UTC day the library version was last attached. `None` until the first event.
    version_marked_on: Mutex<Option<NaiveDate>>,
}

impl EventEmitter {
    pub fn new(tracker: Box<dyn AnalyticsTracker + Send + Sync>) -> EventEmitter {
        EventEmitter {
            tracker,
            version_marked_on: Mutex::new(None),
        }
    }

    /// Report that `identity` was observed in `experiment`. Delivery failures are logged.
    pub fn emit(&self, identity: &UserIdentity, experiment: &Experiment, extras: Option<&Properties>) {
        self.emit_at(identity, experiment, extras, Utc::now());
    }

    pub(crate) fn emit_at(
        &self,
        identity: &UserIdentity,
        experiment: &Experiment,
        extras: Option<&Properties>,
        now: DateTime<Utc>,
    ) {
        let mut properties = extras.cloned().unwrap_or_default();
        properties.insert(
            "$abtest_experiment_id".to_owned(),
            experiment.experiment_id.as_str().into(),
        );
        properties.insert(
            "$abtest_experiment_group_id".to_owned(),
            experiment.group_id.as_str().into(),
        );
        properties.extend(
            experiment
                .extension_properties
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        if self.take_version_marker(now.date_naive()) {
            properties.insert(
                "$lib_plugin_version".to_owned(),
                PropertyValue::List(vec![LIB_PLUGIN_VERSION.to_owned()]),
            );
        }

        let event = TriggerEvent {
            distinct_id: identity.distinct_id().to_owned(),
            is_login_id: identity.is_login_id(),
            event: TRIGGER_EVENT_NAME,
            properties,
            custom_ids: identity.custom_ids().clone(),
        };

        log::trace!(target: "abtesting", event:serde; "emitting trigger event");
        match self.tracker.track(&event) {
            Ok(()) => self.tracker.flush(),
            Err(err) => {
                log::warn!(target: "abtesting",
                    distinct_id = event.distinct_id,
                    experiment_id:display = experiment.experiment_id;
                    "failed to deliver trigger event: {err}");
            }
        }
    }

    /// Returns `true` for the first event and the first event of every new day.
    fn take_version_marker(&self, today: NaiveDate) -> bool {
        let mut marked_on = self
            .version_marked_on
            .lock()
            .expect("thread holding version marker lock should not panic");
        if marked_on.is_some_and(|day| day >= today) {
            return false;
        }
        *marked_on = Some(today);
        true
    }
}

/// Deduplicates observed assignments and emits the ones that should be reported.
pub(crate) struct Triggers {
    dedup: TriggerDeduplicator,
    emitter: EventEmitter,
}

impl Triggers {
    pub fn new(dedup: TriggerDeduplicator, emitter: EventEmitter) -> Triggers {
        Triggers { dedup, emitter }
    }

    /// Report an observed assignment unless tracking is switched off by the server, the
    /// assignment is a white-list or control-group one, or it was recently reported.
    pub fn observe(
        &self,
        identity: &UserIdentity,
        experiment: Option<&Experiment>,
        track_config: &TrackConfig,
        extras: Option<&Properties>,
    ) {
        let Some(experiment) = experiment else {
            return;
        };
        if !track_config.trigger_switch || experiment.is_untracked() {
            return;
        }
        if self.dedup.should_fire(identity, experiment) {
            self.emitter.emit(identity, experiment, extras);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use crate::{
        dedup::TriggerDeduplicator,
        experiment::{Experiment, TrackConfig},
        identity::UserIdentity,
        properties::PropertyValue,
        tracker::RecordingTracker,
        Properties,
    };

    use super::{EventEmitter, Triggers, LIB_PLUGIN_VERSION};

    fn experiment() -> Experiment {
        Experiment {
            experiment_id: "101".into(),
            group_id: "1".into(),
            result_id: "r1".into(),
            version: "2".into(),
            ..Default::default()
        }
        .with_extensions(&TrackConfig::default())
    }

    #[test]
    fn event_carries_experiment_and_extension_properties() {
        let tracker = RecordingTracker::default();
        let emitter = EventEmitter::new(Box::new(tracker.clone()));
        let identity = UserIdentity::anonymous("anon").custom_id("device", "d1");

        emitter.emit(&identity, &experiment(), None);

        let events = tracker.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event, "$ABTestTrigger");
        assert_eq!(event.distinct_id, "anon");
        assert!(!event.is_login_id);
        assert_eq!(event.custom_ids["device"], "d1");
        assert_eq!(
            event.properties["$abtest_experiment_id"],
            PropertyValue::from("101")
        );
        assert_eq!(
            event.properties["$abtest_experiment_group_id"],
            PropertyValue::from("1")
        );
        assert_eq!(
            event.properties["$abtest_experiment_result_id"],
            PropertyValue::from("r1")
        );
        assert_eq!(
            event.properties["$abtest_experiment_version"],
            PropertyValue::from("2")
        );
        assert_eq!(tracker.flushes(), 1);
    }

    #[test]
    fn caller_extras_cannot_override_experiment_ids() {
        let tracker = RecordingTracker::default();
        let emitter = EventEmitter::new(Box::new(tracker.clone()));
        let extras = Properties::from([
            ("page".to_owned(), PropertyValue::from("home")),
            ("$abtest_experiment_id".to_owned(), PropertyValue::from("fake")),
        ]);

        emitter.emit(&UserIdentity::login("user"), &experiment(), Some(&extras));

        let event = &tracker.events()[0];
        assert_eq!(event.properties["page"], PropertyValue::from("home"));
        assert_eq!(
            event.properties["$abtest_experiment_id"],
            PropertyValue::from("101")
        );
    }

    #[test]
    fn version_marker_attached_once_per_day() {
        let tracker = RecordingTracker::default();
        let emitter = EventEmitter::new(Box::new(tracker.clone()));
        let identity = UserIdentity::login("user");
        let morning = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        emitter.emit_at(&identity, &experiment(), None, morning);
        emitter.emit_at(&identity, &experiment(), None, morning + chrono::Duration::hours(2));
        emitter.emit_at(&identity, &experiment(), None, morning + chrono::Duration::days(1));

        let marked: Vec<bool> = tracker
            .events()
            .iter()
            .map(|event| event.properties.contains_key("$lib_plugin_version"))
            .collect();
        assert_eq!(marked, [true, false, true]);
        assert_eq!(
            tracker.events()[0].properties["$lib_plugin_version"],
            PropertyValue::List(vec![LIB_PLUGIN_VERSION.to_owned()])
        );
        assert!(LIB_PLUGIN_VERSION.starts_with("rust_abtesting:"));
    }

    #[test]
    fn delivery_failure_is_swallowed_without_flush() {
        let tracker = RecordingTracker::failing();
        let emitter = EventEmitter::new(Box::new(tracker.clone()));

        emitter.emit(&UserIdentity::login("user"), &experiment(), None);

        assert_eq!(tracker.events().len(), 1);
        assert_eq!(tracker.flushes(), 0);
    }

    fn triggers(tracker: &RecordingTracker) -> Triggers {
        Triggers::new(
            TriggerDeduplicator::new(10, Duration::from_secs(60)),
            EventEmitter::new(Box::new(tracker.clone())),
        )
    }

    #[test]
    fn control_and_white_list_never_fire() {
        let tracker = RecordingTracker::default();
        let triggers = triggers(&tracker);
        let identity = UserIdentity::login("user");
        let track_config = TrackConfig::default();

        let control = Experiment {
            is_control_group: true,
            ..experiment()
        };
        let white_list = Experiment {
            experiment_id: "102".into(),
            is_white_list: true,
            ..experiment()
        };
        triggers.observe(&identity, Some(&control), &track_config, None);
        triggers.observe(&identity, Some(&white_list), &track_config, None);
        triggers.observe(&identity, None, &track_config, None);

        assert!(tracker.events().is_empty());
    }

    #[test]
    fn trigger_switch_disables_events() {
        let tracker = RecordingTracker::default();
        let triggers = triggers(&tracker);
        let track_config = TrackConfig {
            trigger_switch: false,
            ..Default::default()
        };

        triggers.observe(
            &UserIdentity::login("user"),
            Some(&experiment()),
            &track_config,
            None,
        );

        assert!(tracker.events().is_empty());
    }

    #[test]
    fn duplicate_observations_fire_once() {
        let tracker = RecordingTracker::default();
        let triggers = triggers(&tracker);
        let identity = UserIdentity::login("user");
        let track_config = TrackConfig::default();

        triggers.observe(&identity, Some(&experiment()), &track_config, None);
        triggers.observe(&identity, Some(&experiment()), &track_config, None);
        assert_eq!(tracker.events().len(), 1);

        let rebucketed = Experiment {
            result_id: "r2".into(),
            ..experiment()
        };
        triggers.observe(&identity, Some(&rebucketed), &track_config, None);
        assert_eq!(tracker.events().len(), 2);
    }
}
