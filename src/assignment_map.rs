//! Fetch-all results.
//!
//! An [`AssignmentMap`] holds every parameter a user is assigned to after a single round trip.
//! Trigger events are reported lazily, when a parameter is read with [`AssignmentMap::value`].
use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    emitter::Triggers,
    error::SerializationError,
    experiment::{index_by_variable, Experiment, TrackConfig},
    fetcher::FetchedExperiments,
    identity::UserIdentity,
    resolver::resolve,
    value::cast,
    Assignment, ExperimentValue, Result,
};

/// Every experiment parameter of a user, resolved from a single server response.
pub struct AssignmentMap {
    identity: UserIdentity,
    /// Authoritative experiment per parameter name.
    selected: HashMap<String, Experiment>,
    /// Out-list experiments per parameter name. Tracked, never returned.
    out_list: HashMap<String, Vec<Experiment>>,
    track_config: TrackConfig,
    response_body: String,
    timestamp: i64,
    triggers: Option<Arc<Triggers>>,
}

/// Serialized form of an [`AssignmentMap`].
#[derive(Debug, Serialize, Deserialize)]
struct DumpData {
    #[serde(default)]
    distinct_id: String,
    #[serde(default)]
    is_login_id: bool,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    custom_ids: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    response_body: String,
    #[serde(default)]
    timestamp: i64,
}

impl AssignmentMap {
    pub(crate) fn new(
        identity: UserIdentity,
        fetched: FetchedExperiments,
        timestamp: i64,
        triggers: Option<Arc<Triggers>>,
    ) -> AssignmentMap {
        let FetchedExperiments { response, body } = fetched;
        let track_config = response.track_config();

        let mut selected: HashMap<String, Experiment> = HashMap::new();
        for experiment in &response.results {
            for variable in &experiment.variables {
                let castable = variable.variable_type.natural_shape().is_some_and(|shape| {
                    cast(&variable.value, variable.variable_type, shape).is_ok()
                });
                if !castable {
                    continue;
                }
                // White-listed experiments take precedence over earlier selections.
                if experiment.is_white_list || !selected.contains_key(&variable.name) {
                    selected.insert(
                        variable.name.clone(),
                        experiment.with_extensions(&track_config),
                    );
                }
            }
        }

        let out_list = index_by_variable(&response.out_list)
            .into_iter()
            .map(|(name, experiments)| {
                let experiments = experiments
                    .into_iter()
                    .map(|experiment| experiment.with_extensions(&track_config))
                    .collect();
                (name.to_owned(), experiments)
            })
            .collect();

        AssignmentMap {
            identity,
            selected,
            out_list,
            track_config,
            response_body: body,
            timestamp,
            triggers,
        }
    }

    /// A map without assignments. Every read returns the caller's default.
    pub(crate) fn empty(identity: UserIdentity) -> AssignmentMap {
        AssignmentMap {
            identity,
            selected: HashMap::new(),
            out_list: HashMap::new(),
            track_config: TrackConfig::default(),
            response_body: String::new(),
            timestamp: Utc::now().timestamp_millis(),
            triggers: None,
        }
    }

    /// Restore a map from the output of [`AssignmentMap::dump`].
    ///
    /// Fails if the payload is malformed or was dumped for a different user.
    pub(crate) fn load(
        identity: &UserIdentity,
        dump: &str,
        triggers: Option<Arc<Triggers>>,
    ) -> Result<AssignmentMap> {
        let data: DumpData = serde_json::from_str(dump).map_err(SerializationError::from)?;

        if data.response_body.is_empty() {
            return Err(SerializationError::MissingField("response_body").into());
        }
        if data.distinct_id.is_empty() {
            return Err(SerializationError::MissingField("distinct_id").into());
        }
        if data.distinct_id != identity.distinct_id() || data.is_login_id != identity.is_login_id()
        {
            return Err(SerializationError::IdentityMismatch("distinct_id, is_login_id").into());
        }
        if &data.custom_ids != identity.custom_ids() {
            return Err(SerializationError::IdentityMismatch("custom_ids").into());
        }

        let fetched = FetchedExperiments::parse(data.response_body)
            .map_err(|err| SerializationError::InvalidResponseBody(Arc::new(err)))?;
        let timestamp = if data.timestamp == 0 {
            Utc::now().timestamp_millis()
        } else {
            data.timestamp
        };
        Ok(AssignmentMap::new(
            identity.clone(),
            fetched,
            timestamp,
            triggers,
        ))
    }

    /// Get the value of `param_name`, reporting a trigger event if auto-tracking is enabled.
    ///
    /// Returns `default` if the user is not assigned to the parameter or its value cannot be
    /// converted to the type of `default`.
    pub fn value(&self, param_name: &str, default: impl Into<ExperimentValue>) -> ExperimentValue {
        let assignment = self.assignment(param_name, default);
        if let Some(triggers) = &self.triggers {
            triggers.observe(
                &self.identity,
                assignment.experiment.as_ref(),
                &self.track_config,
                None,
            );
            for experiment in self.out_list.get(param_name).into_iter().flatten() {
                triggers.observe(&self.identity, Some(experiment), &self.track_config, None);
            }
        }
        assignment.value
    }

    /// Get the assignment of `param_name` without reporting a trigger event. Use
    /// [`Client::track_trigger`](crate::Client::track_trigger) to report it manually.
    pub fn assignment(&self, param_name: &str, default: impl Into<ExperimentValue>) -> Assignment {
        let default = default.into();
        let candidates = self.selected.get(param_name).map(std::slice::from_ref);
        let resolved = resolve(param_name, &default, candidates.unwrap_or_default());
        Assignment {
            value: resolved.value,
            experiment: resolved.experiment.cloned(),
            identity: self.identity.clone(),
            track_config: self.track_config.clone(),
        }
    }

    /// Whether the user is assigned to `param_name`.
    pub fn contains_param(&self, param_name: &str) -> bool {
        self.selected.contains_key(param_name)
    }

    /// The user the assignments were made for.
    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    #[allow(missing_docs)]
    pub fn distinct_id(&self) -> &str {
        self.identity.distinct_id()
    }

    #[allow(missing_docs)]
    pub fn is_login_id(&self) -> bool {
        self.identity.is_login_id()
    }

    /// When the assignments were fetched, in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Serialize the map so that it can be passed to another service and restored with
    /// [`Client::load_all_assignments`](crate::Client::load_all_assignments).
    ///
    /// The payload contains the user identity and the raw server response.
    pub fn dump(&self) -> Result<String> {
        let data = DumpData {
            distinct_id: self.identity.distinct_id().to_owned(),
            is_login_id: self.identity.is_login_id(),
            custom_ids: self.identity.custom_ids().clone(),
            response_body: self.response_body.clone(),
            timestamp: self.timestamp,
        };
        let dump = serde_json::to_string(&data).map_err(SerializationError::from)?;
        Ok(dump)
    }
}

impl std::fmt::Debug for AssignmentMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentMap")
            .field("identity", &self.identity)
            .field("params", &self.selected.keys().collect::<Vec<_>>())
            .field("timestamp", &self.timestamp)
            .field("auto_track", &self.triggers.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc, time::Duration};

    use serde_json::json;

    use crate::{
        dedup::TriggerDeduplicator,
        emitter::{EventEmitter, Triggers},
        error::SerializationError,
        fetcher::FetchedExperiments,
        identity::UserIdentity,
        properties::PropertyValue,
        tracker::RecordingTracker,
        Error, ExperimentValue,
    };

    use super::AssignmentMap;

    fn fixture() -> FetchedExperiments {
        let body = fs::read_to_string("tests/data/experiments-response.json")
            .expect("Failed to open tests/data/experiments-response.json");
        FetchedExperiments::parse(body).unwrap()
    }

    fn tracking_body() -> String {
        json!({
            "status": "SUCCESS",
            "results": [
                {
                    "abtest_experiment_id": "1",
                    "abtest_experiment_group_id": "0",
                    "abtest_experiment_result_id": "r1",
                    "variables": [{"name": "color", "value": "red", "type": "STRING"}]
                }
            ],
            "out_list": [
                {
                    "abtest_experiment_id": "2",
                    "abtest_experiment_group_id": "3",
                    "abtest_experiment_result_id": "r2",
                    "variables": [{"name": "color", "value": "blue", "type": "STRING"}]
                }
            ]
        })
        .to_string()
    }

    fn triggers(tracker: &RecordingTracker) -> Arc<Triggers> {
        Arc::new(Triggers::new(
            TriggerDeduplicator::new(100, Duration::from_secs(60)),
            EventEmitter::new(Box::new(tracker.clone())),
        ))
    }

    #[test]
    fn resolves_every_param() {
        let map = AssignmentMap::new(UserIdentity::login("user"), fixture(), 1, None);

        assert_eq!(map.value("btn_type", "grey"), ExperimentValue::from("red"));
        assert_eq!(map.value("page_size", 10i32), ExperimentValue::Int32(20));
        assert_eq!(map.value("show_banner", false), ExperimentValue::Boolean(true));
        assert_eq!(map.value("missing", "none"), ExperimentValue::from("none"));
        assert!(map.contains_param("layout"));
        assert!(!map.contains_param("missing"));
    }

    #[test]
    fn type_mismatch_returns_default() {
        let map = AssignmentMap::new(UserIdentity::login("user"), fixture(), 1, None);
        let assignment = map.assignment("btn_type", 5i32);
        assert_eq!(assignment.value, ExperimentValue::Int32(5));
        assert!(assignment.experiment.is_none());
    }

    #[test]
    fn white_list_overrides_earlier_selection() {
        let body = json!({
            "status": "SUCCESS",
            "results": [
                {
                    "abtest_experiment_id": "1",
                    "abtest_experiment_group_id": "0",
                    "variables": [{"name": "color", "value": "red", "type": "STRING"}]
                },
                {
                    "abtest_experiment_id": "2",
                    "abtest_experiment_group_id": "0",
                    "is_white_list": true,
                    "variables": [{"name": "color", "value": "gold", "type": "STRING"}]
                },
                {
                    "abtest_experiment_id": "3",
                    "abtest_experiment_group_id": "0",
                    "variables": [{"name": "color", "value": "blue", "type": "STRING"}]
                }
            ]
        })
        .to_string();
        let fetched = FetchedExperiments::parse(body).unwrap();
        let map = AssignmentMap::new(UserIdentity::login("user"), fetched, 1, None);

        let assignment = map.assignment("color", "none");
        assert_eq!(assignment.value, ExperimentValue::from("gold"));
        assert_eq!(assignment.experiment_id(), Some("2"));
    }

    #[test]
    fn uncastable_variable_is_not_selected() {
        let body = json!({
            "status": "SUCCESS",
            "results": [
                {
                    "abtest_experiment_id": "1",
                    "abtest_experiment_group_id": "0",
                    "variables": [{"name": "size", "value": "big", "type": "INTEGER"}]
                },
                {
                    "abtest_experiment_id": "2",
                    "abtest_experiment_group_id": "0",
                    "variables": [{"name": "size", "value": "3", "type": "INTEGER"}]
                }
            ]
        })
        .to_string();
        let map = AssignmentMap::new(
            UserIdentity::login("user"),
            FetchedExperiments::parse(body).unwrap(),
            1,
            None,
        );
        assert_eq!(map.assignment("size", 0i64).experiment_id(), Some("2"));
    }

    #[test]
    fn triggers_fire_only_on_read() {
        let tracker = RecordingTracker::default();
        let map = AssignmentMap::new(
            UserIdentity::login("user"),
            FetchedExperiments::parse(tracking_body()).unwrap(),
            1,
            Some(triggers(&tracker)),
        );
        assert!(tracker.events().is_empty());

        map.assignment("color", "none");
        assert!(tracker.events().is_empty());

        assert_eq!(map.value("color", "none"), ExperimentValue::from("red"));
        let experiment_ids: Vec<PropertyValue> = tracker
            .events()
            .iter()
            .map(|event| event.properties["$abtest_experiment_id"].clone())
            .collect();
        assert_eq!(
            experiment_ids,
            [PropertyValue::from("1"), PropertyValue::from("2")]
        );

        // Repeated reads are deduplicated.
        map.value("color", "none");
        assert_eq!(tracker.events().len(), 2);
    }

    #[test]
    fn server_trigger_switch_is_respected() {
        let tracker = RecordingTracker::default();
        let map = AssignmentMap::new(
            UserIdentity::login("user"),
            fixture(),
            1,
            Some(triggers(&tracker)),
        );
        map.value("btn_type", "grey");
        assert!(tracker.events().is_empty());
    }

    #[test]
    fn dump_and_load_round_trip() {
        let identity = UserIdentity::login("user").custom_id("device", "d1");
        let map = AssignmentMap::new(identity.clone(), fixture(), 1715000000000, None);

        let dump = map.dump().unwrap();
        let dumped: serde_json::Value = serde_json::from_str(&dump).unwrap();
        assert_eq!(dumped["distinct_id"], "user");
        assert_eq!(dumped["is_login_id"], true);
        assert_eq!(dumped["custom_ids"], json!({"device": "d1"}));
        assert_eq!(dumped["timestamp"], 1715000000000i64);

        let loaded = AssignmentMap::load(&identity, &dump, None).unwrap();
        assert_eq!(loaded.timestamp(), 1715000000000);
        for (param, default) in [
            ("btn_type", ExperimentValue::from("grey")),
            ("page_size", ExperimentValue::Int32(10)),
            ("show_banner", ExperimentValue::Boolean(false)),
            ("layout", ExperimentValue::from("{}")),
        ] {
            assert_eq!(
                loaded.value(param, default.clone()),
                map.value(param, default)
            );
        }
    }

    #[test]
    fn dump_omits_empty_custom_ids() {
        let map = AssignmentMap::new(UserIdentity::anonymous("anon"), fixture(), 1, None);
        let dumped: serde_json::Value = serde_json::from_str(&map.dump().unwrap()).unwrap();
        assert!(dumped.get("custom_ids").is_none());
    }

    #[test]
    fn load_rejects_identity_mismatch() {
        let identity = UserIdentity::login("user").custom_id("device", "d1");
        let dump = AssignmentMap::new(identity, fixture(), 1, None)
            .dump()
            .unwrap();

        for other in [
            UserIdentity::login("other").custom_id("device", "d1"),
            UserIdentity::anonymous("user").custom_id("device", "d1"),
        ] {
            assert!(matches!(
                AssignmentMap::load(&other, &dump, None),
                Err(Error::Serialization(SerializationError::IdentityMismatch(
                    "distinct_id, is_login_id"
                )))
            ));
        }
        assert!(matches!(
            AssignmentMap::load(&UserIdentity::login("user"), &dump, None),
            Err(Error::Serialization(SerializationError::IdentityMismatch(
                "custom_ids"
            )))
        ));
    }

    #[test]
    fn load_rejects_incomplete_payload() {
        let identity = UserIdentity::login("user");
        assert!(matches!(
            AssignmentMap::load(&identity, r#"{"distinct_id": "user"}"#, None),
            Err(Error::Serialization(SerializationError::MissingField(
                "response_body"
            )))
        ));
        assert!(matches!(
            AssignmentMap::load(&identity, r#"{"response_body": "{}"}"#, None),
            Err(Error::Serialization(SerializationError::MissingField(
                "distinct_id"
            )))
        ));
        assert!(matches!(
            AssignmentMap::load(&identity, "not json", None),
            Err(Error::Serialization(SerializationError::Malformed(_)))
        ));
        assert!(matches!(
            AssignmentMap::load(
                &identity,
                r#"{"distinct_id":"user","is_login_id":true,"response_body":"<html>","timestamp":1}"#,
                None
            ),
            Err(Error::Serialization(SerializationError::InvalidResponseBody(_)))
        ));
        assert!(matches!(
            AssignmentMap::load(
                &identity,
                r#"{"distinct_id":"user","is_login_id":true,"response_body":"{\"status\":\"FAILED\"}","timestamp":1}"#,
                None
            ),
            Err(Error::Serialization(SerializationError::InvalidResponseBody(_)))
        ));
    }
}
