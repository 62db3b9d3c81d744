//! Wire models of the experiment server response.
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{properties::PropertyValue, Properties};

/// Response of the experiment server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResponse {
    /// `SUCCESS` for successful requests.
    pub status: String,
    /// Category of the error for failed requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Error message for failed requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Experiments the user is assigned to, in precedence order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<Experiment>,
    /// Experiments the user is eligible for but that are not the authoritative assignment.
    /// They are tracked for analysis only.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub out_list: Vec<Experiment>,
    /// Tracking switches. Defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_config: Option<TrackConfig>,
}

impl ExperimentResponse {
    pub(crate) const SUCCESS: &'static str = "SUCCESS";

    pub(crate) fn is_success(&self) -> bool {
        self.status == ExperimentResponse::SUCCESS
    }

    /// Track configuration declared by the server, or the default one.
    pub fn track_config(&self) -> TrackConfig {
        self.track_config.clone().unwrap_or_default()
    }
}

/// A server-defined experiment group the user has been assigned to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    #[allow(missing_docs)]
    #[serde(rename = "abtest_experiment_id", default)]
    pub experiment_id: String,
    #[allow(missing_docs)]
    #[serde(rename = "abtest_experiment_group_id", default)]
    pub group_id: String,
    /// Identifies a specific assignment outcome. Changes when the user is re-bucketed.
    #[serde(rename = "abtest_experiment_result_id", default)]
    pub result_id: String,
    #[allow(missing_docs)]
    #[serde(default)]
    pub experiment_type: String,
    /// Name of the subject for subject-scoped experiments, e.g. `device`.
    #[serde(default)]
    pub subject_name: String,
    /// Non-empty for subject-scoped experiments.
    #[serde(default)]
    pub subject_id: String,
    #[allow(missing_docs)]
    #[serde(rename = "abtest_experiment_version", default)]
    pub version: String,
    #[allow(missing_docs)]
    #[serde(default)]
    pub stickiness: String,
    /// Whether the assignment may be stored in the client-side cache.
    #[serde(default = "default_cacheable")]
    pub cacheable: bool,
    /// Control-group assignments are never reported.
    #[serde(default)]
    pub is_control_group: bool,
    /// White-listed assignments are never reported.
    #[serde(default)]
    pub is_white_list: bool,
    /// Variables in server-provided order.
    #[serde(rename = "variables", default, deserialize_with = "null_as_empty")]
    pub variables: Vec<Variable>,
    /// Extra trigger-event properties declared by the server's [`TrackConfig`]. Populated after
    /// resolution.
    #[serde(skip)]
    pub extension_properties: Properties,
}

fn default_cacheable() -> bool {
    true
}

/// Explicit `null` lists decode as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Experiment {
    /// Whether trigger events must never be reported for this assignment.
    pub(crate) fn is_untracked(&self) -> bool {
        self.is_white_list || self.is_control_group
    }

    /// Value of a field named in [`TrackConfig::trigger_content_ext`].
    fn ext_field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "abtest_experiment_result_id" => &self.result_id,
            "abtest_experiment_version" => &self.version,
            "stickiness" => &self.stickiness,
            "subject_name" => &self.subject_name,
            "subject_id" => &self.subject_id,
            "experiment_type" => &self.experiment_type,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Return a copy of the experiment with `extension_properties` populated from
    /// `track_config`.
    pub(crate) fn with_extensions(&self, track_config: &TrackConfig) -> Experiment {
        let mut experiment = self.clone();
        experiment.extension_properties = track_config
            .trigger_content_ext
            .iter()
            .filter_map(|name| {
                let value = self.ext_field(name)?;
                (!value.is_empty()).then(|| (format!("${name}"), PropertyValue::from(value)))
            })
            .collect();
        experiment
    }
}

/// A named experiment variable. Values are always transmitted as strings and converted
/// according to [`VariableType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Parameter name requested by callers.
    pub name: String,
    /// Raw value. JSON values are kept as their string representation.
    pub value: String,
    /// Declared type of `value`.
    #[serde(rename = "type")]
    pub variable_type: VariableType,
}

/// Declared type of a [`Variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
    #[allow(missing_docs)]
    String,
    /// A JSON document. The value is never parsed by the client.
    Json,
    /// A base-10 integer.
    Integer,
    /// `"true"` or `"false"`.
    Boolean,
    /// A type this version of the client does not know about. Such variables never match.
    #[serde(other)]
    Unknown,
}

/// Server-side tracking switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConfig {
    #[allow(missing_docs)]
    #[serde(default)]
    pub item_switch: bool,
    /// Trigger events are emitted only when enabled.
    #[serde(default = "default_trigger_switch")]
    pub trigger_switch: bool,
    #[allow(missing_docs)]
    #[serde(default)]
    pub property_set_switch: bool,
    /// Experiment fields that are attached to trigger events.
    #[serde(default = "default_trigger_content_ext")]
    pub trigger_content_ext: Vec<String>,
}

fn default_trigger_switch() -> bool {
    true
}

fn default_trigger_content_ext() -> Vec<String> {
    vec![
        "abtest_experiment_result_id".to_owned(),
        "abtest_experiment_version".to_owned(),
    ]
}

impl Default for TrackConfig {
    fn default() -> TrackConfig {
        TrackConfig {
            item_switch: false,
            trigger_switch: default_trigger_switch(),
            property_set_switch: false,
            trigger_content_ext: default_trigger_content_ext(),
        }
    }
}

/// Groups experiments by the names of their variables, preserving order.
pub(crate) fn index_by_variable<'e>(
    experiments: &'e [Experiment],
) -> HashMap<&'e str, Vec<&'e Experiment>> {
    let mut index: HashMap<&str, Vec<&Experiment>> = HashMap::new();
    for experiment in experiments {
        for variable in &experiment.variables {
            index.entry(variable.name.as_str()).or_default().push(experiment);
        }
    }
    index
}
