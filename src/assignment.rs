use crate::{
    experiment::{Experiment, TrackConfig},
    identity::UserIdentity,
    ExperimentValue,
};

/// Result of fetching a single experiment parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The experiment's value or, if the user is not in a matching experiment, the default.
    pub value: ExperimentValue,
    /// The experiment `value` came from. `None` if the default was returned.
    pub experiment: Option<Experiment>,
    /// The user the assignment was made for.
    pub identity: UserIdentity,
    pub(crate) track_config: TrackConfig,
}

impl Assignment {
    pub(crate) fn default_for(identity: &UserIdentity, default_value: &ExperimentValue) -> Self {
        Assignment {
            value: default_value.clone(),
            experiment: None,
            identity: identity.clone(),
            track_config: TrackConfig::default(),
        }
    }

    /// Whether the value came from an experiment.
    pub fn is_assigned(&self) -> bool {
        self.experiment.is_some()
    }

    /// Id of the assigned experiment.
    pub fn experiment_id(&self) -> Option<&str> {
        self.experiment
            .as_ref()
            .map(|experiment| experiment.experiment_id.as_str())
    }

    /// Id of the assigned experiment group.
    pub fn group_id(&self) -> Option<&str> {
        self.experiment
            .as_ref()
            .map(|experiment| experiment.group_id.as_str())
    }

    /// Whether the user is in the experiment's control group.
    pub fn is_control_group(&self) -> bool {
        self.experiment
            .as_ref()
            .is_some_and(|experiment| experiment.is_control_group)
    }

    /// Whether the user was white-listed into the experiment.
    pub fn is_white_list(&self) -> bool {
        self.experiment
            .as_ref()
            .is_some_and(|experiment| experiment.is_white_list)
    }
}
