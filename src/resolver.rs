//! Resolution of a requested parameter against candidate experiments.
//!
//! Resolution functions are pure: they don't touch caches, the network or trackers, and give
//! identical results for identically ordered candidates.
use crate::{
    experiment::Experiment,
    value::{cast, ExperimentValue, Shape},
};

/// Result of resolving a single parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<'e> {
    /// The matched variable's value or, if nothing matched, the caller's default.
    pub value: ExperimentValue,
    /// The experiment the value came from. `None` if the default was used.
    pub experiment: Option<&'e Experiment>,
}

/// Find the first experiment that has a variable named `param_name` convertible to the shape of
/// `default`.
///
/// Candidates are scanned in order (server-provided precedence), and variables within each
/// candidate in order. The first match wins. Variables that fail conversion are skipped.
pub fn resolve<'e>(
    param_name: &str,
    default: &ExperimentValue,
    candidates: &'e [Experiment],
) -> Resolved<'e> {
    let shape = default.shape();
    candidates
        .iter()
        .find_map(|experiment| {
            match_variable(param_name, shape, experiment).map(|value| Resolved {
                value,
                experiment: Some(experiment),
            })
        })
        .unwrap_or_else(|| Resolved {
            value: default.clone(),
            experiment: None,
        })
}

/// Return every experiment that has a variable named `param_name` convertible to `shape`, in
/// candidate order.
///
/// Used for experiments the user is eligible for but that are not the authoritative
/// assignment. Their values are never returned to callers.
pub fn resolve_all<'e>(
    param_name: &str,
    shape: Shape,
    candidates: &'e [Experiment],
) -> Vec<(ExperimentValue, &'e Experiment)> {
    candidates
        .iter()
        .filter_map(|experiment| {
            match_variable(param_name, shape, experiment).map(|value| (value, experiment))
        })
        .collect()
}

fn match_variable(param_name: &str, shape: Shape, experiment: &Experiment) -> Option<ExperimentValue> {
    experiment
        .variables
        .iter()
        .filter(|variable| variable.name == param_name)
        .find_map(|variable| {
            cast(&variable.value, variable.variable_type, shape)
                .inspect_err(|err| {
                    log::debug!(target: "abtesting",
                        param_name,
                        experiment_id:display = experiment.experiment_id;
                        "skipping variable: {err}");
                })
                .ok()
        })
}
