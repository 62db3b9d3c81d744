use std::sync::Arc;

use chrono::Utc;
use reqwest::Url;

use crate::{
    assignment_cache::{AssignmentCache, Snapshot},
    dedup::TriggerDeduplicator,
    emitter::{EventEmitter, Triggers},
    experiment::{Experiment, TrackConfig},
    fetcher::{ExperimentRequest, FetchedExperiments, HttpFetcher},
    identity::UserIdentity,
    resolver::{resolve, resolve_all},
    validation::{check_custom_ids, check_properties},
    Assignment, AssignmentMap, ClientConfig, Error, ExperimentFetcher, FetchAllRequest, FetchError,
    FetchRequest, Properties, Result, ValidationError,
};

/// A client for the A/B testing server.
///
/// The client is `Send + Sync` and is meant to be shared by every request handler of a
/// service: it holds the assignment cache and the trigger deduplication cache.
///
/// # Examples
/// ```
/// # use abtesting::{Client, ClientConfig};
/// let client = Client::new(ClientConfig::from_api_url("https://abtest.example.com/api")).unwrap();
/// ```
pub struct Client {
    fetcher: Box<dyn ExperimentFetcher + Send + Sync>,
    assignments: AssignmentCache,
    /// `None` when no analytics tracker is configured.
    triggers: Option<Arc<Triggers>>,
    enable_auto_track: bool,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// Fails if the API URL is empty or invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.api_url.is_empty() {
            return Err(Error::EmptyApiUrl);
        }
        let api_url = Url::parse(&config.api_url).map_err(Error::InvalidApiUrl)?;

        let fetcher: Box<dyn ExperimentFetcher + Send + Sync> = match config.fetcher {
            Some(fetcher) => fetcher,
            None => Box::new(HttpFetcher::new(
                api_url,
                &config.http_transport,
                config.record_request_cost_time,
            )?),
        };

        let dedup = if config.enable_event_cache {
            TriggerDeduplicator::new(config.event_cache_size, config.event_cache_ttl)
        } else {
            TriggerDeduplicator::disabled()
        };
        let triggers = config
            .analytics_tracker
            .map(|tracker| Arc::new(Triggers::new(dedup, EventEmitter::new(tracker))));

        Ok(Client {
            fetcher,
            assignments: AssignmentCache::new(
                config.experiment_cache_size,
                config.experiment_cache_ttl,
            ),
            triggers,
            enable_auto_track: config.enable_auto_track,
        })
    }

    /// Fetch the user's assignment for a parameter from the server, bypassing the cache.
    ///
    /// The fresh response replaces the user's cached assignments. On failure, the error carries
    /// an assignment holding the request's default value. Failed requests are never cached.
    pub fn fetch_always_network(
        &self,
        identity: &UserIdentity,
        request: &FetchRequest,
    ) -> Result<Assignment, FetchError<Assignment>> {
        let fallback = || Assignment::default_for(identity, &request.default_value);
        validate_fetch(identity, request).map_err(|err| FetchError::new(err, fallback()))?;

        let fetched = self
            .fetch_and_cache(identity, request)
            .map_err(|err| FetchError::new(err, fallback()))?;

        let response = &fetched.response;
        Ok(self.assign_and_track(
            identity,
            request,
            &response.results,
            &response.out_list,
            &response.track_config(),
        ))
    }

    /// Fetch the user's assignment for a parameter, using cached assignments when they are
    /// still valid.
    ///
    /// If the cache holds no valid assignments for the user, or they don't resolve the
    /// parameter, the server is queried and the response is cached.
    pub fn fetch_cache_first(
        &self,
        identity: &UserIdentity,
        request: &FetchRequest,
    ) -> Result<Assignment, FetchError<Assignment>> {
        let fallback = || Assignment::default_for(identity, &request.default_value);
        validate_fetch(identity, request).map_err(|err| FetchError::new(err, fallback()))?;

        if let Some(snapshot) = self.assignments.get(identity) {
            let assignment = self.assign(identity, request, &snapshot.results, &snapshot.track_config);
            if assignment.is_assigned() {
                self.auto_track(request, &assignment, &snapshot.out_list);
                return Ok(assignment);
            }
            log::debug!(target: "abtesting",
                distinct_id = identity.distinct_id(),
                param_name = request.param_name.as_str();
                "cached assignments do not resolve the parameter");
        }

        self.fetch_always_network(identity, request)
    }

    /// Report a trigger event for an assignment obtained without auto-tracking.
    ///
    /// Nothing is reported if no analytics tracker is configured, the server disabled triggers,
    /// the assignment came from a white-list or control group, no experiment was assigned or
    /// the same assignment was reported recently.
    pub fn track_trigger(&self, assignment: &Assignment, properties: Option<&Properties>) -> Result<()> {
        validate_identity(&assignment.identity)?;
        if let Some(properties) = properties {
            check_properties(properties)?;
        }

        if let Some(triggers) = &self.triggers {
            triggers.observe(
                &assignment.identity,
                assignment.experiment.as_ref(),
                &assignment.track_config,
                properties,
            );
        }
        Ok(())
    }

    /// Fetch every parameter the user is assigned to in a single request.
    ///
    /// Trigger events are reported when parameters are read from the returned map. On failure,
    /// the error carries an empty map. The assignment cache is not used.
    pub fn fetch_all_assignments(
        &self,
        identity: &UserIdentity,
        request: &FetchAllRequest,
    ) -> Result<AssignmentMap, FetchError<AssignmentMap>> {
        let fallback = || AssignmentMap::empty(identity.clone());
        validate_identity(identity)
            .and_then(|()| request.validate())
            .map_err(|err| FetchError::new(err, fallback()))?;

        let fetched = self
            .fetcher
            .fetch(
                &ExperimentRequest::new(identity, &request.properties),
                request.timeout,
            )
            .map_err(|err| FetchError::new(err, fallback()))?;

        Ok(AssignmentMap::new(
            identity.clone(),
            fetched,
            Utc::now().timestamp_millis(),
            self.lazy_triggers(request.auto_track),
        ))
    }

    /// Restore the output of [`AssignmentMap::dump`] produced by this or another service.
    ///
    /// Fails if the payload is malformed or was dumped for a different user. No request is
    /// sent to the server.
    pub fn load_all_assignments(
        &self,
        identity: &UserIdentity,
        dump: &str,
        enable_auto_track: bool,
    ) -> Result<AssignmentMap> {
        validate_identity(identity)?;
        AssignmentMap::load(identity, dump, self.lazy_triggers(Some(enable_auto_track)))
    }

    fn fetch_and_cache(
        &self,
        identity: &UserIdentity,
        request: &FetchRequest,
    ) -> Result<FetchedExperiments> {
        let fetched = self
            .fetcher
            .fetch(
                &ExperimentRequest::new(identity, &request.properties),
                request.timeout,
            )
            .inspect_err(|err| {
                log::warn!(target: "abtesting",
                    distinct_id = identity.distinct_id(),
                    param_name = request.param_name.as_str();
                    "failed to fetch experiments: {err}");
            })?;
        self.assignments
            .put(identity, Snapshot::cacheable(&fetched.response));
        Ok(fetched)
    }

    fn assign(
        &self,
        identity: &UserIdentity,
        request: &FetchRequest,
        results: &[Experiment],
        track_config: &TrackConfig,
    ) -> Assignment {
        let resolved = resolve(&request.param_name, &request.default_value, results);
        log::trace!(target: "abtesting",
            distinct_id = identity.distinct_id(),
            param_name = request.param_name.as_str(),
            value:serde = resolved.value;
            "resolved assignment");
        Assignment {
            value: resolved.value,
            experiment: resolved
                .experiment
                .map(|experiment| experiment.with_extensions(track_config)),
            identity: identity.clone(),
            track_config: track_config.clone(),
        }
    }

    fn assign_and_track(
        &self,
        identity: &UserIdentity,
        request: &FetchRequest,
        results: &[Experiment],
        out_list: &[Experiment],
        track_config: &TrackConfig,
    ) -> Assignment {
        let assignment = self.assign(identity, request, results, track_config);
        self.auto_track(request, &assignment, out_list);
        assignment
    }

    /// Report the assignment and every matching out-list experiment, if auto-tracking applies.
    fn auto_track(&self, request: &FetchRequest, assignment: &Assignment, out_list: &[Experiment]) {
        if !request.auto_track.unwrap_or(self.enable_auto_track) {
            return;
        }
        let Some(triggers) = &self.triggers else {
            return;
        };

        let track_config = &assignment.track_config;
        triggers.observe(
            &assignment.identity,
            assignment.experiment.as_ref(),
            track_config,
            None,
        );
        for (_, experiment) in resolve_all(&request.param_name, request.default_value.shape(), out_list) {
            triggers.observe(
                &assignment.identity,
                Some(&experiment.with_extensions(track_config)),
                track_config,
                None,
            );
        }
    }

    fn lazy_triggers(&self, auto_track: Option<bool>) -> Option<Arc<Triggers>> {
        if auto_track.unwrap_or(self.enable_auto_track) {
            self.triggers.clone()
        } else {
            None
        }
    }
}

fn validate_identity(identity: &UserIdentity) -> Result<(), ValidationError> {
    if identity.distinct_id().is_empty() {
        return Err(ValidationError::EmptyDistinctId);
    }
    check_custom_ids(identity.custom_ids())
}

fn validate_fetch(identity: &UserIdentity, request: &FetchRequest) -> Result<(), ValidationError> {
    validate_identity(identity)?;
    request.validate()
}
