//! An HTTP client that fetches experiment assignments from the server.
use std::{collections::BTreeMap, time::Duration};

use reqwest::Url;
use serde::Serialize;

use crate::{
    config::HttpTransportConfig, experiment::ExperimentResponse, identity::UserIdentity, Error,
    Properties, Result,
};

/// Platform reported to the experiment server.
const PLATFORM: &str = "Rust";

/// Body of an experiment request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentRequest {
    /// Set for logged-in users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    /// Set for anonymous users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    /// Version of this library.
    pub abtest_lib_version: &'static str,
    /// Always `"Rust"`.
    pub platform: &'static str,
    /// Properties used by the server for audience targeting.
    #[serde(skip_serializing_if = "Properties::is_empty")]
    pub custom_properties: Properties,
    /// Custom subject ids of the user.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_ids: BTreeMap<String, String>,
}

impl ExperimentRequest {
    pub(crate) fn new(identity: &UserIdentity, properties: &Properties) -> ExperimentRequest {
        let distinct_id = identity.distinct_id().to_owned();
        let (login_id, anonymous_id) = if identity.is_login_id() {
            (Some(distinct_id), None)
        } else {
            (None, Some(distinct_id))
        };
        ExperimentRequest {
            login_id,
            anonymous_id,
            abtest_lib_version: env!("CARGO_PKG_VERSION"),
            platform: PLATFORM,
            custom_properties: properties.clone(),
            custom_ids: identity.custom_ids().clone(),
        }
    }

    fn distinct_id(&self) -> &str {
        self.login_id
            .as_deref()
            .or(self.anonymous_id.as_deref())
            .unwrap_or_default()
    }
}

/// A successful experiment response along with its raw body.
#[derive(Debug, Clone)]
pub struct FetchedExperiments {
    /// Parsed response.
    pub response: ExperimentResponse,
    /// Raw response body, as preserved by [`AssignmentMap::dump`](crate::AssignmentMap::dump).
    pub body: String,
}

impl FetchedExperiments {
    /// Parse a response body, failing unless the server reported `SUCCESS`.
    pub fn parse(body: String) -> Result<FetchedExperiments> {
        let response: ExperimentResponse = serde_json::from_str(&body).map_err(|err| {
            log::warn!(target: "abtesting", "failed to parse experiment response: {err}");
            Error::MalformedResponse(err.into())
        })?;
        if !response.is_success() {
            log::warn!(target: "abtesting",
                status = response.status.as_str();
                "experiment server returned an error");
            return Err(Error::ServerStatus {
                status: response.status,
                message: response
                    .error
                    .or(response.error_type)
                    .unwrap_or_default(),
            });
        }
        Ok(FetchedExperiments { response, body })
    }
}

/// Source of experiment assignments.
///
/// The default implementation is [`HttpFetcher`]. Custom fetchers can be installed with
/// [`ClientConfig::fetcher`](crate::ClientConfig::fetcher).
pub trait ExperimentFetcher {
    /// Request the user's experiments, failing if no response arrives within `timeout`.
    fn fetch(&self, request: &ExperimentRequest, timeout: Duration) -> Result<FetchedExperiments>;
}

/// Fetches assignments with `POST <api_url>`.
pub struct HttpFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    api_url: Url,
    record_request_cost_time: bool,
}

impl HttpFetcher {
    /// Create a fetcher using the given connection pool settings.
    pub fn new(
        api_url: Url,
        transport: &HttpTransportConfig,
        record_request_cost_time: bool,
    ) -> Result<HttpFetcher> {
        let client = reqwest::blocking::Client::builder()
            .pool_max_idle_per_host(transport.max_idle_connections_per_host)
            .pool_idle_timeout(transport.idle_connection_timeout)
            .connect_timeout(transport.connect_timeout)
            .tcp_keepalive(transport.keep_alive)
            .build()?;

        Ok(HttpFetcher {
            client,
            api_url,
            record_request_cost_time,
        })
    }
}

impl ExperimentFetcher for HttpFetcher {
    fn fetch(&self, request: &ExperimentRequest, timeout: Duration) -> Result<FetchedExperiments> {
        log::debug!(target: "abtesting", distinct_id = request.distinct_id(); "fetching experiments");
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(self.api_url.clone())
            .timeout(timeout)
            .json(request)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text());

        if self.record_request_cost_time {
            log::info!(target: "abtesting",
                distinct_id = request.distinct_id(),
                cost_ms = started.elapsed().as_millis() as u64;
                "experiment request finished");
        }

        let body = response.map_err(|err| {
            log::warn!(target: "abtesting",
                distinct_id = request.distinct_id();
                "failed to fetch experiments: {err}");
            Error::from(err)
        })?;

        FetchedExperiments::parse(body)
    }
}

/// Fetcher that replays canned responses and records every request.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct FakeFetcher {
    body: std::sync::Arc<std::sync::Mutex<Result<String>>>,
    requests: std::sync::Arc<std::sync::Mutex<Vec<ExperimentRequest>>>,
}

#[cfg(test)]
impl FakeFetcher {
    pub fn with_body(body: impl Into<String>) -> FakeFetcher {
        FakeFetcher {
            body: std::sync::Arc::new(std::sync::Mutex::new(Ok(body.into()))),
            requests: Default::default(),
        }
    }

    pub fn from_fixture() -> FakeFetcher {
        let body = std::fs::read_to_string("tests/data/experiments-response.json")
            .expect("Failed to open tests/data/experiments-response.json");
        FakeFetcher::with_body(body)
    }

    pub fn failing(error: Error) -> FakeFetcher {
        let fetcher = FakeFetcher::with_body("");
        fetcher.set_result(Err(error));
        fetcher
    }

    pub fn set_result(&self, result: Result<String>) {
        *self.body.lock().unwrap() = result;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ExperimentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ExperimentFetcher for FakeFetcher {
    fn fetch(&self, request: &ExperimentRequest, _timeout: Duration) -> Result<FetchedExperiments> {
        self.requests.lock().unwrap().push(request.clone());
        let body = self.body.lock().unwrap().clone()?;
        FetchedExperiments::parse(body)
    }
}
