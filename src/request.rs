use std::time::Duration;

use crate::{
    validation::check_properties, ExperimentValue, Properties, PropertyValue, Result,
    ValidationError,
};

/// Default timeout of experiment requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Request for a single experiment parameter.
///
/// ```
/// # use abtesting::FetchRequest;
/// let request = FetchRequest::new("page_size", 10)
///     .property("city", "Paris")
///     .auto_track(false);
/// ```
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub(crate) param_name: String,
    pub(crate) default_value: ExperimentValue,
    pub(crate) properties: Properties,
    pub(crate) timeout: Duration,
    pub(crate) auto_track: Option<bool>,
}

impl FetchRequest {
    /// Request `param_name`, falling back to `default_value`. The variant of `default_value`
    /// determines the type a variable must have to match.
    pub fn new(param_name: impl Into<String>, default_value: impl Into<ExperimentValue>) -> Self {
        FetchRequest {
            param_name: param_name.into(),
            default_value: default_value.into(),
            properties: Properties::new(),
            timeout: DEFAULT_TIMEOUT,
            auto_track: None,
        }
    }

    /// Add a targeting property sent to the experiment server.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replace all targeting properties.
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Network timeout. Zero selects the default of 3 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Whether to report a trigger event for the assignment. Defaults to
    /// [`ClientConfig::enable_auto_track`](crate::ClientConfig::enable_auto_track).
    pub fn auto_track(mut self, auto_track: bool) -> Self {
        self.auto_track = Some(auto_track);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.param_name.is_empty() {
            return Err(ValidationError::EmptyParamName);
        }
        check_properties(&self.properties)
    }
}

/// Request for every experiment parameter of a user.
#[derive(Debug, Clone)]
pub struct FetchAllRequest {
    pub(crate) properties: Properties,
    pub(crate) timeout: Duration,
    pub(crate) auto_track: Option<bool>,
}

impl Default for FetchAllRequest {
    fn default() -> Self {
        FetchAllRequest::new()
    }
}

impl FetchAllRequest {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        FetchAllRequest {
            properties: Properties::new(),
            timeout: DEFAULT_TIMEOUT,
            auto_track: None,
        }
    }

    /// Add a targeting property sent to the experiment server.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replace all targeting properties.
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Network timeout. Zero selects the default of 3 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Whether reading a parameter from the resulting [`AssignmentMap`](crate::AssignmentMap)
    /// reports a trigger event.
    pub fn auto_track(mut self, auto_track: bool) -> Self {
        self.auto_track = Some(auto_track);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        check_properties(&self.properties)
    }
}
