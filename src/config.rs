use std::time::Duration;

use crate::{AnalyticsTracker, Client, ExperimentFetcher, Result};

/// Configuration for [`Client`].
pub struct ClientConfig {
    pub(crate) api_url: String,
    pub(crate) experiment_cache_size: usize,
    pub(crate) experiment_cache_ttl: Duration,
    pub(crate) event_cache_size: usize,
    pub(crate) event_cache_ttl: Duration,
    pub(crate) enable_event_cache: bool,
    pub(crate) enable_auto_track: bool,
    pub(crate) record_request_cost_time: bool,
    pub(crate) http_transport: HttpTransportConfig,
    pub(crate) analytics_tracker: Option<Box<dyn AnalyticsTracker + Send + Sync>>,
    pub(crate) fetcher: Option<Box<dyn ExperimentFetcher + Send + Sync>>,
}

impl ClientConfig {
    /// Default capacity of the assignment and trigger caches.
    pub const DEFAULT_CACHE_SIZE: usize = 4096;

    /// Default (and maximum) time-to-live of assignment and trigger cache entries.
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Create a default configuration for the given experiment server URL.
    ///
    /// ```
    /// # use abtesting::ClientConfig;
    /// ClientConfig::from_api_url("https://abtest.example.com/api/v2/abtest/online/results");
    /// ```
    pub fn from_api_url(api_url: impl Into<String>) -> Self {
        ClientConfig {
            api_url: api_url.into(),
            experiment_cache_size: ClientConfig::DEFAULT_CACHE_SIZE,
            experiment_cache_ttl: ClientConfig::DEFAULT_CACHE_TTL,
            event_cache_size: ClientConfig::DEFAULT_CACHE_SIZE,
            event_cache_ttl: ClientConfig::DEFAULT_CACHE_TTL,
            enable_event_cache: true,
            enable_auto_track: true,
            record_request_cost_time: false,
            http_transport: HttpTransportConfig::default(),
            analytics_tracker: None,
            fetcher: None,
        }
    }

    /// Maximum number of users whose assignments are cached. `0` selects the default.
    pub fn experiment_cache_size(mut self, size: usize) -> Self {
        self.experiment_cache_size = clamp_size(size);
        self
    }

    /// How long cached assignments stay valid. Zero selects the default and values above 24
    /// hours are clamped to 24 hours.
    pub fn experiment_cache_ttl(mut self, ttl: Duration) -> Self {
        self.experiment_cache_ttl = clamp_ttl(ttl);
        self
    }

    /// Maximum number of remembered trigger events. `0` selects the default.
    pub fn event_cache_size(mut self, size: usize) -> Self {
        self.event_cache_size = clamp_size(size);
        self
    }

    /// How long a reported trigger suppresses identical triggers. Zero selects the default and
    /// values above 24 hours are clamped to 24 hours.
    pub fn event_cache_ttl(mut self, ttl: Duration) -> Self {
        self.event_cache_ttl = clamp_ttl(ttl);
        self
    }

    /// Deduplicate trigger events (enabled by default). When disabled, every observation is
    /// reported.
    pub fn enable_event_cache(mut self, enable: bool) -> Self {
        self.enable_event_cache = enable;
        self
    }

    /// Whether fetches report trigger events unless a request says otherwise (enabled by
    /// default).
    pub fn enable_auto_track(mut self, enable: bool) -> Self {
        self.enable_auto_track = enable;
        self
    }

    /// Log the duration of every experiment request at `info` level.
    pub fn record_request_cost_time(mut self, enable: bool) -> Self {
        self.record_request_cost_time = enable;
        self
    }

    /// Set the analytics tracker receiving trigger events. Without a tracker, tracking is
    /// disabled.
    ///
    /// ```
    /// # use abtesting::{ClientConfig, TriggerEvent};
    /// let config = ClientConfig::from_api_url("https://abtest.example.com/api")
    ///     .analytics_tracker(|event: &TriggerEvent| {
    ///         println!("{:?}", event);
    ///     });
    /// ```
    pub fn analytics_tracker(
        mut self,
        analytics_tracker: impl AnalyticsTracker + Send + Sync + 'static,
    ) -> Self {
        self.analytics_tracker = Some(Box::new(analytics_tracker));
        self
    }

    /// Replace the HTTP transport with a custom source of experiments.
    pub fn fetcher(mut self, fetcher: impl ExperimentFetcher + Send + Sync + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Tune the connection pool of the HTTP transport.
    pub fn http_transport(mut self, http_transport: HttpTransportConfig) -> Self {
        self.http_transport = http_transport.with_defaults();
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use abtesting::{Client, ClientConfig};
    /// let client: Client = ClientConfig::from_api_url("https://abtest.example.com/api")
    ///     .to_client()
    ///     .unwrap();
    /// ```
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}

fn clamp_size(size: usize) -> usize {
    if size == 0 {
        ClientConfig::DEFAULT_CACHE_SIZE
    } else {
        size
    }
}

fn clamp_ttl(ttl: Duration) -> Duration {
    if ttl.is_zero() {
        ClientConfig::DEFAULT_CACHE_TTL
    } else {
        ttl.min(ClientConfig::DEFAULT_CACHE_TTL)
    }
}

/// Connection pool settings of the HTTP transport. Zero values select the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Maximum idle connections kept per host. Defaults to 5.
    pub max_idle_connections_per_host: usize,
    /// How long idle connections are kept. Defaults to 30 seconds.
    pub idle_connection_timeout: Duration,
    /// Timeout for establishing a connection. Defaults to 30 seconds.
    pub connect_timeout: Duration,
    /// TCP keep-alive interval. Defaults to 30 seconds.
    pub keep_alive: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        HttpTransportConfig {
            max_idle_connections_per_host: 5,
            idle_connection_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl HttpTransportConfig {
    fn with_defaults(self) -> Self {
        let defaults = HttpTransportConfig::default();
        let or_default = |value: Duration, default: Duration| {
            if value.is_zero() {
                default
            } else {
                value
            }
        };
        HttpTransportConfig {
            max_idle_connections_per_host: if self.max_idle_connections_per_host == 0 {
                defaults.max_idle_connections_per_host
            } else {
                self.max_idle_connections_per_host
            },
            idle_connection_timeout: or_default(
                self.idle_connection_timeout,
                defaults.idle_connection_timeout,
            ),
            connect_timeout: or_default(self.connect_timeout, defaults.connect_timeout),
            keep_alive: or_default(self.keep_alive, defaults.keep_alive),
        }
    }
}
