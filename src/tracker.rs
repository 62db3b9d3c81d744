use std::collections::BTreeMap;

use serde::Serialize;

use crate::{error::DeliveryError, Properties};

/// Name of the event reported when a user is observed in an experiment.
pub const TRIGGER_EVENT_NAME: &str = "$ABTestTrigger";

/// A trigger event handed to the [`AnalyticsTracker`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerEvent {
    /// Login id or anonymous id of the user.
    pub distinct_id: String,
    /// Whether `distinct_id` is a login id.
    pub is_login_id: bool,
    /// Always [`TRIGGER_EVENT_NAME`].
    pub event: &'static str,
    /// Event properties: `$abtest_experiment_id`, `$abtest_experiment_group_id`, caller
    /// extras, server-declared extension fields and, occasionally, `$lib_plugin_version`.
    pub properties: Properties,
    /// Custom subject ids of the user.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_ids: BTreeMap<String, String>,
}

/// Receives trigger events so they can be forwarded to your analytics pipeline.
///
/// Any `Fn(&TriggerEvent)` closure is a tracker that never fails:
///
/// ```
/// # use abtesting::ClientConfig;
/// let config = ClientConfig::from_api_url("https://abtest.example.com/api/v2/abtest/online/results")
///     .analytics_tracker(|event: &abtesting::TriggerEvent| println!("{:?}", event));
/// ```
pub trait AnalyticsTracker {
    /// Deliver a single event. Errors are logged and never fail the caller's request.
    fn track(&self, event: &TriggerEvent) -> Result<(), DeliveryError>;

    /// Called after every successfully tracked event.
    fn flush(&self) {}
}

impl<T: Fn(&TriggerEvent)> AnalyticsTracker for T {
    fn track(&self, event: &TriggerEvent) -> Result<(), DeliveryError> {
        self(event);
        Ok(())
    }
}

/// Tracker that records every event and counts flushes. Clones share their records.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingTracker {
    events: std::sync::Arc<std::sync::Mutex<Vec<TriggerEvent>>>,
    flushes: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    fail: bool,
}

#[cfg(test)]
impl RecordingTracker {
    pub fn failing() -> RecordingTracker {
        RecordingTracker {
            fail: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl AnalyticsTracker for RecordingTracker {
    fn track(&self, event: &TriggerEvent) -> Result<(), DeliveryError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(DeliveryError("connection refused".to_owned()));
        }
        Ok(())
    }

    fn flush(&self) {
        self.flushes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
