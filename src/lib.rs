//! A Rust client for an A/B testing server: experiment assignment, caching and trigger
//! tracking.
//!
//! # Overview
//!
//! The library revolves around a [`Client`] that asks the experiment server which experiments a
//! user (a [`UserIdentity`]) is assigned to, and resolves a requested parameter to a typed
//! [`ExperimentValue`]. Every request carries a default value that is returned when the user is
//! not in a matching experiment, and whose type decides which variables can match.
//!
//! Assignments are kept in a bounded, time-limited per-user cache
//! ([`Client::fetch_cache_first`]) or always fetched fresh ([`Client::fetch_always_network`]).
//! [`Client::fetch_all_assignments`] fetches every parameter at once; the resulting
//! [`AssignmentMap`] can be dumped and loaded by another service.
//!
//! An [`AnalyticsTracker`] should be provided to receive `$ABTestTrigger` events, recording that
//! a user has actually been exposed to an experiment. Repeated exposures are deduplicated.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Fetch operations return a [`FetchError`] that carries a usable fallback alongside the error.
//! In production, it is recommended to fall back to the default value
//! ([`FetchError::into_fallback`]), as experiment assignment should not be critical enough to
//! fail a user request. However, the returned errors are valuable for debugging.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages under the `abtesting` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into client operations.
//!
//! # Examples
//!
//! A runnable example can be found in the `demos/simple` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod assignment;
mod assignment_cache;
mod assignment_map;
mod cache_store;
mod client;
mod config;
mod dedup;
mod emitter;
mod error;
mod experiment;
mod fetcher;
mod identity;
mod properties;
mod request;
mod resolver;
mod tracker;
mod validation;
mod value;

pub use assignment::Assignment;
pub use assignment_map::AssignmentMap;
pub use client::Client;
pub use config::{ClientConfig, HttpTransportConfig};
pub use error::{DeliveryError, Error, FetchError, Result, SerializationError, ValidationError};
pub use experiment::{Experiment, ExperimentResponse, TrackConfig, Variable, VariableType};
pub use fetcher::{ExperimentFetcher, ExperimentRequest, FetchedExperiments, HttpFetcher};
pub use identity::UserIdentity;
pub use properties::{Properties, PropertyValue};
pub use request::{FetchAllRequest, FetchRequest, DEFAULT_TIMEOUT};
pub use resolver::{resolve, resolve_all, Resolved};
pub use tracker::{AnalyticsTracker, TriggerEvent, TRIGGER_EVENT_NAME};
pub use validation::{check_custom_ids, check_properties};
pub use value::{cast, CastError, ExperimentValue, IntWidth, Shape};
