use std::collections::HashMap;

use chrono::{DateTime, Utc};
use derive_more::From;
use serde::{Serialize, Serializer};

/// Custom properties sent with experiment requests and attached to trigger events.
pub type Properties = HashMap<String, PropertyValue>;

/// A value of a custom property.
#[derive(Debug, Clone, PartialEq, Serialize, From)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// A floating point value.
    Number(f64),
    /// A string value. Limited to 8192 bytes.
    String(String),
    /// A list of strings.
    List(Vec<String>),
    /// A point in time, serialized as `%Y-%m-%d %H:%M:%S%.3f`.
    #[serde(serialize_with = "serialize_datetime")]
    DateTime(DateTime<Utc>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

fn serialize_datetime<S: Serializer>(
    value: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format("%Y-%m-%d %H:%M:%S%.3f"))
}
