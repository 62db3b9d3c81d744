//! Pure validation of caller-supplied properties and custom ids.
//!
//! Validation happens before any cache or network activity, so a malformed request never
//! reaches the experiment server.
use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;

use crate::{properties::PropertyValue, Properties, ValidationError};

const KEY_MAX_LEN: usize = 100;
const VALUE_MAX_LEN: usize = 8192;
const CUSTOM_ID_MAX_LEN: usize = 1024;

const RESERVED_NAMES: &[&str] = &[
    "distinct_id",
    "original_id",
    "time",
    "properties",
    "id",
    "first_id",
    "second_id",
    "users",
    "events",
    "event",
    "user_id",
    "date",
    "datetime",
];

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_$][a-zA-Z\d_$]{0,99}$").expect("key pattern should be valid")
    })
}

/// Check that every key and value of `properties` is acceptable.
pub fn check_properties(properties: &Properties) -> Result<(), ValidationError> {
    for (key, value) in properties {
        check_key(key)?;
        if let PropertyValue::String(s) = value {
            if s.len() > VALUE_MAX_LEN {
                return Err(ValidationError::InvalidPropertyValue {
                    key: key.clone(),
                    reason: "the max length of property value is 8192",
                });
            }
        }
    }
    Ok(())
}

/// Check that custom subject ids are acceptable.
pub fn check_custom_ids(custom_ids: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    for (key, value) in custom_ids {
        if key.starts_with('$') {
            return Err(ValidationError::InvalidCustomId {
                key: key.clone(),
                reason: "key must not start with '$'",
            });
        }
        check_key(key).map_err(|_| ValidationError::InvalidCustomId {
            key: key.clone(),
            reason: "key must be a valid variable name",
        })?;
        if value.is_empty() {
            return Err(ValidationError::InvalidCustomId {
                key: key.clone(),
                reason: "value must not be empty",
            });
        }
        if value.len() > CUSTOM_ID_MAX_LEN {
            return Err(ValidationError::InvalidCustomId {
                key: key.clone(),
                reason: "the max length of custom id value is 1024",
            });
        }
    }
    Ok(())
}

fn check_key(key: &str) -> Result<(), ValidationError> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.len() > KEY_MAX_LEN {
        "the max length of property key is 100"
    } else if RESERVED_NAMES.contains(&key) {
        "key is a reserved name"
    } else if !key_pattern().is_match(key) {
        "key must be a valid variable name"
    } else {
        return Ok(());
    };
    Err(ValidationError::InvalidPropertyKey {
        key: key.to_owned(),
        reason,
    })
}
