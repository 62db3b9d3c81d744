use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::experiment::Experiment;

/// The user an assignment is requested for.
///
/// A user is identified by a distinct id (either a login id or an anonymous id) and, optionally,
/// custom subject ids used by subject-scoped experiments. Custom ids are kept sorted so that
/// identities built in a different order derive the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    distinct_id: String,
    is_login_id: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    custom_ids: BTreeMap<String, String>,
}

impl UserIdentity {
    /// Create an identity from a distinct id.
    pub fn new(distinct_id: impl Into<String>, is_login_id: bool) -> UserIdentity {
        UserIdentity {
            distinct_id: distinct_id.into(),
            is_login_id,
            custom_ids: BTreeMap::new(),
        }
    }

    /// Create an identity for a logged-in user.
    ///
    /// ```
    /// # use abtesting::UserIdentity;
    /// let identity = UserIdentity::login("user-42").custom_id("device", "ios-1");
    /// assert!(identity.is_login_id());
    /// ```
    pub fn login(login_id: impl Into<String>) -> UserIdentity {
        UserIdentity::new(login_id, true)
    }

    /// Create an identity for an anonymous user.
    pub fn anonymous(anonymous_id: impl Into<String>) -> UserIdentity {
        UserIdentity::new(anonymous_id, false)
    }

    /// Attach a custom subject id.
    pub fn custom_id(mut self, key: impl Into<String>, value: impl Into<String>) -> UserIdentity {
        self.custom_ids.insert(key.into(), value.into());
        self
    }

    /// Replace all custom subject ids.
    pub fn with_custom_ids(
        mut self,
        custom_ids: impl IntoIterator<Item = (String, String)>,
    ) -> UserIdentity {
        self.custom_ids = custom_ids.into_iter().collect();
        self
    }

    /// The distinct id (login id or anonymous id).
    pub fn distinct_id(&self) -> &str {
        &self.distinct_id
    }

    /// Whether [`UserIdentity::distinct_id`] is a login id.
    pub fn is_login_id(&self) -> bool {
        self.is_login_id
    }

    /// Custom subject ids, sorted by key.
    pub fn custom_ids(&self) -> &BTreeMap<String, String> {
        &self.custom_ids
    }

    /// Key of the user's snapshot in the assignment cache.
    ///
    /// Derived from the distinct id, the sorted custom ids and the login flag, and hashed to
    /// keep cache keys short regardless of the number of custom ids.
    pub(crate) fn cache_key(&self) -> String {
        let raw = format!(
            "{}${}${}",
            self.distinct_id,
            self.custom_ids_json(),
            self.is_login_id
        );
        format!("{:x}", md5::compute(raw))
    }

    /// Key of the trigger record for `experiment` observed by this user.
    ///
    /// Subject-scoped experiments are deduplicated per subject rather than per user.
    pub(crate) fn trigger_key(&self, experiment: &Experiment) -> String {
        if !experiment.subject_id.is_empty() {
            format!(
                "{}${}${}",
                experiment.subject_id, experiment.subject_name, experiment.experiment_id
            )
        } else {
            format!(
                "{}${}${}${}",
                self.distinct_id,
                self.custom_ids_json(),
                experiment.experiment_id,
                experiment.group_id
            )
        }
    }

    fn custom_ids_json(&self) -> String {
        // Serializing a map of strings cannot fail.
        serde_json::to_string(&self.custom_ids).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::experiment::Experiment;

    use super::UserIdentity;

    #[test]
    fn cache_key_ignores_custom_id_order() {
        let a = UserIdentity::login("user")
            .custom_id("device", "d1")
            .custom_id("account", "a1");
        let b = UserIdentity::login("user")
            .custom_id("account", "a1")
            .custom_id("device", "d1");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_depends_on_login_flag() {
        assert_ne!(
            UserIdentity::login("user").cache_key(),
            UserIdentity::anonymous("user").cache_key()
        );
    }

    #[test]
    fn cache_key_depends_on_custom_ids() {
        assert_ne!(
            UserIdentity::login("user").cache_key(),
            UserIdentity::login("user")
                .custom_id("device", "d1")
                .cache_key()
        );
    }

    #[test]
    fn trigger_key_uses_subject_for_subject_scoped_experiments() {
        let experiment = Experiment {
            experiment_id: "exp".into(),
            group_id: "1".into(),
            subject_id: "d1".into(),
            subject_name: "device".into(),
            ..Default::default()
        };
        assert_eq!(
            UserIdentity::login("alice").trigger_key(&experiment),
            UserIdentity::login("bob").trigger_key(&experiment)
        );
        assert_eq!(
            UserIdentity::login("alice").trigger_key(&experiment),
            "d1$device$exp"
        );
    }

    #[test]
    fn trigger_key_includes_user_and_group() {
        let experiment = Experiment {
            experiment_id: "exp".into(),
            group_id: "1".into(),
            ..Default::default()
        };
        assert_eq!(
            UserIdentity::login("alice").trigger_key(&experiment),
            "alice${}$exp$1"
        );
        assert_ne!(
            UserIdentity::login("alice").trigger_key(&experiment),
            UserIdentity::login("bob").trigger_key(&experiment)
        );
    }
}
