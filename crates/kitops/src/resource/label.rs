//! The reconciler-identity label attached to every managed resource.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::sanitize::label_value_from_url;

/// Label key used when none is configured.
pub const DEFAULT_LABEL_KEY: &str = "managedBy";

static LABEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$").unwrap());

static LABEL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// One `key=value` label marking resources as owned by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceLabel {
    key: String,
    value: String,
}

impl ResourceLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Label identifying resources managed from the repository at `url`.
    pub fn for_repository(key: &str, url: &str) -> Self {
        Self::new(key, label_value_from_url(url))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Equality selector for `kubectl get -l`.
    pub fn selector(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Returns true if `key` is a syntactically valid label key
/// (`[prefix/]name`, prefix a DNS subdomain of at most 253 characters).
pub fn is_valid_label_key(key: &str) -> bool {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if !LABEL_NAME.is_match(name) {
        return false;
    }

    match prefix {
        Some(prefix) => prefix.len() <= 253 && LABEL_PREFIX.is_match(prefix),
        None => true,
    }
}
