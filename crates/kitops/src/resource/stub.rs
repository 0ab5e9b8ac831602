//! Resource identity: the (kind, name, namespace) stub of a manifest document.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{ResourceError, Result};

/// Namespace assigned to stubs that declare none.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of one cluster resource.
///
/// Two stubs denote the same resource iff kind, name and namespace are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceStub {
    kind: String,
    name: String,
    namespace: String,
}

impl ResourceStub {
    /// Creates a stub, defaulting an absent or empty namespace.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: Option<&str>,
    ) -> Result<Self> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(ResourceError::MissingKind);
        }

        let namespace = match namespace {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => DEFAULT_NAMESPACE.to_string(),
        };

        Ok(Self {
            kind,
            name: name.into(),
            namespace,
        })
    }

    /// Parses a single manifest document.
    pub fn parse(document: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(document)?;
        Self::from_value(value)
    }

    pub(crate) fn from_value(value: serde_yaml::Value) -> Result<Self> {
        if value.is_null() {
            return Err(ResourceError::EmptyDocument);
        }

        let raw: RawManifest = serde_yaml::from_value(value)?;
        raw.try_into()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Deterministic identity checksum, lowercase hex SHA-256.
    ///
    /// Each field is hashed as its byte length (u64, little endian) followed
    /// by its bytes, in the order kind, name, namespace.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [&self.kind, &self.name, &self.namespace] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for ResourceStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} (namespace {})", self.kind, self.name, self.namespace)
    }
}

/// The only fields of a manifest the identity model reads.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawManifest {
    kind: Option<String>,
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    name: Option<String>,
    namespace: Option<String>,
}

impl RawManifest {
    pub(crate) fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
}

impl TryFrom<RawManifest> for ResourceStub {
    type Error = ResourceError;

    fn try_from(raw: RawManifest) -> Result<Self> {
        let kind = raw.kind.ok_or(ResourceError::MissingKind)?;
        let metadata = raw.metadata.unwrap_or_default();
        ResourceStub::new(
            kind,
            metadata.name.unwrap_or_default(),
            metadata.namespace.as_deref(),
        )
    }
}

/// Drains the documents of a multi-document YAML stream, one stub at a time.
///
/// Empty documents are skipped. Documents without a kind yield an error and
/// draining continues; a syntax error yields an error and ends the stream.
pub struct ManifestDocuments<'de> {
    documents: serde_yaml::Deserializer<'de>,
    done: bool,
}

impl<'de> ManifestDocuments<'de> {
    pub fn new(bytes: &'de [u8]) -> Self {
        Self {
            documents: serde_yaml::Deserializer::from_slice(bytes),
            done: false,
        }
    }
}

impl Iterator for ManifestDocuments<'_> {
    type Item = Result<ResourceStub>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            let document = self.documents.next()?;
            let value = match serde_yaml::Value::deserialize(document) {
                Ok(value) => value,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            match ResourceStub::from_value(value) {
                Err(ResourceError::EmptyDocument) => continue,
                other => return Some(other),
            }
        }
    }
}
