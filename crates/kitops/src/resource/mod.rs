//! Resource identity and collection model.
//!
//! A [`ResourceStub`] is the (kind, name, namespace) identity of one cluster
//! object; a [`ResourceCollection`] is a checksum-keyed set of stubs loaded
//! either from a manifest tree (desired state) or from a cluster listing
//! (actual state).

mod collection;
mod error;
mod label;
pub mod manifest;
mod stub;

pub use collection::{prune_set, ManifestLoad, ResourceCollection, LIST_KIND};
pub use error::{ResourceError, Result};
pub use label::{is_valid_label_key, ResourceLabel, DEFAULT_LABEL_KEY};
pub use stub::{ManifestDocuments, ResourceStub, DEFAULT_NAMESPACE};
