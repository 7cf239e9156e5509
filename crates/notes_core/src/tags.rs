//! Tag references and the tag directory collaborator.
//!
//! Tags are owned by a directory outside this crate. Notes only keep
//! [`TagRef`]s, which identify a tag by its external name: the path of the
//! tag and its ancestors joined by `/` (e.g. `work/urgent`).
//!
//! Notes written before app version 6.1 stored plain tag names, so the
//! directory resolves names according to a [`TagNaming`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between the segments of an external tag name
pub const TAG_PATH_SEPARATOR: char = '/';

/// Weak reference to a tag, by external name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagRef(String);

impl TagRef {
    /// Reference a tag by its external name
    pub fn new(external_name: impl Into<String>) -> Self {
        Self(external_name.into())
    }

    /// The external name
    pub fn external_name(&self) -> &str {
        &self.0
    }

    /// Last segment of the external name
    pub fn name(&self) -> &str {
        self.0
            .rsplit(TAG_PATH_SEPARATOR)
            .next()
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How tag names stored in a note are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagNaming {
    /// Leaf names only (notes before app version 6.1)
    Plain,
    /// Full external names
    External,
}

/// Resolves stored tag names to tag identities.
pub trait TagDirectory {
    /// Resolve one stored name.
    ///
    /// A plain name can match several tags in different branches, so the
    /// result is a list.
    fn resolve(&self, name: &str, naming: TagNaming) -> Vec<TagRef>;

    /// Resolve a list of stored names, keeping first-seen order.
    fn resolve_all(&self, names: &[String], naming: TagNaming) -> Vec<TagRef> {
        let mut resolved: Vec<TagRef> = Vec::new();
        for name in names {
            for tag in self.resolve(name, naming) {
                if !resolved.contains(&tag) {
                    resolved.push(tag);
                }
            }
        }
        resolved
    }
}

/// In-memory tag hierarchy keyed by external name.
#[derive(Debug, Clone, Default)]
pub struct TagTree {
    tags: BTreeSet<TagRef>,
}

impl TagTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag and all its ancestors (builder pattern)
    pub fn with_tag(mut self, external_name: &str) -> Self {
        self.insert(external_name);
        self
    }

    /// Add a tag and all its ancestors
    pub fn insert(&mut self, external_name: &str) {
        let mut path = String::new();
        for segment in external_name.split(TAG_PATH_SEPARATOR) {
            if !path.is_empty() {
                path.push(TAG_PATH_SEPARATOR);
            }
            path.push_str(segment);
            self.tags.insert(TagRef::new(path.clone()));
        }
    }

    /// Whether a tag with this external name exists
    pub fn contains(&self, external_name: &str) -> bool {
        self.tags.iter().any(|tag| tag.external_name() == external_name)
    }
}

impl TagDirectory for TagTree {
    fn resolve(&self, name: &str, naming: TagNaming) -> Vec<TagRef> {
        match naming {
            TagNaming::External => vec![TagRef::new(name)],
            TagNaming::Plain => {
                let matches: Vec<TagRef> = self
                    .tags
                    .iter()
                    .filter(|tag| tag.name() == name)
                    .cloned()
                    .collect();
                if matches.is_empty() {
                    vec![TagRef::new(name)]
                } else {
                    matches
                }
            }
        }
    }
}
