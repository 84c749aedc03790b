//! Domain types shared by every chefsync crate.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Version maps are `BTreeMap`s so every serialized form has sorted keys.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An opaque point in repository history. Must be resolvable by the VCS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    /// The symbolic revision of the current checkout.
    pub fn head() -> Self {
        Self("HEAD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Artifact name → required version. Always sorted by name.
pub type VersionMap = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// The three categories of artifact a Chef repository holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Cookbook,
    Role,
    DataBag,
}

impl ArtifactKind {
    /// All kinds, in upload order (data bags → roles → cookbooks).
    pub fn upload_order() -> &'static [ArtifactKind] {
        &[ArtifactKind::DataBag, ArtifactKind::Role, ArtifactKind::Cookbook]
    }

    /// Plural label used in log lines and tables.
    pub fn plural(&self) -> &'static str {
        match self {
            ArtifactKind::Cookbook => "cookbooks",
            ArtifactKind::Role => "roles",
            ArtifactKind::DataBag => "data_bags",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Cookbook => write!(f, "cookbook"),
            ArtifactKind::Role => write!(f, "role"),
            ArtifactKind::DataBag => write!(f, "data_bag"),
        }
    }
}

/// A single artifact resolved under a watched root.
///
/// `name` is the first path segment under the root. For data bags it is the
/// bag; the item id lives in `item`. `path` is the on-disk location at
/// artifact granularity: the cookbook directory, the role file, or the data
/// bag item file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub path: PathBuf,
}

impl ArtifactRef {
    pub fn cookbook(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ArtifactKind::Cookbook,
            name: name.into(),
            item: None,
            path: path.into(),
        }
    }

    pub fn role(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ArtifactKind::Role,
            name: name.into(),
            item: None,
            path: path.into(),
        }
    }

    pub fn data_bag_item(
        bag: impl Into<String>,
        item: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind: ArtifactKind::DataBag,
            name: bag.into(),
            item: Some(item.into()),
            path: path.into(),
        }
    }

    /// Deduplication key, unique within a category for one run.
    pub fn key(&self) -> String {
        match &self.item {
            Some(item) => format!("{}/{}", self.name, item),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.key())
    }
}

// ---------------------------------------------------------------------------
// Change sets
// ---------------------------------------------------------------------------

/// How an artifact moved between two revisions. Computed once, at detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Changed,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Changed => write!(f, "changed"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactChange {
    pub artifact: ArtifactRef,
    pub kind: ChangeKind,
}

/// Changes for a single category.
///
/// Entries are keyed by [`ArtifactRef::key`], so an artifact can never sit in
/// both the changed and the deleted set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CategoryChanges {
    entries: BTreeMap<String, ArtifactChange>,
}

impl CategoryChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change, replacing any earlier record for the same artifact.
    ///
    /// A deletion never replaces a live record: when a role moves from
    /// `web.rb` to `web.json`, the surviving file is what gets uploaded.
    pub fn record(&mut self, artifact: ArtifactRef, kind: ChangeKind) {
        let key = artifact.key();
        if kind == ChangeKind::Deleted
            && self
                .entries
                .get(&key)
                .is_some_and(|existing| existing.kind != ChangeKind::Deleted)
        {
            return;
        }
        self.entries.insert(key, ArtifactChange { artifact, kind });
    }

    pub fn get(&self, key: &str) -> Option<&ArtifactChange> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArtifactChange> {
        self.entries.values()
    }

    /// Added and changed artifacts. The orchestrator treats both alike.
    pub fn changed(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.entries
            .values()
            .filter(|c| c.kind != ChangeKind::Deleted)
            .map(|c| &c.artifact)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.entries
            .values()
            .filter(|c| c.kind == ChangeKind::Deleted)
            .map(|c| &c.artifact)
    }

    /// Sorted, deduplicated names of every added or changed artifact.
    pub fn changed_names(&self) -> Vec<String> {
        self.changed()
            .map(|a| a.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has_changed(&self) -> bool {
        self.changed().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-category change sets for one detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChangeSet {
    pub cookbooks: CategoryChanges,
    pub roles: CategoryChanges,
    pub data_bags: CategoryChanges,
}

impl ChangeSet {
    pub fn get(&self, kind: ArtifactKind) -> &CategoryChanges {
        match kind {
            ArtifactKind::Cookbook => &self.cookbooks,
            ArtifactKind::Role => &self.roles,
            ArtifactKind::DataBag => &self.data_bags,
        }
    }

    pub fn get_mut(&mut self, kind: ArtifactKind) -> &mut CategoryChanges {
        match kind {
            ArtifactKind::Cookbook => &mut self.cookbooks,
            ArtifactKind::Role => &mut self.roles,
            ArtifactKind::DataBag => &mut self.data_bags,
        }
    }

    /// `true` when no category holds any entry at all.
    pub fn is_empty(&self) -> bool {
        self.cookbooks.is_empty() && self.roles.is_empty() && self.data_bags.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// A cookbook version: `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CookbookVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl CookbookVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The next patch level. Returns `None` on `u64` overflow.
    pub fn next_patch(&self) -> Option<Self> {
        self.patch
            .checked_add(1)
            .map(|patch| Self::new(self.major, self.minor, patch))
    }
}

impl fmt::Display for CookbookVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for CookbookVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(format!("'{s}' is not a major.minor.patch version"));
        };
        let parse = |p: &str| {
            p.parse::<u64>()
                .map_err(|_| format!("'{s}' is not a major.minor.patch version"))
        };
        Ok(Self::new(parse(major)?, parse(minor)?, parse(patch)?))
    }
}

// ---------------------------------------------------------------------------
// Environments and snapshots
// ---------------------------------------------------------------------------

/// A Chef environment as loaded from the server.
///
/// Only `cookbook_versions` is interpreted; every other field rides along in
/// `other` so a load/save round trip does not drop attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub cookbook_versions: VersionMap,
    /// Snapshot tag this environment was last restored from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from_tag: Option<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cookbook_versions: VersionMap::new(),
            restored_from_tag: None,
            other: serde_json::Map::new(),
        }
    }
}

/// A persisted copy of an environment's version map.
///
/// Stored as a data bag item, so the tag doubles as the item `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "id")]
    pub tag: String,
    pub environment: String,
    pub cookbook_versions: VersionMap,
    pub created_at: DateTime<Utc>,
}

/// Auto-generated snapshot tag: `<major>_<minor>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GenerationTag {
    pub major: u64,
    pub minor: u64,
}

impl GenerationTag {
    /// The tag handed out when no counter exists yet.
    pub const FIRST: GenerationTag = GenerationTag { major: 0, minor: 1 };

    /// Increment the minor component. `None` when it would overflow; there
    /// is no carry into `major`.
    pub fn next(&self) -> Option<Self> {
        self.minor.checked_add(1).map(|minor| Self {
            major: self.major,
            minor,
        })
    }
}

impl fmt::Display for GenerationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.major, self.minor)
    }
}

impl FromStr for GenerationTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('_')
            .ok_or_else(|| format!("'{s}' does not match <major>_<minor>"))?;
        let major = major
            .parse::<u64>()
            .map_err(|_| format!("'{s}' does not match <major>_<minor>"))?;
        let minor = minor
            .parse::<u64>()
            .map_err(|_| format!("'{s}' does not match <major>_<minor>"))?;
        Ok(Self { major, minor })
    }
}

/// The last revision a sync run processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub revision: Revision,
    pub written_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Watched roots
// ---------------------------------------------------------------------------

/// Absolute, normalized filesystem roots per artifact kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchedRoots {
    pub cookbooks: Vec<PathBuf>,
    pub roles: Vec<PathBuf>,
    pub data_bags: Vec<PathBuf>,
}

impl WatchedRoots {
    pub fn roots(&self, kind: ArtifactKind) -> &[PathBuf] {
        match kind {
            ArtifactKind::Cookbook => &self.cookbooks,
            ArtifactKind::Role => &self.roles,
            ArtifactKind::DataBag => &self.data_bags,
        }
    }
}
