//! Change detection for `chefsync-detector`.
//!
//! [`ChangeDetector::detect`] classifies every file the VCS reports between two
//! revisions against the configured watched roots and returns one
//! [`CategoryChanges`] per artifact kind. [`ChangeDetector::scan_all`] lists
//! every artifact on disk and is used when no checkpoint exists yet.
//!
//! Matching is structural: paths are normalized and compared component by
//! component against each root, so `roles` and `roles/` are the same root.
//! The artifact name is the segment immediately under the matched root.
//!
//! | kind     | layout under root     | granularity      |
//! |----------|-----------------------|------------------|
//! | cookbook | `<name>/<any file>`   | directory        |
//! | role     | `<name>.json` / `.rb` | file             |
//! | data bag | `<bag>/<item>.json`   | file (bag+item)  |

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chefsync_core::{
    config::normalize_path,
    ports::{FileChange, FileStatus, Vcs},
    ArtifactKind, ArtifactRef, CategoryChanges, ChangeKind, ChangeSet, Revision, VcsError,
    WatchedRoots,
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors from change detection.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.into(),
        source,
    }
}

/// Computes change sets for the watched roots of one repository.
pub struct ChangeDetector<'a> {
    vcs: &'a dyn Vcs,
    workdir: PathBuf,
    roots: WatchedRoots,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl<'a> ChangeDetector<'a> {
    pub fn new(vcs: &'a dyn Vcs, roots: WatchedRoots) -> Self {
        let normalize_all =
            |paths: Vec<PathBuf>| paths.iter().map(|p| normalize_path(p)).collect::<Vec<_>>();
        Self {
            workdir: normalize_path(vcs.workdir()),
            vcs,
            roots: WatchedRoots {
                cookbooks: normalize_all(roots.cookbooks),
                roles: normalize_all(roots.roles),
                data_bags: normalize_all(roots.data_bags),
            },
        }
    }

    /// Changes of one `kind` between `from` and `to`.
    pub fn detect(
        &self,
        kind: ArtifactKind,
        from: &Revision,
        to: &Revision,
    ) -> Result<CategoryChanges, DetectError> {
        let files = self.vcs.changed_files(from, to)?;
        self.classify(kind, &files, from, to)
    }

    /// Changes of every kind between `from` and `to`. Asks the VCS once.
    pub fn detect_all(&self, from: &Revision, to: &Revision) -> Result<ChangeSet, DetectError> {
        let files = self.vcs.changed_files(from, to)?;
        tracing::debug!("{} file(s) touched between {from} and {to}", files.len());
        Ok(ChangeSet {
            cookbooks: self.classify(ArtifactKind::Cookbook, &files, from, to)?,
            roles: self.classify(ArtifactKind::Role, &files, from, to)?,
            data_bags: self.classify(ArtifactKind::DataBag, &files, from, to)?,
        })
    }

    /// Every artifact of `kind` currently on disk, each marked `Added`.
    pub fn scan_all(&self, kind: ArtifactKind) -> Result<CategoryChanges, DetectError> {
        let mut changes = CategoryChanges::new();
        for root in self.roots.roots(kind) {
            if !root.is_dir() {
                tracing::debug!("watched root {} does not exist; skipping", root.display());
                continue;
            }
            for artifact in scan_root(kind, root)? {
                changes.record(artifact, ChangeKind::Added);
            }
        }
        Ok(changes)
    }

    /// Full scan of every kind.
    pub fn scan_everything(&self) -> Result<ChangeSet, DetectError> {
        Ok(ChangeSet {
            cookbooks: self.scan_all(ArtifactKind::Cookbook)?,
            roles: self.scan_all(ArtifactKind::Role)?,
            data_bags: self.scan_all(ArtifactKind::DataBag)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Diff classification
// ---------------------------------------------------------------------------

/// Touched files grouped under one cookbook directory.
struct CookbookTouches {
    artifact: ArtifactRef,
    relative_dir: PathBuf,
    statuses: Vec<FileStatus>,
}

impl<'a> ChangeDetector<'a> {
    fn classify(
        &self,
        kind: ArtifactKind,
        files: &[FileChange],
        from: &Revision,
        to: &Revision,
    ) -> Result<CategoryChanges, DetectError> {
        let mut changes = CategoryChanges::new();
        let mut cookbooks: BTreeMap<String, CookbookTouches> = BTreeMap::new();

        for file in files {
            let absolute = normalize_path(&self.workdir.join(&file.path));
            let Some((root, rest)) = self.match_root(kind, &absolute) else {
                continue;
            };

            match kind {
                ArtifactKind::Cookbook => {
                    // A file directly in the root belongs to no cookbook.
                    let [name, _inner, ..] = rest.as_slice() else {
                        continue;
                    };
                    let dir = root.join(name);
                    let relative_dir = dir
                        .strip_prefix(&self.workdir)
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|_| dir.clone());
                    cookbooks
                        .entry(name.clone())
                        .or_insert_with(|| CookbookTouches {
                            artifact: ArtifactRef::cookbook(name.clone(), dir),
                            relative_dir,
                            statuses: Vec::new(),
                        })
                        .statuses
                        .push(file.status);
                }
                ArtifactKind::Role => {
                    let [file_name] = rest.as_slice() else {
                        continue;
                    };
                    let Some(name) = stem_with_extension(file_name, &["json", "rb"]) else {
                        continue;
                    };
                    changes.record(
                        ArtifactRef::role(name, root.join(file_name)),
                        change_kind(file.status),
                    );
                }
                ArtifactKind::DataBag => {
                    let [bag, file_name] = rest.as_slice() else {
                        continue;
                    };
                    let Some(item) = stem_with_extension(file_name, &["json"]) else {
                        continue;
                    };
                    changes.record(
                        ArtifactRef::data_bag_item(bag.clone(), item, root.join(bag).join(file_name)),
                        change_kind(file.status),
                    );
                }
            }
        }

        for (_, touches) in cookbooks {
            let kind = self.cookbook_change_kind(&touches, from, to)?;
            tracing::debug!("{} {kind}", touches.artifact);
            changes.record(touches.artifact, kind);
        }

        Ok(changes)
    }

    /// Cookbook status from its directory, decided once per cookbook.
    ///
    /// A touched non-deleted file proves the directory exists at `to`; a
    /// modified or deleted file proves it existed at `from`. The VCS is only
    /// asked when the file statuses cannot answer.
    fn cookbook_change_kind(
        &self,
        touches: &CookbookTouches,
        from: &Revision,
        to: &Revision,
    ) -> Result<ChangeKind, DetectError> {
        let all_deleted = touches.statuses.iter().all(|s| *s == FileStatus::Deleted);
        if all_deleted && !self.vcs.exists_at(to, &touches.relative_dir)? {
            return Ok(ChangeKind::Deleted);
        }
        let all_added = touches.statuses.iter().all(|s| *s == FileStatus::Added);
        if all_added && !self.vcs.exists_at(from, &touches.relative_dir)? {
            return Ok(ChangeKind::Added);
        }
        Ok(ChangeKind::Changed)
    }

    /// The first root of `kind` containing `path`, with the remaining segments.
    fn match_root(&self, kind: ArtifactKind, path: &Path) -> Option<(&PathBuf, Vec<String>)> {
        self.roots.roots(kind).iter().find_map(|root| {
            let rest = path.strip_prefix(root).ok()?;
            let segments: Vec<String> = rest
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            (!segments.is_empty()).then_some((root, segments))
        })
    }
}

fn change_kind(status: FileStatus) -> ChangeKind {
    match status {
        FileStatus::Added => ChangeKind::Added,
        FileStatus::Modified => ChangeKind::Changed,
        FileStatus::Deleted => ChangeKind::Deleted,
    }
}

/// `Some(stem)` when `file_name` carries one of `extensions`.
fn stem_with_extension(file_name: &str, extensions: &[&str]) -> Option<String> {
    let path = Path::new(file_name);
    let ext = path.extension().and_then(OsStr::to_str)?;
    if !extensions.contains(&ext) {
        return None;
    }
    let stem = path.file_stem().and_then(OsStr::to_str)?;
    (!stem.is_empty()).then(|| stem.to_string())
}

// ---------------------------------------------------------------------------
// Disk scan
// ---------------------------------------------------------------------------

fn scan_root(kind: ArtifactKind, root: &Path) -> Result<Vec<ArtifactRef>, DetectError> {
    let mut found = Vec::new();
    for (name, path, is_dir) in visible_entries(root)? {
        match kind {
            ArtifactKind::Cookbook if is_dir => {
                found.push(ArtifactRef::cookbook(name, path));
            }
            ArtifactKind::Role if !is_dir => {
                if let Some(stem) = stem_with_extension(&name, &["json", "rb"]) {
                    found.push(ArtifactRef::role(stem, path));
                }
            }
            ArtifactKind::DataBag if is_dir => {
                for (file_name, item_path, item_is_dir) in visible_entries(&path)? {
                    if item_is_dir {
                        continue;
                    }
                    if let Some(item) = stem_with_extension(&file_name, &["json"]) {
                        found.push(ArtifactRef::data_bag_item(name.clone(), item, item_path));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(found)
}

/// Non-hidden entries of `dir`, sorted by name: `(name, path, is_dir)`.
fn visible_entries(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>, DetectError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        // Follow symlinks so linked cookbooks count as directories.
        let is_dir = path.is_dir();
        entries.push((name, path, is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
