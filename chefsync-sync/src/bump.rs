//! Automatic patch-level bumps for changed cookbooks.
//!
//! Policy, keyed on the published versions the server reports:
//!
//! | published set           | on-disk version | action                    |
//! |-------------------------|-----------------|---------------------------|
//! | none (never uploaded)   | any             | leave, new cookbook       |
//! | contains current        | `x.y.z`         | rewrite to `x.y.(z+1)`    |
//! | does not contain it     | `x.y.z`         | leave, already advanced   |
//!
//! Only the digits of the first `version '…'` line are replaced; quotes,
//! trailing comments, line endings and every other line stay byte-identical.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use similar::TextDiff;

use chefsync_core::{CookbookVersion, ServerError};

use crate::error::{io_err, SyncError};
use crate::writer::atomic_write;

/// Why a cookbook was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    /// The server has never seen this cookbook.
    NewArtifact,
    /// The on-disk version is not published yet; a human already bumped it.
    AlreadyAdvanced,
}

/// Why a cookbook could not be considered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoVersionLine,
    PatchOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BumpResult {
    Unchanged(UnchangedReason),
    Bumped {
        old: CookbookVersion,
        new: CookbookVersion,
    },
    Skipped(SkipReason),
}

/// A bump decision plus the content it would write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpPlan {
    pub result: BumpResult,
    pub original: String,
    /// `Some` only for [`BumpResult::Bumped`].
    pub updated: Option<String>,
}

impl BumpPlan {
    /// Unified diff of the planned rewrite, if any.
    pub fn unified_diff(&self, display_path: &str) -> Option<String> {
        let updated = self.updated.as_ref()?;
        let old_header = format!("a/{display_path}");
        let new_header = format!("b/{display_path}");
        Some(
            TextDiff::from_lines(&self.original, updated)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(2)
                .to_string(),
        )
    }
}

fn version_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^version[ \t]+["'](\d+)\.(\d+)\.(\d+)["']"#).expect("version regex")
    })
}

/// Decide what bumping `metadata` would do, without writing.
///
/// `lookup` is only consulted when a version line exists.
pub fn plan<F>(metadata: &Path, cookbook: &str, lookup: F) -> Result<BumpPlan, SyncError>
where
    F: FnOnce(&str) -> Result<Option<BTreeSet<String>>, ServerError>,
{
    let original = std::fs::read_to_string(metadata).map_err(|e| io_err(metadata, e))?;
    plan_content(original, cookbook, lookup)
}

fn plan_content<F>(original: String, cookbook: &str, lookup: F) -> Result<BumpPlan, SyncError>
where
    F: FnOnce(&str) -> Result<Option<BTreeSet<String>>, ServerError>,
{
    let unchanged = |original: String, result: BumpResult| BumpPlan {
        result,
        original,
        updated: None,
    };

    let Some(caps) = version_line().captures(&original) else {
        return Ok(unchanged(original, BumpResult::Skipped(SkipReason::NoVersionLine)));
    };
    let (Some(major), Some(patch)) = (caps.get(1), caps.get(3)) else {
        return Ok(unchanged(original, BumpResult::Skipped(SkipReason::NoVersionLine)));
    };
    let digits = major.start()..patch.end();
    let Ok(current) = original[digits.clone()].parse::<CookbookVersion>() else {
        // Digits too large for u64.
        return Ok(unchanged(original, BumpResult::Skipped(SkipReason::NoVersionLine)));
    };

    let Some(published) = lookup(cookbook)? else {
        return Ok(unchanged(
            original,
            BumpResult::Unchanged(UnchangedReason::NewArtifact),
        ));
    };
    if !published.contains(&current.to_string()) {
        return Ok(unchanged(
            original,
            BumpResult::Unchanged(UnchangedReason::AlreadyAdvanced),
        ));
    }
    let Some(next) = current.next_patch() else {
        return Ok(unchanged(original, BumpResult::Skipped(SkipReason::PatchOverflow)));
    };

    let mut updated = String::with_capacity(original.len() + 1);
    updated.push_str(&original[..digits.start]);
    updated.push_str(&next.to_string());
    updated.push_str(&original[digits.end..]);

    Ok(BumpPlan {
        result: BumpResult::Bumped {
            old: current,
            new: next,
        },
        original,
        updated: Some(updated),
    })
}

/// Apply the bump policy to `metadata` for `cookbook`.
pub fn bump<F>(metadata: &Path, cookbook: &str, lookup: F) -> Result<BumpResult, SyncError>
where
    F: FnOnce(&str) -> Result<Option<BTreeSet<String>>, ServerError>,
{
    let plan = plan(metadata, cookbook, lookup)?;
    match &plan.result {
        BumpResult::Bumped { old, new } => {
            tracing::info!(
                "Auto incrementing {} version from {old} to {new}",
                metadata.display()
            );
        }
        BumpResult::Unchanged(UnchangedReason::NewArtifact) => {
            tracing::info!("User added a new cookbook: {cookbook}");
        }
        BumpResult::Unchanged(UnchangedReason::AlreadyAdvanced) => {
            tracing::info!(
                "User already incremented {} version for {cookbook}",
                metadata.display()
            );
        }
        BumpResult::Skipped(reason) => {
            tracing::warn!(
                "Skipping version bump for {cookbook}: {reason:?} in {}",
                metadata.display()
            );
        }
    }
    if let Some(updated) = &plan.updated {
        atomic_write(metadata, updated)?;
    }
    Ok(plan.result)
}
