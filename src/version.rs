//! Version target matching
//!
//! Maps a requested target (`v12`, `v1.2.3`, `develop`) onto the best
//! fitting upstream tag or branch. Targets are treated as loose
//! constraints: components the target leaves out act as wildcards, so
//! `v1` selects the highest `v1.x.y` tag and `v1.2` the highest
//! `v1.2.y` tag.

use morpher_refs::{RefType, RefsInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Comparator, Version};

use crate::repo::RepoInfo;

static CLEAN_VER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]*([0-9].*)$").expect("Invalid regex"));

/// Suggest the head to install for the given target.
///
/// An empty target yields `(Branch, "")`, which leaves the upstream
/// HEAD untouched. `(Unknown, "")` means nothing fits.
pub fn suggest_head(repo: &RepoInfo, refs: &RefsInfo) -> (RefType, String) {
    if repo.target.is_empty() {
        return (RefType::Branch, String::new());
    }

    let constraint = clean_version(&repo.target).and_then(|v| v.parse::<Comparator>().ok());

    // A target that is not a version (or is a pre-release) may name a
    // branch directly
    match &constraint {
        None => {
            if refs.has_branch(&repo.target) {
                return (RefType::Branch, repo.target.clone());
            }
        }
        Some(constraint) => {
            if !constraint.pre.is_empty() && refs.has_branch(&repo.target) {
                return (RefType::Branch, repo.target.clone());
            }
        }
    }

    if let Some(constraint) = &constraint {
        if let Some(tag) = best_fit_tag(constraint, refs) {
            return (RefType::Tag, tag);
        }
    }

    if refs.has_tag(&repo.target) {
        return (RefType::Tag, repo.target.clone());
    }

    if refs.has_branch(&repo.target) {
        return (RefType::Branch, repo.target.clone());
    }

    (RefType::Unknown, String::new())
}

/// Highest tag whose version is contained by the constraint
fn best_fit_tag(constraint: &Comparator, refs: &RefsInfo) -> Option<String> {
    let mut tags: Vec<(Version, String)> = refs
        .tag_list()
        .into_iter()
        .filter_map(|tag| parse_loose(&tag).map(|version| (version, tag)))
        .collect();

    tags.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut best = None;

    for (version, tag) in tags {
        if contains(constraint, &version) {
            best = Some(tag);
        }
    }

    best
}

/// The components the constraint specifies must match exactly; absent
/// minor/patch components match anything
fn contains(constraint: &Comparator, version: &Version) -> bool {
    if version.major != constraint.major {
        return false;
    }

    if let Some(minor) = constraint.minor {
        if version.minor != minor {
            return false;
        }
    }

    if let Some(patch) = constraint.patch {
        if version.patch != patch {
            return false;
        }
    }

    true
}

/// Strip any alphabetic prefix (`v`, `r`, `ver`, ...) so that only the
/// version digits remain. None when no digit is present.
fn clean_version(value: &str) -> Option<&str> {
    CLEAN_VER_REGEX
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Parse a tag name as a loose version: `v1.2` becomes `1.2.0`, any
/// pre-release component is kept
fn parse_loose(value: &str) -> Option<Version> {
    let cleaned = clean_version(value)?;
    let comparator = cleaned.parse::<Comparator>().ok()?;

    let mut version = Version::new(
        comparator.major,
        comparator.minor.unwrap_or(0),
        comparator.patch.unwrap_or(0),
    );
    version.pre = comparator.pre;

    Some(version)
}
