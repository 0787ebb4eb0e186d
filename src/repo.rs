//! Repository path grammar
//!
//! Request paths look like `/<user>/<name>.<target>[/<sub>]`, or the
//! shorthand `/<name>.<target>[/<sub>]` which maps onto the historical
//! `go-<name>` GitHub organizations (`/yaml.v5` -> `go-yaml/yaml`).

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static USER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]+$").expect("Invalid regex"));

static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{2,}$").expect("Invalid regex"));

static PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./-]*$").expect("Invalid regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("Unsupported URL pattern")]
    UnsupportedUrl,

    #[error("Repo username is not valid")]
    InvalidUser,

    #[error("Repo name is not valid")]
    InvalidName,

    #[error("Repo sub-path is not valid")]
    InvalidPath,
}

/// Coordinates of an upstream repository extracted from a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    /// Upstream owner; synthesized as `go-<name>` for shorthand paths
    pub user: String,
    /// Repository basename on the upstream
    pub name: String,
    /// Version selector as written after the first `.` of the name
    /// segment; empty means no version preference
    pub target: String,
    /// Remaining sub-path (`info/refs`, `git-upload-pack`, a package
    /// directory, ...)
    pub path: String,
}

/// Parse a request path into repository coordinates.
///
/// Validation is a separate step ([`RepoInfo::validate`]); this only
/// decomposes the path.
pub fn parse_path(raw: &str) -> Result<RepoInfo, RepoError> {
    let path = raw.strip_suffix(".git").unwrap_or(raw);

    if path.is_empty() || !path.starts_with('/') {
        return Err(RepoError::UnsupportedUrl);
    }

    let rest = &path[1..];

    let (first, remainder) = match rest.split_once('/') {
        Some((first, remainder)) => (first, Some(remainder)),
        None => (rest, None),
    };

    // Short notation (`/yaml.v5` or `/mgo`) is recognized by a dot in
    // the first segment or by the absence of any further segment
    let (user, name_segment, sub) = if first.contains('.') || remainder.is_none() {
        (None, first, remainder.unwrap_or(""))
    } else {
        let remainder = remainder.unwrap_or("");
        let (second, sub) = remainder.split_once('/').unwrap_or((remainder, ""));
        (Some(first), second, sub)
    };

    let (name, target) = name_segment.split_once('.').unwrap_or((name_segment, ""));

    let user = match user {
        Some(user) => user.to_string(),
        None => format!("go-{name}"),
    };

    Ok(RepoInfo {
        user,
        name: name.to_string(),
        target: target.to_string(),
        path: sub.trim_start_matches('/').to_string(),
    })
}

impl RepoInfo {
    /// Check the parsed coordinates against the allowed alphabets,
    /// failing on the first mismatch
    pub fn validate(&self) -> Result<(), RepoError> {
        if !USER_REGEX.is_match(&self.user) {
            return Err(RepoError::InvalidUser);
        }

        if !NAME_REGEX.is_match(&self.name) {
            return Err(RepoError::InvalidName);
        }

        if !self.path.is_empty() && !PATH_REGEX.is_match(&self.path) {
            return Err(RepoError::InvalidPath);
        }

        Ok(())
    }

    /// GitHub root path, e.g. `github.com/essentialkaos/ek`
    pub fn github_root(&self) -> String {
        format!("github.com/{}/{}", self.user, self.name)
    }

    /// URL of the repository tree on GitHub, pointing at the given
    /// branch or tag when one is set
    pub fn github_url(&self, branch_or_tag: &str) -> String {
        let mut url = format!("https://{}", self.github_root());

        if !branch_or_tag.is_empty() {
            url.push_str("/tree/");
            url.push_str(branch_or_tag);
        }

        if !self.path.is_empty() {
            url.push('/');
            url.push_str(&self.path);
        }

        url
    }

    /// Import root, e.g. `essentialkaos/ek.v12`
    pub fn root(&self) -> String {
        if self.target.is_empty() {
            format!("{}/{}", self.user, self.name)
        } else {
            format!("{}/{}.{}", self.user, self.name, self.target)
        }
    }

    /// Import root plus the sub-path, e.g. `essentialkaos/ek.v12/knf`
    pub fn full_path(&self) -> String {
        if self.path.is_empty() {
            self.root()
        } else {
            format!("{}/{}", self.root(), self.path)
        }
    }
}
