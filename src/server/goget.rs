//! go-import page rendering
//!
//! The two-meta-tag HTML consumed by `go get`: `go-import` points the
//! toolchain back at this gateway, `go-source` points code browsing at
//! the upstream tree for the selected ref.

use askama::Template;

use crate::repo::RepoInfo;

#[derive(Template)]
#[template(path = "goget.html")]
pub struct GoGetPage {
    pub domain: String,
    pub root: String,
    pub github_root: String,
    pub tree: String,
    pub full_path: String,
}

impl GoGetPage {
    pub fn new(domain: &str, repo: &RepoInfo, tree: &str) -> Self {
        Self {
            domain: domain.to_string(),
            root: repo.root(),
            github_root: repo.github_root(),
            tree: tree.to_string(),
            full_path: repo.full_path(),
        }
    }
}
