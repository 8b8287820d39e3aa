//! Repository references: what to clone and which ref to land on.

use serde::{Deserialize, Serialize};

/// Branch used when a reference names none.
pub const DEFAULT_BRANCH: &str = "main";

/// A repository plus the ref a checkout should end up at.
///
/// When both `tag` and `commit` are set the tag is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoRef {
    /// GitHub `owner/name` slug or a full clone URL.
    pub repo: String,

    pub branch: String,

    pub tag: Option<String>,

    pub commit: Option<String>,

    /// Depth-1 history without tags.
    pub shallow: bool,
}

impl RepoRef {
    /// Reference `repo` at the default branch, shallow.
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            tag: None,
            commit: None,
            shallow: true,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_commit(mut self, commit: Option<String>) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Clone URL. Slugs (no `:`) expand to a GitHub https URL.
    pub fn url(&self) -> String {
        if self.repo.contains(':') {
            self.repo.clone()
        } else {
            format!("https://github.com/{}.git", self.repo)
        }
    }

    /// Last path segment of the repository, used as the default checkout dir.
    pub fn dir_name(&self) -> &str {
        let trimmed = self.repo.trim_end_matches('/');
        let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
        name.strip_suffix(".git").unwrap_or(name)
    }

    /// Ref passed to `git clone --branch`.
    pub fn clone_target(&self) -> &str {
        self.tag.as_deref().unwrap_or(&self.branch)
    }

    /// Ref argument for `git fetch origin <..>`.
    pub fn fetch_target(&self) -> String {
        match &self.tag {
            Some(tag) => format!("tag {tag}"),
            None => self.commit_or_branch().to_string(),
        }
    }

    /// Ref checked out directly in shallow mode.
    pub fn checkout_target(&self) -> String {
        match &self.tag {
            Some(tag) => format!("tags/{tag}"),
            None => self.commit_or_branch().to_string(),
        }
    }

    /// Ref a full checkout is hard-reset to after merging, if any.
    pub fn reset_target(&self) -> Option<&str> {
        self.tag.as_deref().or(self.commit.as_deref())
    }

    fn commit_or_branch(&self) -> &str {
        self.commit.as_deref().unwrap_or(&self.branch)
    }
}
