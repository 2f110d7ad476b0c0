//! GitHub REST payload shapes. Only the fields daybook reads.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub commit: Option<BranchHead>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchHead {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Compare {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub html_url: String,
    pub commit: CommitDetail,
    /// Linked account, absent when the host could not match the email.
    pub author: Option<Account>,
    pub committer: Option<Account>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: Signature,
    pub committer: Signature,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Signature {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}
