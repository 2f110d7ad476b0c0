use serde::{Deserialize, Serialize};

/// Naming convention a branch must follow to be considered feature work.
///
/// Anything outside the accepted prefixes is ignored by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConvention {
    pub prefixes: Vec<String>,
}

impl Default for BranchConvention {
    fn default() -> Self {
        Self {
            prefixes: vec!["feat/".into(), "fix/".into(), "task/".into()],
        }
    }
}

impl BranchConvention {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    pub fn matches(&self, branch: &str) -> bool {
        self.prefixes.iter().any(|p| branch.starts_with(p.as_str()))
    }

    /// True for a prefixed branch that is not one of the declared base branches.
    pub fn is_feature_branch(&self, branch: &str, base_branches: &[String]) -> bool {
        !base_branches.iter().any(|b| b == branch) && self.matches(branch)
    }
}
