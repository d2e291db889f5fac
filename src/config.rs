use crate::error::{RepoError, RepoResult};
use crate::store::{self, KeyValueStore, REMOTE_CONFIG_KEY};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OWNER: &str = "RCCxd";
pub const DEFAULT_REPO: &str = "imagensvault";
pub const DEFAULT_BRANCH: &str = "main";

/// Where images live on the remote host.
///
/// The token is never defaulted: it comes from the saved settings or the
/// command line / environment only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHostConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: String,
}

impl Default for RemoteHostConfig {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            token: String::new(),
        }
    }
}

/// Shape on disk; any field may be missing or blank.
#[derive(Debug, Default, Deserialize)]
struct StoredConfig {
    #[serde(default)]
    owner: String,
    #[serde(default)]
    repo: String,
    #[serde(default)]
    branch: String,
    #[serde(default)]
    token: String,
}

impl RemoteHostConfig {
    /// Saved settings with blanks filled from the defaults.
    pub fn load(store: &impl KeyValueStore) -> Self {
        let saved: StoredConfig = store::load(store, REMOTE_CONFIG_KEY).unwrap_or_default();
        let defaults = Self::default();
        Self {
            owner: or_default(saved.owner, defaults.owner),
            repo: or_default(saved.repo, defaults.repo),
            branch: or_default(saved.branch, defaults.branch),
            token: saved.token,
        }
    }

    /// Validate and persist. Owner and repo are required, a blank branch
    /// means `main`.
    pub fn save(mut self, store: &mut impl KeyValueStore) -> RepoResult<Self> {
        self.owner = self.owner.trim().to_string();
        self.repo = self.repo.trim().to_string();
        self.branch = or_default(self.branch.trim().to_string(), DEFAULT_BRANCH.to_string());
        self.token = self.token.trim().to_string();
        if self.owner.is_empty() {
            return Err(RepoError::Validation("owner"));
        }
        if self.repo.is_empty() {
            return Err(RepoError::Validation("repo"));
        }
        store::save(store, REMOTE_CONFIG_KEY, &self);
        Ok(self)
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Token with everything but the last four characters hidden.
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.is_empty() {
            return "(not set)".to_string();
        }
        let visible = chars.len().saturating_sub(4);
        let tail: String = chars[visible..].iter().collect();
        format!("{}{}", "*".repeat(visible), tail)
    }
}

fn or_default(value: String, default: String) -> String {
    if value.trim().is_empty() { default } else { value }
}
