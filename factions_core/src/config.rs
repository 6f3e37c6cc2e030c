use std::{
    collections::HashSet,
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use factions_schema::PermissionKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::Permissions;

pub const BUILTIN_FACTIONS_CONFIG: &str = include_str!("data/factions_config.json");

pub const FACTIONS_CONFIG_PATH_ENV: &str = "FACTIONS_CONFIG_PATH";

/// Tunables for territory, power and diplomacy. Every section falls back to
/// its defaults when absent from the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FactionsConfig {
    pub power: PowerConfig,
    pub claim: ClaimConfig,
    pub relationships: RelationshipConfig,
    pub wilderness: WildernessConfig,
    pub display: DisplayConfig,
    pub friendly_fire: bool,
    /// Global protection switch. When off every interaction is allowed.
    pub claim_protection: bool,
    /// Negative means unlimited.
    pub max_faction_size: i32,
    pub pending_action_ttl_seconds: u64,
    pub audit_interval_ticks: u64,
}

impl Default for FactionsConfig {
    fn default() -> Self {
        Self {
            power: PowerConfig::default(),
            claim: ClaimConfig::default(),
            relationships: RelationshipConfig::default(),
            wilderness: WildernessConfig::default(),
            display: DisplayConfig::default(),
            friendly_fire: false,
            claim_protection: true,
            max_faction_size: -1,
            pending_action_ttl_seconds: 60,
            audit_interval_ticks: 1_200,
        }
    }
}

impl FactionsConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_FACTIONS_CONFIG)
                .expect("builtin factions config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, FactionsConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| FactionsConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = FactionsConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Batch sizes below one are treated as one.
    pub fn max_batch_size(&self) -> u32 {
        self.claim.max_batch_size.max(1)
    }

    pub fn max_faction_size(&self) -> Option<usize> {
        usize::try_from(self.max_faction_size).ok()
    }

    pub fn pending_ttl_millis(&self) -> u64 {
        self.pending_action_ttl_seconds.saturating_mul(1_000)
    }

    pub fn unclaim_cooldown_millis(&self) -> u64 {
        self.claim.unclaim_cooldown_seconds.saturating_mul(1_000)
    }

    pub fn is_dimension_claimable(&self, dimension: &str) -> bool {
        self.claim.allowed_dimensions.is_empty()
            || self
                .claim
                .allowed_dimensions
                .iter()
                .any(|allowed| allowed == dimension)
    }

    pub fn default_guest_permissions(&self) -> Permissions {
        Permissions::from_kinds(&self.relationships.default_guest_permissions)
    }
}

#[derive(Debug, Error)]
pub enum FactionsConfigError {
    #[error("failed to parse factions config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read factions config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PowerConfig {
    pub player_max: i32,
    pub player_start: i32,
    pub death_penalty: i32,
    pub kill_reward: i32,
    pub regen_interval_ticks: u64,
    pub regen_reward: i32,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            player_max: 20,
            player_start: 10,
            death_penalty: 10,
            kill_reward: 2,
            regen_interval_ticks: 12_000,
            regen_reward: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClaimConfig {
    pub max_batch_size: u32,
    pub require_first_confirmation: bool,
    pub require_unclaim_confirmation: bool,
    pub unclaim_cooldown_seconds: u64,
    pub allow_remove_all: bool,
    /// Empty means every dimension is claimable.
    pub allowed_dimensions: Vec<String>,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 5,
            require_first_confirmation: true,
            require_unclaim_confirmation: true,
            unclaim_cooldown_seconds: 3_600,
            allow_remove_all: true,
            allowed_dimensions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelationshipConfig {
    pub ally_overrides_permissions: bool,
    pub default_guest_permissions: Vec<PermissionKind>,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            ally_overrides_permissions: true,
            default_guest_permissions: vec![PermissionKind::UseBlocks, PermissionKind::UseEntities],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WildernessConfig {
    pub break_allowlist: HashSet<String>,
    pub place_allowlist: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplayConfig {
    /// Negative means unlimited.
    pub name_max_length: i32,
    pub name_blacklist: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            name_max_length: -1,
            name_blacklist: vec!["wilderness".to_string(), "factionless".to_string()],
        }
    }
}

#[derive(Resource, Debug, Clone)]
pub struct FactionsConfigHandle(pub Arc<FactionsConfig>);

impl FactionsConfigHandle {
    pub fn new(config: Arc<FactionsConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<FactionsConfig> {
        Arc::clone(&self.0)
    }

    pub fn config(&self) -> &FactionsConfig {
        &self.0
    }

    pub fn replace(&mut self, config: Arc<FactionsConfig>) {
        self.0 = config;
    }
}

/// Loads the config named by `FACTIONS_CONFIG_PATH`, falling back to the
/// builtin document. Returns the path that was actually used, if any.
pub fn load_factions_config_from_env() -> (Arc<FactionsConfig>, Option<PathBuf>) {
    if let Some(path) = env::var(FACTIONS_CONFIG_PATH_ENV).ok().map(PathBuf::from) {
        match FactionsConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "factions::config",
                    path = %path.display(),
                    "factions_config.loaded=file"
                );
                return (Arc::new(config), Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "factions::config",
                    path = %path.display(),
                    error = %err,
                    "factions_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "factions::config", "factions_config.loaded=builtin");
    (FactionsConfig::builtin(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        let builtin = FactionsConfig::builtin();
        let defaults = FactionsConfig::default();
        assert_eq!(builtin.power.player_max, defaults.power.player_max);
        assert_eq!(builtin.power.player_start, defaults.power.player_start);
        assert_eq!(builtin.claim.max_batch_size, defaults.claim.max_batch_size);
        assert_eq!(
            builtin.claim.unclaim_cooldown_seconds,
            defaults.claim.unclaim_cooldown_seconds
        );
        assert_eq!(
            builtin.default_guest_permissions(),
            defaults.default_guest_permissions()
        );
        assert_eq!(builtin.pending_action_ttl_seconds, 60);
        assert!(builtin.claim_protection);
    }

    #[test]
    fn partial_document_keeps_section_defaults() {
        let config = FactionsConfig::from_json_str(
            r#"{ "claim": { "maxBatchSize": 0 }, "wilderness": { "breakAllowlist": ["minecraft:dirt"] } }"#,
        )
        .expect("partial config parses");
        assert_eq!(config.max_batch_size(), 1);
        assert!(config.claim.require_first_confirmation);
        assert!(config.wilderness.break_allowlist.contains("minecraft:dirt"));
        assert!(config.wilderness.place_allowlist.is_empty());
        assert_eq!(config.power.player_max, 20);
    }

    #[test]
    fn negative_limits_mean_unlimited() {
        let mut config = FactionsConfig::default();
        assert_eq!(config.max_faction_size(), None);
        config.max_faction_size = 3;
        assert_eq!(config.max_faction_size(), Some(3));
    }

    #[test]
    fn dimension_allow_list() {
        let mut config = FactionsConfig::default();
        assert!(config.is_dimension_claimable("the_nether"));
        config.claim.allowed_dimensions = vec!["overworld".into()];
        assert!(config.is_dimension_claimable("overworld"));
        assert!(!config.is_dimension_claimable("the_nether"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FactionsConfig::from_file(Path::new("/nonexistent/factions.json"))
            .expect_err("missing file should fail");
        assert!(matches!(err, FactionsConfigError::ReadFailed { .. }));
    }
}
