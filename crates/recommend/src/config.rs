use crate::error::{RecommendError, Result};
use mealrec_filter::{PoolLimits, DEFAULT_MAX_SKUS, DEFAULT_POOL_LIMIT, MAX_POOL_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PER_ARCHETYPE_LIMIT: usize = 12;
pub const DEFAULT_TARGET_COUNT: usize = 6;
pub const DEFAULT_MAX_TARGET_COUNT: usize = 24;
pub const DEFAULT_DEADLINE_MS: u64 = 20_000;
pub const DEFAULT_MAX_TOKENS: u32 = 1200;

pub const ENV_DEADLINE_MS: &str = "MEALREC_DEADLINE_MS";
pub const ENV_TARGET_COUNT: &str = "MEALREC_TARGET_COUNT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendConfig {
    pub default_pool_limit: usize,
    pub max_pool_limit: usize,
    pub per_archetype_limit: usize,
    pub target_count: usize,
    pub max_target_count: usize,
    /// `0` waits for every archetype.
    pub deadline_ms: u64,
    pub max_tokens: u32,
    pub max_skus: usize,
    pub shuffle_final: bool,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            default_pool_limit: DEFAULT_POOL_LIMIT,
            max_pool_limit: MAX_POOL_LIMIT,
            per_archetype_limit: DEFAULT_PER_ARCHETYPE_LIMIT,
            target_count: DEFAULT_TARGET_COUNT,
            max_target_count: DEFAULT_MAX_TARGET_COUNT,
            deadline_ms: DEFAULT_DEADLINE_MS,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_skus: DEFAULT_MAX_SKUS,
            shuffle_final: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecommendConfig {
    default_pool_limit: Option<usize>,
    max_pool_limit: Option<usize>,
    per_archetype_limit: Option<usize>,
    target_count: Option<usize>,
    max_target_count: Option<usize>,
    deadline_ms: Option<u64>,
    max_tokens: Option<u32>,
    max_skus: Option<usize>,
    shuffle_final: Option<bool>,
}

impl RecommendConfig {
    fn from_raw(raw: RawRecommendConfig) -> Result<Self> {
        let base = Self::default();
        let cfg = Self {
            default_pool_limit: raw.default_pool_limit.unwrap_or(base.default_pool_limit),
            max_pool_limit: raw.max_pool_limit.unwrap_or(base.max_pool_limit),
            per_archetype_limit: raw.per_archetype_limit.unwrap_or(base.per_archetype_limit),
            target_count: raw.target_count.unwrap_or(base.target_count),
            max_target_count: raw.max_target_count.unwrap_or(base.max_target_count),
            deadline_ms: raw.deadline_ms.unwrap_or(base.deadline_ms),
            max_tokens: raw.max_tokens.unwrap_or(base.max_tokens),
            max_skus: raw.max_skus.unwrap_or(base.max_skus),
            shuffle_final: raw.shuffle_final.unwrap_or(base.shuffle_final),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw: RawRecommendConfig =
            toml::from_str(raw).map_err(|err| RecommendError::InvalidConfig(err.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            RecommendError::InvalidConfig(format!("{}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("default_pool_limit", self.default_pool_limit),
            ("max_pool_limit", self.max_pool_limit),
            ("per_archetype_limit", self.per_archetype_limit),
            ("target_count", self.target_count),
            ("max_target_count", self.max_target_count),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RecommendError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        if self.max_tokens == 0 {
            return Err(RecommendError::InvalidConfig(
                "max_tokens must be > 0".to_string(),
            ));
        }
        if self.default_pool_limit > self.max_pool_limit {
            return Err(RecommendError::InvalidConfig(format!(
                "default_pool_limit ({}) cannot exceed max_pool_limit ({})",
                self.default_pool_limit, self.max_pool_limit
            )));
        }
        if self.target_count > self.max_target_count {
            return Err(RecommendError::InvalidConfig(format!(
                "target_count ({}) cannot exceed max_target_count ({})",
                self.target_count, self.max_target_count
            )));
        }
        Ok(())
    }

    /// Layers `MEALREC_DEADLINE_MS` and `MEALREC_TARGET_COUNT` on top, then re-validates.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(ms) = u64_from_env(ENV_DEADLINE_MS) {
            self.deadline_ms = ms;
        }
        if let Some(count) = u64_from_env(ENV_TARGET_COUNT) {
            self.target_count = usize::try_from(count).unwrap_or(usize::MAX);
        }
        self.validate()
    }

    pub fn pool_limits(&self) -> PoolLimits {
        PoolLimits {
            default_limit: self.default_pool_limit,
            max_limit: self.max_pool_limit,
        }
    }

    /// Requested count clamped into `[1, max_target_count]`.
    pub fn target_for(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.target_count)
            .clamp(1, self.max_target_count)
    }

    /// `None` means wait indefinitely; a per-request value of `0` also disables it.
    pub fn deadline_for(&self, requested_ms: Option<u64>) -> Option<Duration> {
        let ms = requested_ms.unwrap_or(self.deadline_ms);
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

fn u64_from_env(var: &str) -> Option<u64> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(
            RecommendConfig::from_toml_str("").expect("parse"),
            RecommendConfig::default()
        );
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let cfg = RecommendConfig::from_toml_str("deadline_ms = 0\ntarget_count = 4\n")
            .expect("parse");
        assert_eq!(cfg.deadline_ms, 0);
        assert_eq!(cfg.target_count, 4);
        assert_eq!(cfg.per_archetype_limit, DEFAULT_PER_ARCHETYPE_LIMIT);
        assert_eq!(cfg.deadline_for(None), None);
        assert_eq!(cfg.deadline_for(Some(50)), Some(Duration::from_millis(50)));
    }

    #[test]
    fn rejects_inconsistent_limits() {
        let err = RecommendConfig::from_toml_str("default_pool_limit = 600\nmax_pool_limit = 500")
            .expect_err("must fail");
        assert!(err.to_string().contains("default_pool_limit"));
        assert!(RecommendConfig::from_toml_str("per_archetype_limit = 0").is_err());
        assert!(RecommendConfig::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn target_is_clamped() {
        let cfg = RecommendConfig::default();
        assert_eq!(cfg.target_for(None), DEFAULT_TARGET_COUNT);
        assert_eq!(cfg.target_for(Some(0)), 1);
        assert_eq!(cfg.target_for(Some(1000)), DEFAULT_MAX_TARGET_COUNT);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mealrec.toml");
        std::fs::write(&path, "shuffle_final = false\n").expect("write");
        let cfg = RecommendConfig::load(&path).expect("load");
        assert!(!cfg.shuffle_final);
        assert!(RecommendConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
