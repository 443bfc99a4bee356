//! Engine configuration (spec.md §6 "Configuration").
//!
//! Grounded on the teacher's `server::opt::Opt`: a `structopt` +
//! `structopt-toml` struct so the same options can come from CLI flags, a
//! TOML file, or (via `Default`) hardcoded fallbacks, all through one
//! schema.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use structopt_toml::StructOptToml;

#[derive(StructOpt, Debug, Clone, StructOptToml, Deserialize, Serialize)]
#[structopt(name = "dsql-engine")]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Apply row-level security to every query.
    #[structopt(long)]
    pub enable_rls: bool,

    /// Memoize optimizer plans by query shape.
    #[structopt(long, parse(try_from_str), default_value = "true")]
    pub enable_plan_cache: bool,

    /// Memoize final row sets by fully-resolved query.
    #[structopt(long, parse(try_from_str), default_value = "true")]
    pub enable_result_cache: bool,

    /// Maximum number of distinct plan-cache entries.
    #[structopt(long, default_value = "1000")]
    pub plan_cache_size: usize,

    /// Plan cache entry time-to-live, in seconds.
    #[structopt(long, default_value = "3600")]
    pub plan_cache_ttl_secs: u64,

    /// Maximum number of distinct result-cache entries.
    #[structopt(long, default_value = "100")]
    pub result_cache_size: usize,

    /// Result cache entry time-to-live, in seconds.
    #[structopt(long, default_value = "300")]
    pub result_cache_ttl_secs: u64,

    /// Never cache a result set with more rows than this.
    #[structopt(long, default_value = "1000")]
    pub max_result_cache_size: usize,

    /// Fetch child relationships concurrently where the plan allows it.
    #[structopt(long, parse(try_from_str), default_value = "true")]
    pub enable_parallel: bool,

    /// Upper bound on concurrent relationship fetches for one query.
    #[structopt(long, default_value = "4")]
    pub max_parallel_degree: usize,

    /// Read default configuration from this TOML file.
    #[structopt(long, short)]
    #[serde(skip)]
    pub config: Option<std::path::PathBuf>,
}

impl EngineConfig {
    pub fn plan_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.plan_cache_ttl_secs)
    }

    pub fn result_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.result_cache_ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::from_iter_safe(std::iter::once("dsql-engine"))
            .expect("every field of EngineConfig has a default_value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert!(!cfg.enable_rls);
        assert!(cfg.enable_plan_cache);
        assert!(cfg.enable_result_cache);
        assert_eq!(cfg.plan_cache_size, 1000);
        assert_eq!(cfg.plan_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.result_cache_size, 100);
        assert_eq!(cfg.result_cache_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.max_result_cache_size, 1000);
        assert_eq!(cfg.max_parallel_degree, 4);
    }

    #[test]
    fn parses_flags_from_args() {
        let cfg = EngineConfig::from_iter_safe(["dsql-engine", "--enable-rls", "--plan-cache-size", "50"]).unwrap();
        assert!(cfg.enable_rls);
        assert_eq!(cfg.plan_cache_size, 50);
    }
}
