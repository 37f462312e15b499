//! Harness configuration.
//!
//! Values are layered: built-in defaults, then the optional TOML file
//! (`harness/wiggum.toml`), then `WIGGUM_*` environment variables, then CLI
//! flags. Sanity mode forces a single loop with no cooldown on top of all of
//! them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::PolicyConfig;

pub const CONFIG_FILE_NAME: &str = "wiggum.toml";
pub const PLAN_FILE_NAME: &str = "CLAUDE.md";

pub const ENV_REPO_ROOT: &str = "WIGGUM_REPO_ROOT";
pub const ENV_PLAN_DIR: &str = "WIGGUM_PLAN_DIR";
pub const ENV_HARNESS_DIR: &str = "WIGGUM_HARNESS_DIR";
pub const ENV_LOG_DIR: &str = "WIGGUM_LOG_DIR";
pub const ENV_MAX_LOOPS: &str = "WIGGUM_MAX_LOOPS";
pub const ENV_COOLDOWN_SECONDS: &str = "WIGGUM_COOLDOWN_SECONDS";
pub const ENV_PROTECTED_PATHS: &str = "WIGGUM_PROTECTED_PATHS";

/// Harness configuration (TOML).
///
/// Relative directories are resolved against the repository root, except
/// `log_dir` which is relative to `harness_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WiggumConfig {
    /// Directory holding the project plan (`CLAUDE.md`).
    pub plan_dir: PathBuf,

    pub harness_dir: PathBuf,

    /// Transcript and summary log directory.
    pub log_dir: PathBuf,

    /// Iteration budget.
    pub max_loops: u32,

    /// Pause between iterations that did not finish the loop.
    pub cooldown_secs: u64,

    /// Paths the verifier may never delete or move.
    pub protected_paths: Vec<String>,

    /// Extra command prefixes the verifier may not run.
    pub denied_commands: Vec<String>,

    /// Replacement builder prompt template.
    pub builder_template: Option<PathBuf>,

    /// Replacement verifier prompt template.
    pub verifier_template: Option<PathBuf>,

    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Agent CLI to spawn.
    pub program: String,

    /// Arguments placed before the generated ones (wrappers, scripts).
    pub args: Vec<String>,

    pub model: Option<String>,

    pub setting_sources: Vec<String>,

    pub permission_mode: String,

    /// Keep at most this many bytes of executor stderr for error reports.
    pub stderr_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: Vec::new(),
            model: None,
            setting_sources: vec!["user".to_string(), "project".to_string()],
            permission_mode: "bypassPermissions".to_string(),
            stderr_limit_bytes: 64 * 1024,
        }
    }
}

impl Default for WiggumConfig {
    fn default() -> Self {
        Self {
            plan_dir: PathBuf::from("harness/project"),
            harness_dir: PathBuf::from("harness"),
            log_dir: PathBuf::from("logs"),
            max_loops: 20,
            cooldown_secs: 2,
            protected_paths: Vec::new(),
            denied_commands: Vec::new(),
            builder_template: None,
            verifier_template: None,
            executor: ExecutorConfig::default(),
        }
    }
}

impl WiggumConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_loops == 0 {
            return Err(anyhow!("max_loops must be > 0"));
        }
        if self.executor.program.trim().is_empty() {
            return Err(anyhow!("executor.program must be non-empty"));
        }
        if self.executor.permission_mode.trim().is_empty() {
            return Err(anyhow!("executor.permission_mode must be non-empty"));
        }
        if self.executor.stderr_limit_bytes == 0 {
            return Err(anyhow!("executor.stderr_limit_bytes must be > 0"));
        }
        if self.protected_paths.iter().any(|p| p.trim().is_empty()) {
            return Err(anyhow!("protected_paths entries must be non-empty"));
        }
        if self.denied_commands.iter().any(|c| c.trim().is_empty()) {
            return Err(anyhow!("denied_commands entries must be non-empty"));
        }
        Ok(())
    }

    /// Apply `WIGGUM_*` overrides read through `lookup`.
    ///
    /// `WIGGUM_REPO_ROOT` is not handled here because it decides where the
    /// config file is read from in the first place.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_PLAN_DIR) {
            self.plan_dir = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_HARNESS_DIR) {
            self.harness_dir = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_MAX_LOOPS) {
            self.max_loops = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_LOOPS} must be a positive integer, got {value:?}"))?;
        }
        if let Some(value) = get(ENV_COOLDOWN_SECONDS) {
            self.cooldown_secs = value.trim().parse().with_context(|| {
                format!("{ENV_COOLDOWN_SECONDS} must be a whole number of seconds, got {value:?}")
            })?;
        }
        if let Some(value) = get(ENV_PROTECTED_PATHS) {
            self.protected_paths = split_list(&value);
        }
        self.validate()
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            protected_paths: self.protected_paths.clone(),
            denied_commands: self.denied_commands.clone(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WiggumConfig::default()`.
pub fn load_config(path: &Path) -> Result<WiggumConfig> {
    if !path.exists() {
        let cfg = WiggumConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WiggumConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Config file location when `--config` is not given.
pub fn default_config_path(repo_root: &Path, harness_dir: Option<&str>) -> PathBuf {
    let harness = harness_dir
        .filter(|dir| !dir.trim().is_empty())
        .map_or_else(|| WiggumConfig::default().harness_dir, PathBuf::from);
    absolutize(repo_root, &harness).join(CONFIG_FILE_NAME)
}

/// Command-line overrides, applied after the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub max_loops: Option<u32>,
    pub cooldown_secs: Option<u64>,
    pub sanity_check: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub repo_root: PathBuf,
    pub plan_dir: PathBuf,
    pub harness_dir: PathBuf,
    pub log_dir: PathBuf,
    pub max_loops: u32,
    pub cooldown: Duration,
    pub sanity_check: bool,
    pub policy: PolicyConfig,
    pub builder_template: Option<PathBuf>,
    pub verifier_template: Option<PathBuf>,
    pub executor: ExecutorConfig,
}

impl Settings {
    pub fn resolve(repo_root: &Path, cfg: &WiggumConfig, overrides: &CliOverrides) -> Result<Self> {
        let mut max_loops = overrides.max_loops.unwrap_or(cfg.max_loops);
        let mut cooldown_secs = overrides.cooldown_secs.unwrap_or(cfg.cooldown_secs);
        if max_loops == 0 {
            return Err(anyhow!("--max-loops must be > 0"));
        }
        if overrides.sanity_check {
            max_loops = 1;
            cooldown_secs = 0;
        }

        let harness_dir = absolutize(repo_root, &cfg.harness_dir);
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            plan_dir: absolutize(repo_root, &cfg.plan_dir),
            log_dir: absolutize(&harness_dir, &cfg.log_dir),
            harness_dir,
            max_loops,
            cooldown: Duration::from_secs(cooldown_secs),
            sanity_check: overrides.sanity_check,
            policy: cfg.policy_config(),
            builder_template: cfg
                .builder_template
                .as_deref()
                .map(|p| absolutize(repo_root, p)),
            verifier_template: cfg
                .verifier_template
                .as_deref()
                .map(|p| absolutize(repo_root, p)),
            executor: cfg.executor.clone(),
        })
    }

    /// The project plan the builder reads.
    pub fn plan_file(&self) -> PathBuf {
        self.plan_dir.join(PLAN_FILE_NAME)
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
