//! Engine configuration stored as TOML (default `cadence.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML).
///
/// Missing fields default to the values the engine ships with, so an empty
/// file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Sleep between ticks of the driving loop.
    pub tick_interval_ms: u64,

    /// Poll interval of the supervising bot thread.
    pub supervise_interval_ms: u64,

    /// Threads in the worker pool for bot-registered sub-tasks.
    pub worker_threads: usize,

    /// Directory holding data files (`manifests.json`).
    pub resource_dir: PathBuf,

    pub timing: TimingConfig,
}

/// Humanized input timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Base delay before switching between input kinds.
    pub task_switch_delay_ms: u64,
    /// Upper bound (exclusive) of the random extra switch delay.
    pub task_switch_jitter_ms: u64,
    /// Base spacing between pointer attempts at mouse speed 1.0.
    pub min_click_ms: u64,
    /// Upper bound (exclusive) of the random extra click spacing.
    pub min_click_jitter_ms: u64,
    /// Mouse speed multiplier; the click spacing scales with its inverse.
    pub mouse_speed: f64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            task_switch_delay_ms: 300,
            task_switch_jitter_ms: 200,
            min_click_ms: 100,
            min_click_jitter_ms: 60,
            mouse_speed: 1.0,
            seed: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            supervise_interval_ms: 200,
            worker_threads: 2,
            resource_dir: PathBuf::from("resources"),
            timing: TimingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(anyhow!("tick_interval_ms must be > 0"));
        }
        if self.supervise_interval_ms == 0 {
            return Err(anyhow!("supervise_interval_ms must be > 0"));
        }
        if self.worker_threads == 0 {
            return Err(anyhow!("worker_threads must be > 0"));
        }
        if !self.timing.mouse_speed.is_finite() || self.timing.mouse_speed <= 0.0 {
            return Err(anyhow!("timing.mouse_speed must be a positive number"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn supervise_interval(&self) -> Duration {
        Duration::from_millis(self.supervise_interval_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
