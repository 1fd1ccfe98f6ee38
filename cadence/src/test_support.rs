//! Deterministic doubles for the client seams: clock, primitives, containers, bank.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use crate::core::reconcile::BankActions;
use crate::core::types::{Material, ObservedItem};
use crate::input::target::Primitive;
use crate::input::timing::Clock;
use crate::io::config::{EngineConfig, TimingConfig};
use crate::io::resources::{MANIFESTS_FILE, Manifest};
use crate::io::world::ContainerView;

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn starting_at(ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(ms),
        })
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Primitive that replays a scripted sequence of outcomes.
///
/// Once the script runs out the last outcome repeats.
pub struct ScriptedPrimitive {
    name: String,
    script: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
    log: Option<Arc<Mutex<Vec<String>>>>,
    hovers: Arc<AtomicUsize>,
}

impl ScriptedPrimitive {
    pub fn always(name: &str, ok: bool) -> Self {
        Self::scripted(name, vec![ok])
    }

    pub fn scripted(name: &str, outcomes: Vec<bool>) -> Self {
        let last = outcomes.last().copied().unwrap_or(true);
        Self {
            name: name.to_string(),
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(last),
            log: None,
            hovers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Append this primitive's name to `log` on every attempt.
    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn shared_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Counter of hover calls, shared with the primitive.
    pub fn hover_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.hovers)
    }
}

impl Primitive for ScriptedPrimitive {
    fn attempt(&self) -> bool {
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        *last
    }

    fn hover(&self) {
        self.hovers.fetch_add(1, Ordering::SeqCst);
    }
}

/// Container whose contents the test sets directly. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct StaticContainer {
    items: Arc<Mutex<Vec<ObservedItem>>>,
}

impl StaticContainer {
    pub fn new(items: Vec<ObservedItem>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
        }
    }

    pub fn set(&self, items: Vec<ObservedItem>) {
        *self.items.lock() = items;
    }
}

impl ContainerView for StaticContainer {
    fn get_all(&self) -> Result<Vec<ObservedItem>> {
        Ok(self.items.lock().clone())
    }
}

/// Bank that records every call and always succeeds. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingBank {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> bool {
        self.calls.lock().push(call);
        true
    }
}

impl BankActions for RecordingBank {
    fn close(&self) -> bool {
        self.record("close".to_string())
    }

    fn deposit(&self, material: &Material, quantity: u32) -> bool {
        self.record(format!("deposit {quantity} {}", material.name))
    }

    fn deposit_all(&self) -> bool {
        self.record("deposit all".to_string())
    }

    fn withdraw(&self, material: &Material, quantity: u32) -> bool {
        self.record(format!("withdraw {quantity} {}", material.name))
    }
}

/// Write `manifests` to `<dir>/manifests.json`.
pub fn write_manifests(dir: &Path, manifests: &[Manifest]) -> Result<()> {
    let doc = json!({ "manifests": manifests });
    let path = dir.join(MANIFESTS_FILE);
    let contents = serde_json::to_string_pretty(&doc).context("serialize manifests")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

/// Temporary resource directory holding `manifests`.
pub fn resource_dir(manifests: &[Manifest]) -> Result<TempDir> {
    let dir = tempfile::tempdir().context("create resource dir")?;
    write_manifests(dir.path(), manifests)?;
    Ok(dir)
}

/// Config with millisecond ticks, no timing jitter, and a fixed seed.
pub fn fast_config(resource_dir: &Path) -> EngineConfig {
    EngineConfig {
        tick_interval_ms: 1,
        supervise_interval_ms: 5,
        worker_threads: 1,
        resource_dir: resource_dir.to_path_buf(),
        timing: TimingConfig {
            task_switch_delay_ms: 0,
            task_switch_jitter_ms: 0,
            min_click_ms: 0,
            min_click_jitter_ms: 0,
            mouse_speed: 1.0,
            seed: Some(0),
        },
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
