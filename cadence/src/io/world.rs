//! World observation seam and the invalidatable read-through cache over it.
//!
//! The [`ContainerView`] trait decouples tasks from the game client. Tests and
//! the simulator use in-memory views; tasks only ever read through
//! [`ContainerCache`], so every observation can be dropped at a pause/stop
//! boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::core::types::{Material, ObservedItem};

/// Read access to one container (inventory, bank, ...).
///
/// Only the driving loop calls into a view; implementations need not support
/// concurrent readers.
pub trait ContainerView: Send {
    fn get_all(&self) -> Result<Vec<ObservedItem>>;

    fn count(&self, name: &str) -> Result<u64> {
        Ok(count_items(
            self.get_all()?.iter().filter(|item| item.material.name == name),
        ))
    }
}

impl<V: ContainerView + Sync + ?Sized> ContainerView for Arc<V> {
    fn get_all(&self) -> Result<Vec<ObservedItem>> {
        (**self).get_all()
    }
}

/// Sum quantities across observed entries.
pub fn count_items<'a>(items: impl IntoIterator<Item = &'a ObservedItem>) -> u64 {
    items.into_iter().map(|item| u64::from(item.quantity)).sum()
}

/// Per-material totals for a container snapshot, in name order.
pub fn group_by_material(items: &[ObservedItem]) -> BTreeMap<String, (Material, u64)> {
    let mut grouped: BTreeMap<String, (Material, u64)> = BTreeMap::new();
    for item in items {
        grouped
            .entry(item.material.name.clone())
            .or_insert_with(|| (item.material.clone(), 0))
            .1 += u64::from(item.quantity);
    }
    grouped
}

struct CacheState {
    snapshot: Option<Arc<Vec<ObservedItem>>>,
    reads: u64,
}

/// Read-through cache of one container's contents.
pub struct ContainerCache {
    name: String,
    view: Mutex<Box<dyn ContainerView>>,
    state: Mutex<CacheState>,
}

impl ContainerCache {
    pub fn new(name: impl Into<String>, view: impl ContainerView + 'static) -> Self {
        Self {
            name: name.into(),
            view: Mutex::new(Box::new(view)),
            state: Mutex::new(CacheState {
                snapshot: None,
                reads: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached contents, reading the view on a miss.
    pub fn get_all(&self) -> Result<Arc<Vec<ObservedItem>>> {
        if let Some(snapshot) = self.state.lock().snapshot.clone() {
            trace!(container = %self.name, "cache hit");
            return Ok(snapshot);
        }
        let items = self
            .view
            .lock()
            .get_all()
            .with_context(|| format!("read container '{}'", self.name))?;
        let snapshot = Arc::new(items);
        let mut state = self.state.lock();
        state.reads += 1;
        state.snapshot = Some(Arc::clone(&snapshot));
        debug!(container = %self.name, entries = snapshot.len(), "container observed");
        Ok(snapshot)
    }

    pub fn count(&self, name: &str) -> Result<u64> {
        let items = self.get_all()?;
        Ok(count_items(
            items.iter().filter(|item| item.material.name == name),
        ))
    }

    pub fn invalidate(&self) {
        self.state.lock().snapshot = None;
    }

    pub fn is_cached(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }

    /// Number of times the underlying view has been read.
    pub fn reads(&self) -> u64 {
        self.state.lock().reads
    }
}

/// Registry of container caches sharing one invalidation switch.
#[derive(Default)]
pub struct Caches {
    containers: RwLock<BTreeMap<String, Arc<ContainerCache>>>,
}

impl Caches {
    pub const INVENTORY: &'static str = "inventory";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the cache for `name`.
    pub fn register(&self, name: &str, view: impl ContainerView + 'static) -> Arc<ContainerCache> {
        let cache = Arc::new(ContainerCache::new(name, view));
        self.containers
            .write()
            .insert(name.to_string(), Arc::clone(&cache));
        cache
    }

    pub fn get(&self, name: &str) -> Option<Arc<ContainerCache>> {
        self.containers.read().get(name).cloned()
    }

    pub fn inventory(&self) -> Option<Arc<ContainerCache>> {
        self.get(Self::INVENTORY)
    }

    /// Drop every cached observation. Completes before returning.
    pub fn invalidate_all(&self) {
        let containers = self.containers.read();
        for cache in containers.values() {
            cache.invalidate();
        }
        debug!(containers = containers.len(), "invalidated all caches");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticContainer;

    #[test]
    fn cache_reads_through_once_until_invalidated() {
        let view = StaticContainer::new(vec![ObservedItem::new(Material::new("Sword"), 1)]);
        let cache = ContainerCache::new("inventory", view.clone());

        assert_eq!(cache.count("Sword").expect("count"), 1);
        assert_eq!(cache.count("Sword").expect("count"), 1);
        assert_eq!(cache.reads(), 1);

        view.set(vec![ObservedItem::new(Material::new("Sword"), 2)]);
        assert_eq!(cache.count("Sword").expect("count"), 1, "stale until invalidated");

        cache.invalidate();
        assert_eq!(cache.count("Sword").expect("count"), 2);
        assert_eq!(cache.reads(), 2);
    }

    #[test]
    fn invalidate_all_drops_every_container() {
        let caches = Caches::new();
        let inventory = caches.register(Caches::INVENTORY, StaticContainer::new(Vec::new()));
        let bank = caches.register("bank", StaticContainer::new(Vec::new()));
        inventory.get_all().expect("read");
        bank.get_all().expect("read");

        caches.invalidate_all();
        assert!(!inventory.is_cached());
        assert!(!bank.is_cached());
    }

    #[test]
    fn group_by_material_sums_slots() {
        let items = vec![
            ObservedItem::new(Material::new("Junk"), 1),
            ObservedItem::new(Material::new("Junk"), 1),
            ObservedItem::new(Material::stackable("Coins"), 250),
        ];
        let grouped = group_by_material(&items);
        assert_eq!(grouped["Junk"].1, 2);
        assert_eq!(grouped["Coins"].1, 250);
        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["Coins", "Junk"]);
    }
}
