//! In-memory world for dry runs: an inventory and a bank behind the same
//! traits the client bindings implement.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::core::reconcile::BankActions;
use crate::core::types::{Material, ObservedItem};
use crate::io::world::ContainerView;

type Holdings = BTreeMap<String, (Material, u64)>;

struct WorldState {
    inventory: Holdings,
    bank: Holdings,
    bank_open: bool,
    actions: u64,
    rng: StdRng,
}

/// Simulated inventory and bank. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
    failure_rate: f64,
}

impl SimWorld {
    /// Empty world. `failure_rate` is the chance each bank call fails and must
    /// be retried.
    pub fn new(seed: u64, failure_rate: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                inventory: Holdings::new(),
                bank: Holdings::new(),
                bank_open: false,
                actions: 0,
                rng: StdRng::seed_from_u64(seed),
            })),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn stock_inventory(&self, material: Material, quantity: u64) {
        add(&mut self.state.lock().inventory, &material, quantity);
    }

    pub fn stock_bank(&self, material: Material, quantity: u64) {
        add(&mut self.state.lock().bank, &material, quantity);
    }

    pub fn inventory_count(&self, name: &str) -> u64 {
        self.state.lock().inventory.get(name).map_or(0, |(_, n)| *n)
    }

    pub fn bank_count(&self, name: &str) -> u64 {
        self.state.lock().bank.get(name).map_or(0, |(_, n)| *n)
    }

    /// Current inventory as `(name, quantity)` pairs in name order.
    pub fn inventory(&self) -> Vec<(String, u64)> {
        self.state
            .lock()
            .inventory
            .iter()
            .map(|(name, (_, n))| (name.clone(), *n))
            .collect()
    }

    /// Whether the last bank call left the bank open.
    pub fn bank_open(&self) -> bool {
        self.state.lock().bank_open
    }

    /// Bank calls that took effect.
    pub fn actions(&self) -> u64 {
        self.state.lock().actions
    }

    /// Apply `change` unless the simulated client drops the call.
    fn act(&self, label: &str, change: impl FnOnce(&mut WorldState) -> bool) -> bool {
        let mut state = self.state.lock();
        if self.failure_rate > 0.0 && state.rng.gen_bool(self.failure_rate) {
            debug!(action = label, "simulated client dropped the call");
            return false;
        }
        let ok = change(&mut *state);
        if ok {
            state.actions += 1;
        }
        trace!(action = label, ok, "simulated bank call");
        ok
    }
}

fn add(holdings: &mut Holdings, material: &Material, quantity: u64) {
    if quantity == 0 {
        return;
    }
    holdings
        .entry(material.name.clone())
        .or_insert_with(|| (material.clone(), 0))
        .1 += quantity;
}

/// Move up to `quantity` of `name`. Returns how much moved.
fn transfer(from: &mut Holdings, to: &mut Holdings, name: &str, quantity: u64) -> u64 {
    let Some((material, held)) = from.get_mut(name) else {
        return 0;
    };
    let moved = quantity.min(*held);
    *held -= moved;
    let material = material.clone();
    if *held == 0 {
        from.remove(name);
    }
    add(to, &material, moved);
    moved
}

impl BankActions for SimWorld {
    fn close(&self) -> bool {
        self.act("close", |state| {
            state.bank_open = false;
            true
        })
    }

    fn deposit(&self, material: &Material, quantity: u32) -> bool {
        self.act("deposit", |state| {
            state.bank_open = true;
            let WorldState {
                inventory, bank, ..
            } = state;
            transfer(inventory, bank, &material.name, u64::from(quantity)) > 0
        })
    }

    fn deposit_all(&self) -> bool {
        self.act("deposit all", |state| {
            state.bank_open = true;
            let names: Vec<String> = state.inventory.keys().cloned().collect();
            let WorldState {
                inventory, bank, ..
            } = state;
            for name in names {
                transfer(inventory, bank, &name, u64::MAX);
            }
            true
        })
    }

    fn withdraw(&self, material: &Material, quantity: u32) -> bool {
        self.act("withdraw", |state| {
            state.bank_open = true;
            let WorldState {
                inventory, bank, ..
            } = state;
            transfer(bank, inventory, &material.name, u64::from(quantity)) > 0
        })
    }
}

/// Inventory side of a [`SimWorld`].
#[derive(Clone)]
pub struct SimInventory(pub SimWorld);

impl ContainerView for SimInventory {
    fn get_all(&self) -> Result<Vec<ObservedItem>> {
        let state = self.0.state.lock();
        Ok(state
            .inventory
            .values()
            .map(|(material, n)| {
                ObservedItem::new(material.clone(), u32::try_from(*n).unwrap_or(u32::MAX))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_and_withdraw_move_items() {
        let world = SimWorld::new(1, 0.0);
        world.stock_inventory(Material::new("Junk"), 5);
        world.stock_bank(Material::new("Sword"), 2);

        assert!(world.deposit(&Material::new("Junk"), 3));
        assert_eq!(world.inventory_count("Junk"), 2);
        assert_eq!(world.bank_count("Junk"), 3);

        assert!(world.withdraw(&Material::new("Sword"), 1));
        assert_eq!(world.inventory_count("Sword"), 1);
        assert!(world.bank_open());

        assert!(!world.withdraw(&Material::new("Shield"), 1), "nothing to withdraw");
        assert!(world.close());
        assert!(!world.bank_open());
        assert_eq!(world.actions(), 3);
    }

    #[test]
    fn deposit_all_empties_inventory() {
        let world = SimWorld::new(1, 0.0);
        world.stock_inventory(Material::new("Junk"), 5);
        world.stock_inventory(Material::stackable("Coins"), 100);
        assert!(world.deposit_all());
        assert!(world.inventory().is_empty());
        assert_eq!(world.bank_count("Coins"), 100);
    }

    #[test]
    fn inventory_view_reports_holdings() {
        let world = SimWorld::new(1, 0.0);
        world.stock_inventory(Material::new("Sword"), 1);
        let items = SimInventory(world).get_all().expect("observe");
        assert_eq!(items, vec![ObservedItem::new(Material::new("Sword"), 1)]);
    }

    #[test]
    fn full_failure_rate_drops_every_call() {
        let world = SimWorld::new(1, 1.0);
        world.stock_inventory(Material::new("Junk"), 1);
        assert!(!world.deposit(&Material::new("Junk"), 1));
        assert_eq!(world.inventory_count("Junk"), 1);
    }
}
