//! Reconciliation task: move the inventory toward a target manifest.
//!
//! Excess is deposited first, then missing items are withdrawn one stack at a
//! time. Once nothing is over- or under-provisioned the bank is closed and the
//! whole tree is invalidated.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::core::task::{Invalidation, Task};
use crate::core::types::{ItemStack, Material, ObservedItem};
use crate::input::queue::InputQueue;
use crate::io::resources::Manifest;
use crate::io::world::{ContainerCache, group_by_material};

/// Client calls the reconciliation task issues. Each returns whether it took effect.
pub trait BankActions: Send + Sync {
    fn close(&self) -> bool;
    fn deposit(&self, material: &Material, quantity: u32) -> bool;
    fn deposit_all(&self) -> bool;
    fn withdraw(&self, material: &Material, quantity: u32) -> bool;
}

/// Desired quantities plus the withdrawal order.
#[derive(Debug, Clone, Default)]
pub struct TargetManifest {
    targets: BTreeMap<String, u64>,
    stacks: Vec<ItemStack>,
}

impl TargetManifest {
    pub fn from_stacks(stacks: impl IntoIterator<Item = ItemStack>) -> Self {
        let mut manifest = Self::default();
        for stack in stacks {
            let Some(name) = stack.name() else { continue };
            *manifest.targets.entry(name.to_string()).or_default() +=
                u64::try_from(stack.quantity).unwrap_or(0);
            manifest.stacks.push(stack);
        }
        manifest.stacks.sort_by(ItemStack::manifest_order);
        manifest
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self::from_stacks(
            manifest
                .items
                .iter()
                .map(|item| ItemStack::new(item.material(), i64::from(item.quantity))),
        )
    }

    /// Desired quantity of `name`; untracked kinds target zero.
    pub fn target(&self, name: &str) -> u64 {
        self.targets.get(name).copied().unwrap_or(0)
    }

    /// Stacks in withdrawal order.
    pub fn stacks(&self) -> &[ItemStack] {
        &self.stacks
    }
}

/// The next step toward `manifest` given the current `items`, or `None` when
/// the inventory already matches.
pub fn discrepancy(manifest: &TargetManifest, items: &[ObservedItem]) -> Option<ItemStack> {
    let grouped = group_by_material(items);
    let before_kinds = grouped.len();
    let excess: Vec<&(Material, u64)> = grouped
        .values()
        .filter(|(material, count)| *count > manifest.target(&material.name))
        .collect();

    if let Some((material, count)) = excess.first().copied() {
        if before_kinds >> 1 < excess.len() {
            return Some(ItemStack::DEPOSIT_ALL);
        }
        let extra = count - manifest.target(&material.name);
        let quantity = i64::try_from(extra).unwrap_or(i64::MAX);
        return Some(ItemStack::new(material.clone(), -quantity));
    }

    manifest
        .stacks()
        .iter()
        .find(|stack| {
            let have = stack
                .name()
                .and_then(|name| grouped.get(name))
                .map_or(0, |(_, count)| *count);
            have < manifest.target(stack.name().unwrap_or_default())
        })
        .cloned()
}

fn clamp_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity.unsigned_abs()).unwrap_or(u32::MAX)
}

/// Build the reconciliation task over the inventory cache.
///
/// Handlers only enqueue bank calls on `input`; they never block on the client.
pub fn reconcile_task(
    name: &'static str,
    manifest: TargetManifest,
    inventory: Arc<ContainerCache>,
    bank: Arc<dyn BankActions>,
    input: Arc<InputQueue>,
) -> Task<ItemStack> {
    let observed = Arc::clone(&inventory);
    let mut task = Task::new(name, move || -> Result<Option<ItemStack>> {
        let items = observed.get_all()?;
        Ok(discrepancy(&manifest, &items))
    });

    let close_bank = Arc::clone(&bank);
    let close_input = Arc::clone(&input);
    task.register_satisfied(move || {
        debug!("manifest satisfied, closing bank");
        let bank = Arc::clone(&close_bank);
        close_input.callback(Some("close bank"), move || bank.close());
        Ok(Invalidation::All)
    });

    let deposit_bank = Arc::clone(&bank);
    let deposit_input = Arc::clone(&input);
    task.register_effect(
        |state: &ItemStack| state.quantity < 0,
        move |state: &ItemStack| {
            let bank = Arc::clone(&deposit_bank);
            match state.material.clone() {
                None => {
                    debug!("depositing everything");
                    deposit_input.callback(Some("deposit all"), move || bank.deposit_all());
                }
                Some(material) => {
                    let quantity = clamp_quantity(state.quantity);
                    debug!(item = %material.name, quantity, "depositing excess");
                    let label = format!("deposit {quantity} {}", material.name);
                    deposit_input
                        .callback(Some(label.as_str()), move || bank.deposit(&material, quantity));
                }
            }
            Ok(())
        },
    );

    task.register_default(move |state: &ItemStack| {
        if let Some(material) = state.material.clone() {
            let quantity = clamp_quantity(state.quantity);
            debug!(item = %material.name, quantity, "withdrawing");
            let label = format!("withdraw {quantity} {}", material.name);
            let bank = Arc::clone(&bank);
            input.callback(Some(label.as_str()), move || bank.withdraw(&material, quantity));
        }
        Ok(Invalidation::SelfOnly)
    });

    task.on_invalidate(move || inventory.invalidate());
    task
}
