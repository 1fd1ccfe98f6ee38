//! Shared item types used by tasks and world observations.
//!
//! These types carry no behavior beyond ordering and small helpers; they must
//! remain deterministic so task evaluation stays reproducible in tests.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// An item kind, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Stackable items occupy one slot regardless of quantity.
    #[serde(default)]
    pub stackable: bool,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stackable: false,
        }
    }

    pub fn stackable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stackable: true,
        }
    }
}

/// A quantity of one material.
///
/// Negative quantities are deposit requests. `material == None` is reserved for
/// the [`ItemStack::DEPOSIT_ALL`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub material: Option<Material>,
    pub quantity: i64,
}

impl ItemStack {
    /// Sentinel desired state meaning "empty the whole container".
    pub const DEPOSIT_ALL: ItemStack = ItemStack {
        material: None,
        quantity: i64::MIN,
    };

    pub fn new(material: Material, quantity: i64) -> Self {
        Self {
            material: Some(material),
            quantity,
        }
    }

    pub fn is_deposit_all(&self) -> bool {
        self.material.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.material.as_ref().map(|m| m.name.as_str())
    }

    pub fn is_stackable(&self) -> bool {
        self.material.as_ref().is_some_and(|m| m.stackable)
    }

    /// Manifest ordering: non-stackable before stackable, then ascending
    /// quantity, then name.
    pub fn manifest_order(a: &ItemStack, b: &ItemStack) -> Ordering {
        a.is_stackable()
            .cmp(&b.is_stackable())
            .then_with(|| a.quantity.cmp(&b.quantity))
            .then_with(|| a.name().cmp(&b.name()))
    }
}

/// One observed slot or entry in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedItem {
    pub material: Material,
    pub quantity: u32,
}

impl ObservedItem {
    pub fn new(material: Material, quantity: u32) -> Self {
        Self { material, quantity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_order_puts_non_stackable_first() {
        let mut stacks = vec![
            ItemStack::new(Material::stackable("Arrow"), 100),
            ItemStack::new(Material::new("Sword"), 2),
            ItemStack::new(Material::stackable("Rune"), 5),
            ItemStack::new(Material::new("Shield"), 1),
        ];
        stacks.sort_by(ItemStack::manifest_order);
        let names: Vec<&str> = stacks.iter().filter_map(ItemStack::name).collect();
        assert_eq!(names, vec!["Shield", "Sword", "Rune", "Arrow"]);
    }

    #[test]
    fn deposit_all_sentinel_has_no_material() {
        assert!(ItemStack::DEPOSIT_ALL.is_deposit_all());
        assert!(!ItemStack::new(Material::new("Sword"), -1).is_deposit_all());
    }
}
