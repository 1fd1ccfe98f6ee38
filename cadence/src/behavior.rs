//! Bot behaviors: what a bot registers at startup and how it reacts to
//! lifecycle transitions.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::bot::BotContext;
use crate::core::mission::{LogicTree, Mission};
use crate::core::reconcile::{BankActions, TargetManifest, reconcile_task};
use crate::io::resources::ManifestStore;
use crate::io::world::{Caches, ContainerView};

/// Per-bot hooks. Only [`Behavior::on_bot_start`] is required.
///
/// Returning an error from `on_bot_start` stops the bot before the first tick.
pub trait Behavior: Send + Sync {
    fn on_bot_start(&self, args: &[String], ctx: &BotContext, tree: &mut LogicTree) -> Result<()>;

    fn on_bot_stop(&self, _ctx: &BotContext) {}

    fn on_bot_pause(&self, _ctx: &BotContext) {}

    fn on_bot_resume(&self, _ctx: &BotContext) {}
}

/// Keeps the inventory matching a named manifest from `manifests.json`.
///
/// The first start argument, when present, overrides the manifest name.
pub struct ReconcileBehavior<V> {
    manifest: String,
    inventory: V,
    bank: Arc<dyn BankActions>,
}

impl<V> ReconcileBehavior<V>
where
    V: ContainerView + Clone + Sync + 'static,
{
    pub fn new(manifest: impl Into<String>, inventory: V, bank: Arc<dyn BankActions>) -> Self {
        Self {
            manifest: manifest.into(),
            inventory,
            bank,
        }
    }
}

impl<V> Behavior for ReconcileBehavior<V>
where
    V: ContainerView + Clone + Sync + 'static,
{
    fn on_bot_start(&self, args: &[String], ctx: &BotContext, tree: &mut LogicTree) -> Result<()> {
        let store = ManifestStore::load(&ctx.config.resource_dir)?;
        let name = args.first().map_or(self.manifest.as_str(), String::as_str);
        let manifest = store
            .get(name)
            .with_context(|| format!("manifest '{name}' not found"))?;
        info!(manifest = name, items = manifest.items.len(), "reconciling inventory");

        let inventory = ctx.caches.register(Caches::INVENTORY, self.inventory.clone());
        let task = reconcile_task(
            "reconcile",
            TargetManifest::from_manifest(manifest),
            inventory,
            Arc::clone(&self.bank),
            Arc::clone(&ctx.input),
        );
        tree.register(Mission::of(task));
        Ok(())
    }

    fn on_bot_stop(&self, _ctx: &BotContext) {
        info!(manifest = %self.manifest, "reconcile bot stopped");
    }
}
