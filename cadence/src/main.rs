//! `cadence` command line: check a setup, or dry-run the reconciliation bot
//! against the simulated world.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence::behavior::ReconcileBehavior;
use cadence::bot::{Bot, BotContext};
use cadence::core::reconcile::{TargetManifest, discrepancy};
use cadence::core::types::Material;
use cadence::error::EngineError;
use cadence::exit_codes;
use cadence::io::config::load_config;
use cadence::io::resources::{Manifest, ManifestStore};
use cadence::io::world::ContainerView;
use cadence::logging;
use cadence::sim::{SimInventory, SimWorld};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "Tick-driven task engine with humanized input dispatch"
)]
struct Cli {
    /// Engine config (TOML). Defaults apply when the file is missing.
    #[arg(long, default_value = "cadence.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the config and the resource directory.
    Validate {
        /// Also require this manifest to exist.
        #[arg(long)]
        manifest: Option<String>,
    },
    /// Run the reconciliation bot against an in-memory world.
    Simulate {
        /// Manifest to reconcile the inventory against.
        #[arg(long)]
        manifest: String,
        /// Starting inventory entry, `NAME=QTY`. Repeatable.
        #[arg(long = "inventory", value_parser = parse_stock)]
        inventory: Vec<(String, u64)>,
        /// Extra bank stock, `NAME=QTY`. The bank always holds the manifest.
        #[arg(long = "bank", value_parser = parse_stock)]
        bank: Vec<(String, u64)>,
        /// Give up after this many ticks.
        #[arg(long, default_value_t = 500)]
        max_ticks: u64,
        /// Chance that a simulated bank call fails and is retried.
        #[arg(long, default_value_t = 0.0, value_parser = parse_rate)]
        failure_rate: f64,
        /// Seed for the simulated world.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Serialize)]
struct SimulationReport {
    status: &'static str,
    ticks: u64,
    bank_actions: u64,
    inventory: BTreeMap<String, u64>,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            match err.downcast_ref::<EngineError>() {
                Some(EngineError::TickFault { .. }) => exit_codes::FAULT,
                _ => exit_codes::INVALID,
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Validate { manifest } => {
            let store = ManifestStore::load(&config.resource_dir)?;
            if let Some(name) = manifest {
                store
                    .get(&name)
                    .with_context(|| format!("manifest '{name}' not found"))?;
            }
            println!("ok: {} manifest(s)", store.len());
            Ok(exit_codes::OK)
        }
        Command::Simulate {
            manifest,
            inventory,
            bank,
            max_ticks,
            failure_rate,
            seed,
        } => {
            let store = ManifestStore::load(&config.resource_dir)?;
            let target = store
                .get(&manifest)
                .with_context(|| format!("manifest '{manifest}' not found"))?;
            let world = seed_world(target, &inventory, &bank, seed, failure_rate);
            let ctx = BotContext::new(config);
            simulate(ctx, manifest, target, world, max_ticks)
        }
    }
}

fn simulate(
    ctx: BotContext,
    name: String,
    manifest: &Manifest,
    world: SimWorld,
    max_ticks: u64,
) -> Result<i32> {
    let target = TargetManifest::from_manifest(manifest);
    let poll = ctx.config.tick_interval();
    let behavior = ReconcileBehavior::new(
        name.clone(),
        SimInventory(world.clone()),
        Arc::new(world.clone()),
    );
    let bot = Bot::new(ctx, behavior);
    bot.on_start(&[name]);

    let satisfied = thread::scope(|scope| -> Result<bool> {
        let watcher = scope.spawn(|| -> Result<bool> {
            while !bot.is_shutdown() {
                let items = SimInventory(world.clone()).get_all()?;
                if discrepancy(&target, &items).is_none()
                    && !world.bank_open()
                    && bot.ctx().input.is_empty()
                {
                    bot.request_stop();
                    return Ok(true);
                }
                if bot.brain().ticks() >= max_ticks {
                    bot.request_stop();
                    return Ok(false);
                }
                thread::sleep(poll.max(Duration::from_millis(1)));
            }
            Ok(false)
        });
        let outcome = bot.run();
        let satisfied = watcher
            .join()
            .map_err(|_| anyhow::anyhow!("simulation watcher panicked"))??;
        outcome?;
        Ok(satisfied)
    })?;

    let report = SimulationReport {
        status: if satisfied { "satisfied" } else { "incomplete" },
        ticks: bot.brain().ticks(),
        bank_actions: world.actions(),
        inventory: world.inventory().into_iter().collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize report")?
    );
    Ok(if satisfied {
        exit_codes::OK
    } else {
        exit_codes::INCOMPLETE
    })
}

/// World holding `inventory`, with the manifest plus `bank` extras in the bank.
fn seed_world(
    manifest: &Manifest,
    inventory: &[(String, u64)],
    bank: &[(String, u64)],
    seed: u64,
    failure_rate: f64,
) -> SimWorld {
    let known: BTreeMap<&str, Material> = manifest
        .items
        .iter()
        .map(|item| (item.name.as_str(), item.material()))
        .collect();
    let material = |name: &str| {
        known
            .get(name)
            .cloned()
            .unwrap_or_else(|| Material::new(name))
    };

    let world = SimWorld::new(seed, failure_rate);
    for item in &manifest.items {
        world.stock_bank(item.material(), u64::from(item.quantity));
    }
    for (name, quantity) in bank {
        world.stock_bank(material(name), *quantity);
    }
    for (name, quantity) in inventory {
        world.stock_inventory(material(name), *quantity);
    }
    world
}

fn parse_stock(raw: &str) -> Result<(String, u64), String> {
    let (name, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=QTY, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing item name in '{raw}'"));
    }
    let quantity = quantity
        .trim()
        .parse::<u64>()
        .map_err(|err| format!("bad quantity in '{raw}': {err}"))?;
    Ok((name.to_string(), quantity))
}

fn parse_rate(raw: &str) -> Result<f64, String> {
    let rate: f64 = raw.parse().map_err(|err| format!("bad rate '{raw}': {err}"))?;
    if !(0.0..1.0).contains(&rate) {
        return Err(format!("rate must be in [0, 1), got {rate}"));
    }
    Ok(rate)
}
