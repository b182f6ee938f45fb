//! Inventory command - show what a target selection resolves to
//!
//! Prints the hosts and groups of the inventory built for a declaration
//! file, a stored task or an explicit host/node selection, optionally
//! narrowed by a host pattern.

use super::declare::DeclarationFile;
use super::{CommandContext, Runnable, TargetArgs};
use anyhow::{bail, Context, Result};
use bastion_ops::assets::AssetDirectory;
use bastion_ops::inventory::Inventory;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

/// Arguments for the inventory command
#[derive(Parser, Debug, Clone)]
pub struct InventoryArgs {
    /// Declaration file; the inventory of its first (or `--name`d) task is shown
    #[arg(conflicts_with_all = ["task", "hosts", "nodes"])]
    pub file: Option<PathBuf>,

    /// Task to pick from the declaration file
    #[arg(long, requires = "file")]
    pub name: Option<String>,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Only show hosts matching this pattern
    #[arg(long, short = 'p')]
    pub pattern: Option<String>,

    /// Dump the full inventory document (hostvars included)
    #[arg(long)]
    pub list: bool,

    /// Do not mask passwords in the dump
    #[arg(long)]
    pub show_secrets: bool,
}

/// Replace password-like values in a hostvars document.
fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if key.contains("pass") && inner.is_string() {
                    *inner = Value::String("********".to_string());
                } else {
                    mask_secrets(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

impl InventoryArgs {
    fn build(&self, ctx: &CommandContext, directory: &dyn AssetDirectory) -> Result<Inventory> {
        let Some(path) = &self.file else {
            return self.targets.inventory(ctx, directory);
        };

        let file = DeclarationFile::load(path)?;
        let entry = match &self.name {
            Some(name) => file
                .tasks
                .into_iter()
                .find(|e| &e.declaration.name == name)
                .with_context(|| format!("No task '{}' in {}", name, path.display()))?,
            None => match file.tasks.into_iter().next() {
                Some(entry) => entry,
                None => bail!("No tasks in {}", path.display()),
            },
        };
        let declaration = entry.resolve(directory)?;
        Ok(declaration.inventory(directory)?)
    }
}

#[async_trait::async_trait]
impl Runnable for InventoryArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let directory = ctx.directory()?;
        let inventory = self.build(ctx, directory.as_ref())?;

        if self.list || self.file.is_some() {
            let mut document = inventory.to_json();
            if !self.show_secrets {
                mask_secrets(&mut document);
            }
            ctx.output.json(&document)?;
            return Ok(0);
        }

        let pattern = self.pattern.as_deref().unwrap_or("all");
        let hosts = inventory.get_hosts_for_pattern(pattern)?;

        if ctx.output.is_json() {
            let names: Vec<&str> = hosts.iter().map(|h| h.name.as_str()).collect();
            ctx.output.json(&names)?;
            return Ok(0);
        }

        ctx.output.section(&format!("HOSTS [{}] ({})", pattern, hosts.len()));
        let rows: Vec<Vec<String>> = hosts
            .iter()
            .map(|host| {
                vec![
                    host.name.clone(),
                    format!("{}:{}", host.address, host.port),
                    host.user().unwrap_or_default(),
                    host.groups.iter().cloned().collect::<Vec<_>>().join(","),
                ]
            })
            .collect();
        ctx.output.table(&["HOST", "ADDRESS", "USER", "GROUPS"], &rows);
        if hosts.is_empty() {
            ctx.output.hint("The pattern matched no hosts");
        }
        Ok(0)
    }
}
