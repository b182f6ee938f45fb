//! Declare command - load task declarations from a file
//!
//! The file holds a `tasks:` list. Each entry is a task declaration whose
//! targets may be given as asset hostnames (`hosts`) and node values
//! (`groups`) as well as ids.

use super::{resolve_hostnames, resolve_node_values, CommandContext, Runnable};
use anyhow::{Context, Result};
use bastion_ops::assets::AssetDirectory;
use bastion_ops::tasks::TaskDeclaration;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Arguments for the declare command
#[derive(Parser, Debug, Clone)]
pub struct DeclareArgs {
    /// YAML file with a `tasks:` list
    #[arg(required = true)]
    pub file: PathBuf,

    /// Recorded as the creator of new tasks and versions
    #[arg(long, env = "USER")]
    pub created_by: Option<String>,
}

/// On-disk declaration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeclarationFile {
    #[serde(default)]
    pub tasks: Vec<DeclarationEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeclarationEntry {
    #[serde(flatten)]
    pub declaration: TaskDeclaration,

    /// Asset hostnames added to `assets`
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Node values added to `nodes`
    #[serde(default)]
    pub groups: Vec<String>,
}

impl DeclarationEntry {
    /// Resolve names to ids, producing the final declaration.
    pub fn resolve(mut self, directory: &dyn AssetDirectory) -> Result<TaskDeclaration> {
        let name = self.declaration.name.clone();
        let assets = resolve_hostnames(directory, &self.hosts)
            .with_context(|| format!("Task '{}'", name))?;
        let nodes = resolve_node_values(directory, &self.groups)
            .with_context(|| format!("Task '{}'", name))?;
        for id in assets {
            if !self.declaration.assets.contains(&id) {
                self.declaration.assets.push(id);
            }
        }
        for id in nodes {
            if !self.declaration.nodes.contains(&id) {
                self.declaration.nodes.push(id);
            }
        }
        Ok(self.declaration)
    }
}

impl DeclarationFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(file)
    }
}

#[async_trait::async_trait]
impl Runnable for DeclareArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let file = DeclarationFile::load(&self.file)?;
        let directory = ctx.directory()?;
        let store = ctx.store()?;

        ctx.output.banner("DECLARE");
        let mut rows = Vec::new();
        let mut report = Vec::new();
        for entry in file.tasks {
            let mut declaration = entry.resolve(directory.as_ref())?;
            if declaration.created_by.is_none() {
                declaration.created_by = self.created_by.clone();
            }
            let (task, created) = declaration.ensure(&store)?;
            let version = store.latest_content(task.id).map(|c| c.version).unwrap_or(0);
            rows.push(vec![
                task.name.clone(),
                format!("v{}", version),
                if created { "changed" } else { "unchanged" }.to_string(),
            ]);
            report.push(serde_json::json!({
                "task": task.name,
                "id": task.id,
                "version": version,
                "created": created,
            }));
        }

        if ctx.output.is_json() {
            ctx.output.json(&report)?;
        } else if rows.is_empty() {
            ctx.output.warning("No tasks in declaration file");
        } else {
            ctx.output.table(&["TASK", "VERSION", "STATE"], &rows);
        }
        Ok(0)
    }
}
