//! `swak list` command handler

use std::io::Write;

use serde::Serialize;

use swak_core::config::SwakConfig;
use swak_core::plugin::PREFIXES;
use swak_pipeline::{PluginInfo, PluginRegistry};

use crate::cli::ListArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list` command.
pub fn execute(args: ListArgs, config: &SwakConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let registry = PluginRegistry::with_builtins(&config.buffer);
    let report = build_report(&registry, args.prefix.as_deref())?;
    writer.render(&report)
}

/// Collect registered plugins, optionally narrowed to one name prefix.
pub fn build_report(registry: &PluginRegistry, prefix: Option<&str>) -> Result<PluginListReport, CliError> {
    if let Some(prefix) = prefix {
        if !PREFIXES.contains(&prefix) {
            return Err(CliError::Command(format!(
                "unknown prefix: {prefix} (expected one of: {})",
                PREFIXES.join(", ")
            )));
        }
    }

    let plugins: Vec<PluginInfo> = registry
        .list()
        .into_iter()
        .filter(|info| prefix.is_none_or(|p| info.kind.prefix() == p))
        .cloned()
        .collect();

    Ok(PluginListReport {
        total: plugins.len(),
        plugins,
    })
}

#[derive(Serialize)]
pub struct PluginListReport {
    pub total: usize,
    pub plugins: Vec<PluginInfo>,
}

impl Render for PluginListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Plugins ({} total)", self.total.to_string().bold())?;
        writeln!(w)?;
        writeln!(w, "{:<14} {:<12} Description", "Name", "Kind")?;
        writeln!(w, "{}", "-".repeat(60))?;

        for p in &self.plugins {
            writeln!(
                w,
                "{:<14} {:<12} {}",
                p.name.cyan(),
                p.kind.to_string(),
                p.description
            )?;
        }

        Ok(())
    }
}
