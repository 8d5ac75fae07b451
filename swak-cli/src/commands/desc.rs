//! `swak desc` command handler

use std::io::Write;

use serde::Serialize;

use swak_core::config::SwakConfig;
use swak_pipeline::PluginRegistry;

use crate::cli::DescArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `desc` command.
pub fn execute(args: DescArgs, config: &SwakConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let registry = PluginRegistry::with_builtins(&config.buffer);
    let report = build_report(&registry, &args.name)?;
    writer.render(&report)
}

pub fn build_report(registry: &PluginRegistry, name: &str) -> Result<PluginDescReport, CliError> {
    let (info, help) = registry
        .describe(name)
        .map_err(swak_core::error::SwakError::from)?;
    Ok(PluginDescReport {
        name: info.name,
        kind: info.kind.to_string(),
        description: info.description,
        help,
    })
}

#[derive(Serialize)]
pub struct PluginDescReport {
    pub name: String,
    pub kind: String,
    pub description: String,
    /// Rendered argument help
    pub help: String,
}

impl Render for PluginDescReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{} ({})", self.name.bold(), self.kind)?;
        writeln!(w)?;
        write!(w, "{}", self.help)?;
        if !self.help.ends_with('\n') {
            writeln!(w)?;
        }
        Ok(())
    }
}
