//! `swak validate` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use swak_core::config::SwakConfig;
use swak_core::error::SwakError;
use swak_pipeline::{PluginRegistry, StageSequence, build_pipeline};

use crate::cli::PipelineArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `validate` command.
///
/// The report is rendered for both outcomes. On failure the underlying error
/// is returned so the exit code reflects its kind.
pub fn execute(args: PipelineArgs, config: &SwakConfig, writer: &OutputWriter) -> Result<(), CliError> {
    info!(command = %args.command, "validating pipeline");

    let registry = PluginRegistry::with_builtins(&config.buffer);
    let result = build_pipeline(&args.command, &registry);
    let report = PipelineValidationReport::new(&args.command, &result);
    writer.render(&report)?;
    result.map(|_| ()).map_err(CliError::from)
}

#[derive(Serialize)]
pub struct PipelineValidationReport {
    pub command: String,
    pub valid: bool,
    pub stages: Vec<StageEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct StageEntry {
    pub position: usize,
    pub name: String,
    pub kind: String,
    pub args: Vec<String>,
}

impl PipelineValidationReport {
    pub fn new(command: &str, result: &Result<StageSequence, SwakError>) -> Self {
        match result {
            Ok(sequence) => Self {
                command: command.to_owned(),
                valid: true,
                stages: sequence
                    .tokens()
                    .iter()
                    .zip(sequence.kinds())
                    .enumerate()
                    .map(|(position, (token, kind))| StageEntry {
                        position,
                        name: token.name.clone(),
                        kind: kind.to_string(),
                        args: token.args.clone(),
                    })
                    .collect(),
                error: None,
            },
            Err(e) => Self {
                command: command.to_owned(),
                valid: false,
                stages: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

impl Render for PipelineValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Pipeline Validation: {}", self.command.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            for s in &self.stages {
                writeln!(w, "  [{}] {:<12} {} {}", s.position, s.kind, s.name, s.args.join(" "))?;
            }
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            if let Some(ref error) = self.error {
                writeln!(w, "  Error: {}", error.red())?;
            }
        }
        Ok(())
    }
}
