//! `swak config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use swak_core::config::SwakConfig;
use swak_core::error::{ConfigError, SwakError};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Source label used when no configuration file is given.
pub const DEFAULTS_SOURCE: &str = "<defaults>";

/// Load the effective configuration.
///
/// With a path: file, then env overrides, then validation.
/// Without one: built-in defaults, then env overrides, then validation.
pub async fn load(config_path: Option<&Path>) -> Result<SwakConfig, SwakError> {
    match config_path {
        Some(path) => SwakConfig::load(path).await,
        None => {
            let mut config = SwakConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

fn source(config_path: Option<&Path>) -> String {
    config_path.map_or_else(|| DEFAULTS_SOURCE.to_owned(), |p| p.display().to_string())
}

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load and validate the configuration, reporting any errors.
///
/// Buffer bounds are checked by building a buffer configuration from the
/// `[buffer]` section. A missing bound is only a warning since `buf.memory`
/// may supply it as an argument.
async fn execute_validate(config_path: Option<&Path>, writer: &OutputWriter) -> Result<(), CliError> {
    info!(source = %source(config_path), "validating configuration");

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    match load(config_path).await {
        Ok(config) => match swak_pipeline::BufferConfig::from_section(&config.buffer) {
            Ok(_) => {}
            Err(e @ ConfigError::MissingBound { .. }) => warnings.push(format!("[buffer] {e}")),
            Err(e) => errors.push(format!("[buffer] {e}")),
        },
        Err(e) => errors.push(e.to_string()),
    }

    let report = ConfigValidationReport {
        source: source(config_path),
        valid: errors.is_empty(),
        errors,
        warnings,
    };
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Display the effective configuration (file + env overrides + defaults).
async fn execute_show(
    config_path: Option<&Path>,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(source = %source(config_path), "loading configuration");

    let config = load(config_path).await?;
    let report = show_report(&config, source(config_path), section)?;
    writer.render(&report)?;
    Ok(())
}

/// Build the report for `config show`, optionally narrowed to one section.
pub fn show_report(
    config: &SwakConfig,
    source: String,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    let config_toml = match section.as_deref() {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("pipeline") => toml::to_string_pretty(&config.pipeline),
        Some("buffer") => toml::to_string_pretty(&config.buffer),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, pipeline, buffer)"
            )));
        }
    }
    .unwrap_or_else(|e| format!("(serialization error: {e})"));

    Ok(ConfigReport {
        source,
        section,
        config_toml,
    })
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path or `<defaults>`
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        for warning in &self.warnings {
            writeln!(w, "  Warning: {}", warning.yellow())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(report: &impl Render) -> String {
        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn test_show_report_full_config() {
        let report = show_report(&SwakConfig::default(), "swak.toml".to_owned(), None)
            .expect("full config should render");
        assert!(report.section.is_none());
        assert!(report.config_toml.contains("[general]"));
        assert!(report.config_toml.contains("[pipeline]"));

        let output = render(&report);
        assert!(output.contains("Configuration"));
        assert!(output.contains("swak.toml"));
    }

    #[test]
    fn test_show_report_single_section() {
        let report = show_report(
            &SwakConfig::default(),
            DEFAULTS_SOURCE.to_owned(),
            Some("pipeline".to_owned()),
        )
        .expect("pipeline section should render");
        assert!(report.config_toml.contains("tag = \"swak.test\""));
        assert!(!report.config_toml.contains("log_level"));
        assert!(render(&report).contains("[pipeline]"));
    }

    #[test]
    fn test_show_report_unknown_section() {
        let err = show_report(&SwakConfig::default(), "x".to_owned(), Some("ebpf".to_owned()))
            .err()
            .expect("unknown section should fail");
        assert!(err.to_string().contains("unknown section: ebpf"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_config_report_json_skips_toml() {
        let report = ConfigReport {
            source: "test.toml".to_owned(),
            section: Some("buffer".to_owned()),
            config_toml: "standalone = false".to_owned(),
        };

        let json = serde_json::to_string(&report).expect("JSON serialization should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse JSON");

        assert_eq!(parsed["source"].as_str(), Some("test.toml"));
        assert_eq!(parsed["section"].as_str(), Some("buffer"));
        assert!(parsed.get("config_toml").is_none());
    }

    #[test]
    fn test_config_validation_report_valid() {
        let report = ConfigValidationReport {
            source: "swak.toml".to_owned(),
            valid: true,
            errors: Vec::new(),
            warnings: vec!["[buffer] missing bound".to_owned()],
        };
        let output = render(&report);
        assert!(output.contains("VALID"));
        assert!(!output.contains("Error:"));
        assert!(output.contains("Warning:"));
    }

    #[test]
    fn test_config_validation_report_lists_errors() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec![
                "[buffer] missing bound".to_owned(),
                "invalid log level".to_owned(),
            ],
            warnings: Vec::new(),
        };
        let output = render(&report);
        assert!(output.contains("INVALID"));
        assert!(output.contains("missing bound"));
        assert!(output.contains("invalid log level"));
    }
}
