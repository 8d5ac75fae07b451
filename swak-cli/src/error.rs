//! CLI-specific error types and exit code mapping

use swak_core::error::SwakError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// The pipeline could not be assembled or validated.
    #[error("invalid pipeline: {0}")]
    Pipeline(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from swak-core.
    #[error("{0}")]
    Core(#[from] SwakError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / command / runtime error     |
    /// | 2    | Configuration error                   |
    /// | 3    | Pipeline shape or plugin resolution   |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Pipeline(_) => 3,
            Self::Io(_) => 10,
            Self::Core(e) => match e {
                SwakError::Config(_) => 2,
                SwakError::Shape(_) | SwakError::Plugin(_) => 3,
                SwakError::Io(_) => 10,
                _ => 1,
            },
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swak_core::error::{ConfigError, DeliveryError, PipelineShapeError, PluginError};
    use swak_core::plugin::StageKind;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_pipeline_error() {
        let err = CliError::Pipeline("bad shape".to_owned());
        assert_eq!(err.exit_code(), 3, "pipeline error should return exit code 3");
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1, "command error should return exit code 1");
    }

    #[test]
    fn test_exit_code_follows_core_error_kind() {
        let config: CliError = SwakError::Config(ConfigError::FileNotFound {
            path: "swak.toml".to_owned(),
        })
        .into();
        assert_eq!(config.exit_code(), 2);

        let shape: CliError = SwakError::Shape(PipelineShapeError {
            position: 1,
            previous: Some(StageKind::RecordInput),
            current: Some(StageKind::RecordInput),
            reason: "input must be first".to_owned(),
        })
        .into();
        assert_eq!(shape.exit_code(), 3);

        let plugin: CliError = SwakError::Plugin(PluginError::NotFound {
            name: "in.nothing".to_owned(),
        })
        .into();
        assert_eq!(plugin.exit_code(), 3);

        let io: CliError =
            SwakError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).into();
        assert_eq!(io.exit_code(), 10);

        let delivery: CliError = SwakError::Delivery(DeliveryError {
            stage: "out.file".to_owned(),
            reason: "disk full".to_owned(),
        })
        .into();
        assert_eq!(delivery.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_json_serialize_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json")
            .expect_err("should fail parsing");
        let err = CliError::JsonSerialize(json_err);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_error_display_config() {
        let err = CliError::Config("invalid TOML syntax".to_owned());
        let display_str = format!("{}", err);
        assert!(display_str.contains("configuration error"));
        assert!(display_str.contains("invalid TOML syntax"));
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(format!("{}", err), "execution failed");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let cli_err: CliError = io_err.into();
        match cli_err {
            CliError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            _ => panic!("expected Io error variant"),
        }
    }
}
