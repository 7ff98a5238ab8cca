use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarborError {
    #[error("Invalid domain name: {0}. Use only lowercase letters, numbers and hyphens (-), max 63 characters per label")]
    InvalidDomain(String),

    #[error("Invalid proxy target: {0}. Use \"localhost:3000\" or \"http://localhost:3000\"")]
    InvalidProxyTarget(String),

    #[error("Invalid TLD: {0}. Must be 2-63 letters (e.g. test, dev or local)")]
    InvalidTld(String),

    #[error("No {kind} found for: {host}")]
    NotFound { kind: String, host: String },

    #[error("A site named {0} already exists")]
    SiteExists(String),

    #[error("PHP {0} is not installed")]
    NotInstalled(String),

    #[error("Port {port} is already in use by {process}")]
    PortConflict { port: u16, process: String },

    #[error("Command failed (exit {}): {command}{}", format_exit(.exit_code), format_diagnostics(.diagnostics))]
    ExternalCommandFailed {
        command: String,
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("Privilege escalation failed for: {command}{}", format_diagnostics(.diagnostics))]
    PrivilegeEscalationFailed { command: String, diagnostics: String },

    #[error("Harbor is not installed. Please run `harbor install` first")]
    NotInitialized,

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarborError {
    pub fn not_found(kind: impl Into<String>, host: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            host: host.into(),
        }
    }

    /// Validation errors are raised before anything is persisted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDomain(_)
                | Self::InvalidProxyTarget(_)
                | Self::InvalidTld(_)
                | Self::NotFound { .. }
                | Self::SiteExists(_)
                | Self::NotInstalled(_)
        )
    }
}

fn format_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

fn format_diagnostics(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

pub type Result<T> = std::result::Result<T, HarborError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_failure_includes_diagnostics() {
        let err = HarborError::ExternalCommandFailed {
            command: "brew services restart caddy".into(),
            exit_code: Some(1),
            diagnostics: "  Error: Permission denied\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Command failed (exit 1): brew services restart caddy"));
        assert!(msg.ends_with("\nError: Permission denied"));
    }

    #[test]
    fn killed_command_reports_signal() {
        let err = HarborError::ExternalCommandFailed {
            command: "pfctl -e".into(),
            exit_code: None,
            diagnostics: String::new(),
        };
        assert_eq!(err.to_string(), "Command failed (exit signal): pfctl -e");
    }

    #[test]
    fn validation_classification() {
        assert!(HarborError::InvalidDomain("a..b".into()).is_validation());
        assert!(HarborError::not_found("link", "app.test").is_validation());
        assert!(!HarborError::NotInitialized.is_validation());
    }
}
