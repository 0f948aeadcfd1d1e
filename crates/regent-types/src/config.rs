//! Console configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working local console with the remote console disabled.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RegentError, Result};

/// Default prompt label.
pub const DEFAULT_PROMPT: &str = "Regent";

/// Default number of retained history lines.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Default number of retained scrollback lines.
pub const DEFAULT_SCROLLBACK_LINES: usize = 1000;

/// Default idle time before a remote session expires (seconds).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Which front-end drives the console thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frontend {
    /// Terminal-attached line editor.
    #[default]
    Local,
    /// Remote sessions only; the terminal just mirrors output.
    Remote,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegentConfig {
    pub console: ConsoleConfig,
    pub remote: RemoteConfig,
    /// Names of execution contexts to create at startup.
    pub contexts: Vec<String>,
}

/// `[console]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Prompt label, rendered as `<prompt> (<context>) # `.
    pub prompt: String,
    /// Match command keys case-sensitively.
    pub case_sensitive: bool,
    /// Lines kept in the local history ring.
    pub history_size: usize,
    pub frontend: Frontend,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            case_sensitive: false,
            history_size: DEFAULT_HISTORY_SIZE,
            frontend: Frontend::Local,
        }
    }
}

/// `[remote]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Address the transport binds to.
    pub bind: String,
    pub port: u16,
    /// Operator user name. Empty disables the remote console.
    pub user: String,
    /// Operator password. Empty disables the remote console.
    pub password: String,
    /// Idle time before a session is swept.
    pub idle_timeout_secs: u64,
    /// Lines retained in the shared scrollback.
    pub scrollback_lines: usize,
    /// Maximum simultaneous sessions.
    pub max_sessions: usize,
    /// Maximum simultaneous transport connections.
    pub max_connections: usize,
    /// Idle time before a transport connection is closed (0 = never).
    pub connection_timeout_secs: u64,
    /// Upper bound on a single long-poll wait.
    pub max_long_poll_ms: u64,
    /// Mirror remote console output to stdout.
    pub echo_to_stdout: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 9000,
            user: String::new(),
            password: String::new(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            max_sessions: 16,
            max_connections: 8,
            connection_timeout_secs: 600,
            max_long_poll_ms: 30_000,
            echo_to_stdout: true,
        }
    }
}

/// Configured operator credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl RemoteConfig {
    /// Credentials, or `None` when either half is missing.
    pub fn credentials(&self) -> Option<Credentials> {
        if self.user.is_empty() || self.password.is_empty() {
            return None;
        }
        Some(Credentials {
            user: self.user.clone(),
            password: self.password.clone(),
        })
    }

    /// The remote console only runs with credentials configured.
    pub fn is_enabled(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_long_poll(&self) -> Duration {
        Duration::from_millis(self.max_long_poll_ms)
    }
}

impl RegentConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RegentConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RegentError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.console.history_size == 0 {
            return Err(RegentError::Config(
                "console.history_size must be at least 1".to_string(),
            ));
        }
        if self.remote.scrollback_lines == 0 {
            return Err(RegentError::Config(
                "remote.scrollback_lines must be at least 1".to_string(),
            ));
        }
        if self.remote.max_sessions == 0 || self.remote.max_connections == 0 {
            return Err(RegentError::Config(
                "remote.max_sessions and remote.max_connections must be at least 1".to_string(),
            ));
        }
        if self.remote.idle_timeout_secs == 0 {
            return Err(RegentError::Config(
                "remote.idle_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.remote.max_long_poll() >= self.remote.idle_timeout() {
            return Err(RegentError::Config(
                "remote.max_long_poll_ms must be shorter than remote.idle_timeout_secs".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = RegentConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.console.prompt, DEFAULT_PROMPT);
        assert_eq!(cfg.console.history_size, DEFAULT_HISTORY_SIZE);
        assert!(!cfg.console.case_sensitive);
        assert_eq!(cfg.console.frontend, Frontend::Local);
        assert_eq!(cfg.remote.scrollback_lines, DEFAULT_SCROLLBACK_LINES);
        assert_eq!(cfg.remote.port, 9000);
        assert!(cfg.contexts.is_empty());
    }

    #[test]
    fn remote_disabled_without_credentials() {
        let cfg = RegentConfig::from_toml_str("[remote]\nuser = \"admin\"\n").unwrap();
        assert!(!cfg.remote.is_enabled());
        assert!(cfg.remote.credentials().is_none());
    }

    #[test]
    fn remote_enabled_with_credentials() {
        let toml = r#"
[remote]
user = "admin"
password = "hunter2"
idle_timeout_secs = 60
"#;
        let cfg = RegentConfig::from_toml_str(toml).unwrap();
        assert!(cfg.remote.is_enabled());
        let creds = cfg.remote.credentials().unwrap();
        assert_eq!(creds.user, "admin");
        assert_eq!(creds.password, "hunter2");
        assert_eq!(cfg.remote.idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn parses_console_section_and_contexts() {
        let toml = r#"
contexts = ["alpha", "beta"]

[console]
prompt = "Sim"
case_sensitive = true
history_size = 10
frontend = "remote"
"#;
        let cfg = RegentConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.console.prompt, "Sim");
        assert!(cfg.console.case_sensitive);
        assert_eq!(cfg.console.history_size, 10);
        assert_eq!(cfg.console.frontend, Frontend::Remote);
        assert_eq!(cfg.contexts, vec!["alpha", "beta"]);
    }

    #[test]
    fn rejects_zero_capacities() {
        assert!(RegentConfig::from_toml_str("[console]\nhistory_size = 0\n").is_err());
        assert!(RegentConfig::from_toml_str("[remote]\nscrollback_lines = 0\n").is_err());
        assert!(RegentConfig::from_toml_str("[remote]\nmax_sessions = 0\n").is_err());
    }

    #[test]
    fn long_poll_must_fit_inside_idle_timeout() {
        let toml = "[remote]\nidle_timeout_secs = 1\nmax_long_poll_ms = 3000\n";
        assert!(matches!(
            RegentConfig::from_toml_str(toml),
            Err(RegentError::Config(_))
        ));
        let toml = "[remote]\nidle_timeout_secs = 1\nmax_long_poll_ms = 1000\n";
        assert!(RegentConfig::from_toml_str(toml).is_err());
        let toml = "[remote]\nidle_timeout_secs = 1\nmax_long_poll_ms = 999\n";
        assert!(RegentConfig::from_toml_str(toml).is_ok());
    }

    #[test]
    fn rejects_unknown_frontend() {
        let result = RegentConfig::from_toml_str("[console]\nfrontend = \"web\"\n");
        assert!(matches!(result, Err(RegentError::TomlParse(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[remote]\nport = 9100").unwrap();
        let cfg = RegentConfig::load(file.path()).unwrap();
        assert_eq!(cfg.remote.port, 9100);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let result = RegentConfig::load(Path::new("/nonexistent/regent.toml"));
        assert!(matches!(result, Err(RegentError::Config(_))));
    }
}
