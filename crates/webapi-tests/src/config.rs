//! Suite configuration loaded from YAML.
//!
//! ```yaml
//! marionette:
//!   host: localhost
//!   port: 2828
//! environment:
//!   port: 6666
//! wait:
//!   timeout_ms: 30000
//!   poll_interval_ms: 500
//! flag_namespace: window.wrappedJSObject
//! prompt_timeout_ms: 300000
//! ```
//!
//! Every key is optional.

use crate::marionette::MarionetteConfig;
use crate::result::{WebApiError, WebApiResult};
use crate::semiauto::EnvironmentConfig;
use crate::signal::FlagNamespace;
use crate::wait::WaitOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level suite settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteConfig {
    /// Remote session connection
    pub marionette: MarionetteConfig,
    /// Coordination server
    pub environment: EnvironmentConfig,
    /// Budget for remote signals
    pub wait: WaitOptions,
    /// Object holding the remote flag set
    pub flag_namespace: FlagNamespace,
    /// Deadline for operator answers; unset waits forever
    pub prompt_timeout_ms: Option<u64>,
}

impl SuiteConfig {
    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> WebApiResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> WebApiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            WebApiError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> WebApiResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> WebApiResult<()> {
        self.wait
            .validate()
            .map_err(|e| WebApiError::config(format!("wait: {e}")))?;
        if self.flag_namespace.as_str().trim().is_empty() {
            return Err(WebApiError::config("flag_namespace must not be empty"));
        }
        if self.marionette.host.trim().is_empty() {
            return Err(WebApiError::config("marionette.host must not be empty"));
        }
        Ok(())
    }

    /// Operator answer deadline
    #[must_use]
    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = SuiteConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, SuiteConfig::default());
        assert_eq!(config.marionette.port, 2828);
        assert_eq!(config.environment.port, 6666);
        assert_eq!(config.wait.timeout_ms, 30_000);
        assert_eq!(config.flag_namespace.as_str(), "window.wrappedJSObject");
        assert!(config.prompt_timeout().is_none());
    }

    #[test]
    fn test_partial_override() {
        let config = SuiteConfig::from_yaml_str(
            "marionette:\n  port: 2929\nwait:\n  poll_interval_ms: 100\nprompt_timeout_ms: 60000\n",
        )
        .unwrap();
        assert_eq!(config.marionette.port, 2929);
        assert_eq!(config.marionette.host, "localhost");
        assert_eq!(config.wait.poll_interval_ms, 100);
        assert_eq!(config.wait.timeout_ms, 30_000);
        assert_eq!(config.prompt_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = SuiteConfig::from_yaml_str("wait:\n  poll_interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, WebApiError::Config { .. }));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SuiteConfig::from_yaml_str("marionete: {}\n").unwrap_err();
        assert!(matches!(err, WebApiError::Yaml(_)));
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let err = SuiteConfig::from_yaml_str("flag_namespace: ' '\n").unwrap_err();
        assert!(err.to_string().contains("flag_namespace"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "environment:\n  host: 0.0.0.0\n  cors: true").unwrap();
        let config = SuiteConfig::from_file(file.path()).unwrap();
        assert_eq!(config.environment.host, "0.0.0.0");
        assert!(config.environment.cors);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SuiteConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn test_yaml_round_trip_preserves_values() {
        let mut config = SuiteConfig::default();
        config.environment.port = 7777;
        config.prompt_timeout_ms = Some(5_000);
        let yaml = config.to_yaml().unwrap();
        assert_eq!(SuiteConfig::from_yaml_str(&yaml).unwrap(), config);
    }
}
