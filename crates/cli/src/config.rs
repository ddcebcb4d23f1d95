//! Operator configuration: YAML file with defaults, then environment overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use huddle_api::CHANNEL_FINALIZER;
use huddle_controller::Settings;
use huddle_slack::{WebApiConfig, DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    pub slack: SlackConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlackConfig {
    /// Where the bot token lives when `SLACK_API_TOKEN` is unset.
    pub api_token: SecretKeyRef,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretKeyRef {
    pub secret_name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    pub error_requeue_secs: u64,
    pub conflict_requeue_secs: u64,
    pub concurrency: u16,
    pub finalizer: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self { api_token: SecretKeyRef::default(), base_url: DEFAULT_BASE_URL.to_string(), timeout_secs: 30 }
    }
}

impl Default for SecretKeyRef {
    fn default() -> Self {
        Self { secret_name: "slack-secret".to_string(), key: "APIToken".to_string() }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            error_requeue_secs: 15 * 60,
            conflict_requeue_secs: 5,
            concurrency: 4,
            finalizer: CHANNEL_FINALIZER.to_string(),
        }
    }
}

/// Environment values the operator honours.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub slack_api_token: Option<String>,
    pub config_secret_name: Option<String>,
    pub operator_namespace: Option<String>,
    pub error_requeue_secs: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            slack_api_token: get("SLACK_API_TOKEN"),
            config_secret_name: get("CONFIG_SECRET_NAME"),
            operator_namespace: get("OPERATOR_NAMESPACE"),
            error_requeue_secs: get("HUDDLE_ERROR_REQUEUE_SECS"),
        }
    }
}

impl OperatorConfig {
    /// Defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let raw = std::fs::read_to_string(p).with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml(&raw).with_context(|| format!("parsing config {}", p.display()))
            }
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env(&mut self, env: &EnvOverrides) -> Result<()> {
        if let Some(name) = &env.config_secret_name {
            self.slack.api_token.secret_name = name.clone();
        }
        if let Some(secs) = &env.error_requeue_secs {
            self.reconcile.error_requeue_secs =
                secs.parse().with_context(|| format!("HUDDLE_ERROR_REQUEUE_SECS={} is not a number of seconds", secs))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconcile.concurrency == 0 {
            bail!("reconcile.concurrency must be at least 1");
        }
        if self.slack.timeout_secs == 0 {
            bail!("slack.timeoutSecs must be at least 1");
        }
        if self.reconcile.finalizer.trim().is_empty() {
            bail!("reconcile.finalizer must not be empty");
        }
        if !self.slack.base_url.starts_with("http://") && !self.slack.base_url.starts_with("https://") {
            bail!("slack.baseUrl must be an http(s) URL, got {}", self.slack.base_url);
        }
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            finalizer: self.reconcile.finalizer.clone(),
            error_requeue: Duration::from_secs(self.reconcile.error_requeue_secs),
            conflict_requeue: Duration::from_secs(self.reconcile.conflict_requeue_secs),
        }
    }

    pub fn web_api(&self) -> WebApiConfig {
        WebApiConfig { base_url: self.slack.base_url.clone(), timeout: Duration::from_secs(self.slack.timeout_secs) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
slack:
  apiToken: { secretName: slack-secret, key: APIToken }
  baseUrl: https://slack.com/api
  timeoutSecs: 30
reconcile:
  errorRequeueSecs: 900
  conflictRequeueSecs: 5
  concurrency: 4
  finalizer: slack.huddle.io/channel
"#;

    #[test]
    fn documented_file_equals_defaults() {
        assert_eq!(OperatorConfig::from_yaml(FULL).unwrap(), OperatorConfig::default());
        assert_eq!(OperatorConfig::from_yaml("").unwrap(), OperatorConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg = OperatorConfig::from_yaml("reconcile:\n  concurrency: 8\n").unwrap();
        assert_eq!(cfg.reconcile.concurrency, 8);
        assert_eq!(cfg.reconcile.error_requeue_secs, 900);
        assert_eq!(cfg.slack.api_token.key, "APIToken");
        assert_eq!(cfg.settings().error_requeue, Duration::from_secs(900));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CONFIG_SECRET_NAME", "team-slack"),
            ("HUDDLE_ERROR_REQUEUE_SECS", "60"),
            ("SLACK_API_TOKEN", " xoxb-1 "),
            ("OPERATOR_NAMESPACE", ""),
        ]);
        let env = EnvOverrides::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(env.slack_api_token.as_deref(), Some("xoxb-1"));
        assert_eq!(env.operator_namespace, None);

        let mut cfg = OperatorConfig::default();
        cfg.apply_env(&env).unwrap();
        assert_eq!(cfg.slack.api_token.secret_name, "team-slack");
        assert_eq!(cfg.settings().error_requeue, Duration::from_secs(60));
    }

    #[test]
    fn bad_values_are_rejected() {
        let env = EnvOverrides { error_requeue_secs: Some("soon".into()), ..Default::default() };
        assert!(OperatorConfig::default().apply_env(&env).is_err());

        let cfg = OperatorConfig::from_yaml("reconcile:\n  concurrency: 0\n").unwrap();
        assert!(cfg.validate().is_err());
        let cfg = OperatorConfig::from_yaml("slack:\n  baseUrl: slack.com\n").unwrap();
        assert!(cfg.validate().is_err());
        assert!(OperatorConfig::default().validate().is_ok());
        assert!(OperatorConfig::from_yaml("reconcile: soon").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = OperatorConfig::load(Some(Path::new("/nonexistent/huddle.yaml"))).unwrap_err();
        assert!(err.to_string().contains("reading config"));
        assert_eq!(OperatorConfig::load(None).unwrap(), OperatorConfig::default());
    }
}
