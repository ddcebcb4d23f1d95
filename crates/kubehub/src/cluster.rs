//! Cluster bootstrap: client, operator namespace, secrets, watch scope.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use tracing::{debug, info};

pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Client from kubeconfig or in-cluster service account.
pub async fn connect() -> Result<Client> {
    let client = Client::try_default().await.context("creating kube client")?;
    info!(namespace = %client.default_namespace(), "kube client ready");
    Ok(client)
}

/// `OPERATOR_NAMESPACE` wins; otherwise the service-account namespace file.
pub fn operator_namespace(env_value: Option<&str>, sa_file: &Path) -> Result<String> {
    if let Some(ns) = env_value.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(ns.to_string());
    }
    let raw = std::fs::read_to_string(sa_file)
        .with_context(|| format!("OPERATOR_NAMESPACE unset and {} unreadable", sa_file.display()))?;
    let ns = raw.trim();
    if ns.is_empty() {
        return Err(anyhow!("{} is empty", sa_file.display()));
    }
    Ok(ns.to_string())
}

/// Read `key` from Secret `namespace/name`, checking `data` then `stringData`.
pub async fn load_secret_value(client: Client, namespace: &str, name: &str, key: &str) -> Result<String> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let secret = api.get(name).await.with_context(|| format!("reading secret {}/{}", namespace, name))?;
    let value = secret_value(&secret, key).ok_or_else(|| anyhow!("secret {}/{} has no key {}", namespace, name, key))?;
    debug!(namespace, name, key, "secret value loaded");
    Ok(value)
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    let from_data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(|b| String::from_utf8(b.0.clone()).ok());
    from_data
        .or_else(|| secret.string_data.as_ref().and_then(|d| d.get(key)).cloned())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Which namespaces the controller watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchScope {
    All,
    Namespaces(Vec<String>),
}

impl WatchScope {
    /// Empty or unset means all namespaces; otherwise a comma-separated list.
    pub fn parse(value: Option<&str>) -> Self {
        let mut namespaces: Vec<String> = value
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        namespaces.sort();
        namespaces.dedup();
        if namespaces.is_empty() {
            Self::All
        } else {
            Self::Namespaces(namespaces)
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Namespaces(ns) => ns.join(","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn watch_scope_parsing() {
        assert_eq!(WatchScope::parse(None), WatchScope::All);
        assert_eq!(WatchScope::parse(Some("  ")), WatchScope::All);
        assert_eq!(WatchScope::parse(Some("team")), WatchScope::Namespaces(vec!["team".into()]));
        assert_eq!(
            WatchScope::parse(Some("b, a,,b")),
            WatchScope::Namespaces(vec!["a".into(), "b".into()])
        );
        assert_eq!(WatchScope::parse(Some("b,a")).describe(), "a,b");
    }

    #[test]
    fn namespace_prefers_env() {
        let missing = Path::new("/nonexistent/huddle/namespace");
        assert_eq!(operator_namespace(Some("ops"), missing).unwrap(), "ops");
        assert!(operator_namespace(None, missing).is_err());
        assert!(operator_namespace(Some(" "), missing).is_err());
    }

    #[test]
    fn namespace_falls_back_to_file() {
        let path = std::env::temp_dir().join(format!("huddle-ns-{}", std::process::id()));
        std::fs::write(&path, "slack-operator\n").unwrap();
        assert_eq!(operator_namespace(None, &path).unwrap(), "slack-operator");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn secret_reads_data_then_string_data() {
        let mut s = Secret::default();
        s.data = Some(BTreeMap::from([("APIToken".to_string(), ByteString(b"xoxb-1\n".to_vec()))]));
        assert_eq!(secret_value(&s, "APIToken").as_deref(), Some("xoxb-1"));
        assert_eq!(secret_value(&s, "Other"), None);

        let mut s = Secret::default();
        s.string_data = Some(BTreeMap::from([("APIToken".to_string(), "xoxb-2".to_string())]));
        assert_eq!(secret_value(&s, "APIToken").as_deref(), Some("xoxb-2"));
    }
}
