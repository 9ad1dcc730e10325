use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

const SETTINGS_FILE: &str = "gateway.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub upload_module_url: String,
    pub create_instance_url: String,
    pub get_vs_value_url: String,
    pub data_registry_url: String,
    pub upstream_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            upload_module_url: "http://create-module-service:5000/upload_module".into(),
            create_instance_url: "http://instance-creator-service:4000/create_instance".into(),
            get_vs_value_url: "http://prediction-creator-service:8000/get_vs_value".into(),
            data_registry_url: "http://data-registry-service:7000".into(),
            upstream_timeout_secs: 100,
        }
    }
}

impl Settings {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Defaults, then `gateway.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = Path::new(SETTINGS_FILE);
    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        apply_file_overrides(&mut settings, &raw)
            .with_context(|| format!("invalid settings in '{}'", path.display()))?;
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

pub(crate) fn apply_file_overrides(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: HashMap<String, toml::Value> = toml::from_str(raw)?;
    let text = |key: &str| match file_cfg.get(key) {
        Some(toml::Value::String(v)) => Some(v.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    };

    if let Some(v) = text("bind_addr") {
        settings.bind_addr = v;
    }
    if let Some(v) = text("upload_module_url") {
        settings.upload_module_url = v;
    }
    if let Some(v) = text("create_instance_url") {
        settings.create_instance_url = v;
    }
    if let Some(v) = text("get_vs_value_url") {
        settings.get_vs_value_url = v;
    }
    if let Some(v) = text("data_registry_url") {
        settings.data_registry_url = v;
    }
    if let Some(v) = text("upstream_timeout_secs") {
        settings.upstream_timeout_secs = parse_timeout(&v)?;
    }
    Ok(())
}

pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("GATEWAY_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Some(v) = lookup("UPLOAD_MODULE_SERVICE_URL") {
        settings.upload_module_url = v;
    }
    if let Some(v) = lookup("CREATE_INSTANCE_SERVICE_URL") {
        settings.create_instance_url = v;
    }
    if let Some(v) = lookup("GET_VS_VALUE_SERVICE_URL") {
        settings.get_vs_value_url = v;
    }
    if let Some(v) = lookup("DATA_REGISTRY_SERVICE_URL") {
        settings.data_registry_url = v;
    }

    if let Some(v) = lookup("APP__UPSTREAM_TIMEOUT_SECS") {
        settings.upstream_timeout_secs = parse_timeout(&v)?;
    }
    Ok(())
}

fn parse_timeout(raw: &str) -> anyhow::Result<u64> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("upstream timeout must be whole seconds, got '{raw}'"))?;
    anyhow::ensure!(secs > 0, "upstream timeout must be positive");
    Ok(secs)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
