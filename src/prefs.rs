// Preferences module for typed persistent host parameters

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A typed preference value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Persistent named parameters, plus per-plugin parameter groups
/// (e.g. the `destination` key recorded after a module install).
/// Stored as TOML under the user data dir.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default)]
    values: BTreeMap<String, PrefValue>,
    #[serde(default)]
    plugins: BTreeMap<String, BTreeMap<String, String>>,
}

impl Preferences {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut prefs = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| toml::from_str::<Preferences>(&text).ok())
            .unwrap_or_default();
        prefs.path = path;
        prefs
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write preferences to {}", self.path.display()))
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(PrefValue::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(PrefValue::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(PrefValue::Int(i)) => *i,
            _ => default,
        }
    }

    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(PrefValue::Float(f)) => *f,
            Some(PrefValue::Int(i)) => *i as f64,
            _ => default,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: PrefValue) {
        self.values.insert(key.into(), value);
    }

    pub fn set_plugin_parameter(
        &mut self,
        plugin: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.plugins
            .entry(plugin.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn get_plugin_parameter(&self, plugin: &str, key: &str) -> Option<&str> {
        self.plugins.get(plugin)?.get(key).map(|s| s.as_str())
    }

    /// Effective proxy URL for network access, or None for direct /
    /// system-default connections.
    pub fn proxy_url(&self) -> Option<String> {
        if self.get_bool("no_proxy_check", true) {
            return None;
        }
        if self.get_bool("user_proxy_check", false) {
            let url = self.get_string("proxy_url", "");
            if !url.is_empty() {
                return Some(url);
            }
        }
        // system_proxy_check falls through: reqwest already honors the
        // platform proxy environment.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn typed_values_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.toml");

        let mut prefs = Preferences::load(&path);
        prefs.set("name", PrefValue::String("hello".into()));
        prefs.set("enabled", PrefValue::Bool(true));
        prefs.set("count", PrefValue::Int(42));
        prefs.set("ratio", PrefValue::Float(0.5));
        prefs.set_plugin_parameter("SampleWB", "destination", "/data/Mod/SampleWB");
        prefs.save().unwrap();

        let loaded = Preferences::load(&path);
        assert_eq!(loaded.get_string("name", ""), "hello");
        assert!(loaded.get_bool("enabled", false));
        assert_eq!(loaded.get_int("count", 0), 42);
        assert_eq!(loaded.get_float("ratio", 0.0), 0.5);
        assert_eq!(
            loaded.get_plugin_parameter("SampleWB", "destination"),
            Some("/data/Mod/SampleWB")
        );
    }

    #[test]
    fn defaults_apply_for_missing_and_mistyped_keys() {
        let dir = TempDir::new().unwrap();
        let mut prefs = Preferences::load(dir.path().join("prefs.toml"));
        prefs.set("count", PrefValue::String("not a number".into()));
        assert_eq!(prefs.get_int("count", 7), 7);
        assert_eq!(prefs.get_string("missing", "fallback"), "fallback");
    }

    #[test]
    fn proxy_disabled_by_default() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::load(dir.path().join("prefs.toml"));
        assert_eq!(prefs.proxy_url(), None);
    }

    #[test]
    fn user_proxy_is_returned_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut prefs = Preferences::load(dir.path().join("prefs.toml"));
        prefs.set("no_proxy_check", PrefValue::Bool(false));
        prefs.set("user_proxy_check", PrefValue::Bool(true));
        prefs.set("proxy_url", PrefValue::String("http://proxy:3128".into()));
        assert_eq!(prefs.proxy_url(), Some("http://proxy:3128".to_string()));
    }
}
