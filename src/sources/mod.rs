// Sources module for package source implementations

pub mod cloud;
pub mod installed;

pub use cloud::{CloudPackageChannel, CloudPackageSource};
pub use installed::InstalledPackageSource;

use crate::host::Host;
use crate::package::{InstallResult, Package, PackageCategory};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Trait for package sources: one remote catalog or the local
/// installation state.
#[async_trait]
pub trait PackageSource: Send + Sync {
    fn title(&self) -> &str;

    fn description(&self) -> &str;

    fn icon(&self) -> &str;

    /// Enumerate packages, always fresh. Cached results come through
    /// `get_categories`.
    async fn get_packages(&self, host: &Host) -> Vec<Package>;

    /// Categorized package listing, served from the on-disk cache when
    /// `cache` is set and a cache entry exists.
    async fn get_categories(&self, host: &Host, cache: bool) -> Vec<PackageCategory>;

    async fn install(&self, host: &Host, name: &str) -> Result<InstallResult>;

    async fn uninstall(&self, _host: &Host, name: &str) -> Result<InstallResult> {
        Ok(InstallResult::failed(format!(
            "{} can only be uninstalled through the installed-packages source",
            name
        )))
    }

    /// Drop the cached listing so the next read recomputes it.
    fn update_package_list(&self, host: &Host);

    async fn find_package_by_name(&self, host: &Host, name: &str) -> Option<Package> {
        self.get_packages(host)
            .await
            .into_iter()
            .find(|pkg| pkg.name == name)
    }
}

/// One channel of the configuration-driven source registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    pub sources: Vec<SourceConfig>,
}

/// One configured cloud source, bound to a protocol by name.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub title: String,
    pub description: String,
    pub protocol: String,
    /// "Mod" or "Macro": which listing the protocol is asked for.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Page URL for wiki sources.
    #[serde(default)]
    pub url: Option<String>,
    /// Repository URL for git-hosting sources.
    #[serde(default)]
    pub git: Option<String>,
    #[serde(default)]
    pub git_submodules: Option<String>,
    #[serde(default)]
    pub index_type: Option<String>,
    #[serde(default)]
    pub index_url: Option<String>,
    #[serde(default)]
    pub wiki: Option<String>,
}

const BUNDLED_SOURCES: &str = include_str!("../../resources/data/sources.json");

/// Channel configurations: the copy shipped in the host resource dir
/// when present, the bundled copy otherwise.
pub fn sources_data(host: &Host) -> Result<Vec<ChannelConfig>> {
    let path = host.core_resource_dir.join("data").join("sources.json");
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => BUNDLED_SOURCES.to_string(),
    };
    Ok(serde_json::from_str(&content)?)
}

/// All configured cloud channels with their sources constructed.
pub fn find_cloud_channels(host: &Host) -> Result<Vec<CloudPackageChannel>> {
    let mut channels = Vec::new();
    for channel in sources_data(host)? {
        let mut sources = Vec::new();
        for config in channel.sources {
            sources.push(CloudPackageSource::new(config, &channel.id)?);
        }
        channels.push(CloudPackageChannel {
            id: channel.id,
            name: channel.name,
            sources,
        });
    }
    Ok(channels)
}

/// One configured cloud source by channel id and source name.
pub fn find_source(host: &Host, channel_id: &str, name: &str) -> Result<Option<CloudPackageSource>> {
    for channel in sources_data(host)? {
        if channel.id != channel_id {
            continue;
        }
        for config in channel.sources {
            if config.name == name {
                return Ok(Some(CloudPackageSource::new(config, &channel.id)?));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bundled_sources_parse() {
        let channels: Vec<ChannelConfig> = serde_json::from_str(BUNDLED_SOURCES).unwrap();
        assert!(!channels.is_empty());
        let default = &channels[0];
        assert_eq!(default.id, "default");
        assert!(default.sources.iter().any(|s| s.protocol == "github"));
        assert!(default.sources.iter().any(|s| s.protocol == "wiki"));
    }

    #[test]
    fn resource_copy_overrides_bundled_data() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let data_dir = host.core_resource_dir.join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(
            data_dir.join("sources.json"),
            r#"[{"id": "custom", "name": "Custom", "sources": []}]"#,
        )
        .unwrap();

        let channels = sources_data(&host).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, "custom");
    }

    #[test]
    fn find_source_matches_channel_and_name() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let source = find_source(&host, "default", "Workbenches").unwrap();
        assert!(source.is_some());
        assert!(find_source(&host, "default", "nope").unwrap().is_none());
        assert!(find_source(&host, "nope", "Workbenches").unwrap().is_none());
    }
}
