// Cloud source: one configured remote catalog bound to a protocol.
//
// Listing results are cached per channel and source name; install
// re-resolves the package by name at execution time so it never acts on
// a stale listing entry.

use crate::cache;
use crate::host::{Host, path_to_url};
use crate::package::{InstallResult, Package, PackageCategory, group_packages_in_categories};
use crate::protocol::{GitHostProtocol, Protocol, UnsupportedProtocol, WikiProtocol};
use crate::sources::{PackageSource, SourceConfig};
use crate::worker;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};

/// A named grouping of cloud sources.
pub struct CloudPackageChannel {
    pub id: String,
    pub name: String,
    pub sources: Vec<CloudPackageSource>,
}

pub struct CloudPackageSource {
    channel_id: String,
    name: String,
    title: String,
    description: String,
    icon: String,
    /// "Mod" or "Macro".
    kind: String,
    protocol: Box<dyn Protocol>,
}

impl std::fmt::Debug for CloudPackageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudPackageSource")
            .field("channel_id", &self.channel_id)
            .field("name", &self.name)
            .field("title", &self.title)
            .field("description", &self.description)
            .field("icon", &self.icon)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl CloudPackageSource {
    /// Bind a source configuration to its protocol. An unknown protocol
    /// name is a configuration error that surfaces to the operator.
    pub fn new(config: SourceConfig, channel_id: &str) -> Result<Self> {
        let protocol: Box<dyn Protocol> = match config.protocol.as_str() {
            "github" => Box::new(GitHostProtocol::github(
                config.git.clone().context("github source without git URL")?,
                config.git_submodules.clone(),
                config.index_type.clone(),
                config.index_url.clone(),
                config.wiki.clone(),
            )),
            "framagit" => Box::new(GitHostProtocol::framagit(
                config
                    .git
                    .clone()
                    .context("framagit source without git URL")?,
                config.git_submodules.clone(),
                config.index_type.clone(),
                config.index_url.clone(),
                config.wiki.clone(),
            )),
            "wiki" => Box::new(WikiProtocol::new(
                config.url.clone().context("wiki source without page URL")?,
                config.wiki.clone().context("wiki source without base URL")?,
            )),
            other => return Err(UnsupportedProtocol(other.to_string()).into()),
        };

        Ok(Self {
            channel_id: channel_id.to_string(),
            name: config.name,
            title: config.title,
            description: config.description,
            icon: config.icon.unwrap_or_default(),
            kind: config.kind,
            protocol,
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved icon URL: configured URLs pass through, resource
    /// relative paths are anchored at the host resource dir.
    pub fn icon_url(&self, host: &Host) -> String {
        if self.icon.contains("://") || self.icon.is_empty() {
            self.icon.clone()
        } else {
            path_to_url(&host.core_resource_dir.join(&self.icon))
        }
    }
}

#[async_trait]
impl PackageSource for CloudPackageSource {
    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn icon(&self) -> &str {
        &self.icon
    }

    async fn get_packages(&self, host: &Host) -> Vec<Package> {
        let mut packages = match self.kind.as_str() {
            "Mod" | "Workbench" => self.protocol.get_mod_list(host).await,
            "Macro" => self.protocol.get_macro_list(host).await,
            other => {
                warn!("Source {} has unknown type {}", self.name, other);
                Vec::new()
            }
        };

        for pkg in &mut packages {
            pkg.source_name = Some(self.name.clone());
            pkg.channel_id = Some(self.channel_id.clone());
        }

        packages.retain(|pkg| !pkg.has_flag("banned"));
        packages.sort_by_key(|pkg| pkg.display_title().to_lowercase());
        packages
    }

    async fn get_categories(&self, host: &Host, cache: bool) -> Vec<PackageCategory> {
        if cache {
            if let Some(categories) = cache::load_categories(host, &self.channel_id, &self.name) {
                return categories;
            }
        }
        let categories = group_packages_in_categories(self.get_packages(host).await);
        if let Err(err) = cache::store_categories(host, &self.channel_id, &self.name, &categories) {
            warn!("Could not cache listing for {}: {}", self.name, err);
        }
        categories
    }

    async fn install(&self, host: &Host, name: &str) -> Result<InstallResult> {
        let Some(mut pkg) = self.find_package_by_name(host, name).await else {
            return Ok(InstallResult::failed(format!(
                "Package {} not found in source {}",
                name, self.name
            )));
        };

        // Serialize concurrent installs of the same package identity; a
        // second request queues behind the first.
        let lock = worker::install_lock(&pkg.key);
        let _guard = lock.lock().await;

        info!("Installing {} from {}", pkg.name, self.name);
        let result = if pkg.kind.is_module() {
            self.protocol.install_mod(host, &mut pkg).await
        } else {
            self.protocol.install_macro(host, &mut pkg).await
        };

        if result.ok {
            super::installed::analyse_workbench_key(&mut pkg);
            if let Err(err) = cache::save_package_metadata(host, &pkg) {
                warn!("Could not cache metadata for {}: {}", pkg.name, err);
            }
        }
        Ok(result)
    }

    fn update_package_list(&self, host: &Host) {
        cache::invalidate(host, &self.channel_id, &self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(protocol: &str) -> SourceConfig {
        SourceConfig {
            name: "test".to_string(),
            title: "Test".to_string(),
            description: "A test source".to_string(),
            protocol: protocol.to_string(),
            kind: "Mod".to_string(),
            icon: None,
            url: Some("https://wiki.example.org/page".to_string()),
            git: Some("https://github.com/acme/addons.git".to_string()),
            git_submodules: None,
            index_type: None,
            index_url: None,
            wiki: Some("https://wiki.example.org".to_string()),
        }
    }

    #[test]
    fn known_protocols_construct() {
        assert!(CloudPackageSource::new(config("github"), "default").is_ok());
        assert!(CloudPackageSource::new(config("framagit"), "default").is_ok());
        assert!(CloudPackageSource::new(config("wiki"), "default").is_ok());
    }

    #[test]
    fn unknown_protocol_is_a_typed_error() {
        let err = CloudPackageSource::new(config("gopher"), "default").unwrap_err();
        assert!(err.downcast_ref::<UnsupportedProtocol>().is_some());
        assert_eq!(err.to_string(), "Unsupported protocol: 'gopher'");
    }

    #[test]
    fn missing_git_url_is_an_error() {
        let mut cfg = config("github");
        cfg.git = None;
        assert!(CloudPackageSource::new(cfg, "default").is_err());
    }
}
