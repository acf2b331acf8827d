// Installed source: scans the local module and macro directories.
//
// Analysis of an installed package (git origin, manifest, plugin class
// name, readme location) is expensive enough to cache; the per-package
// metadata cache short-circuits it on later scans.

use crate::cache;
use crate::flags::apply_predefined_flags;
use crate::git;
use crate::host::{Host, path_to_url, predefined_workbench_categories, workbench_key};
use crate::macro_parser::build_macro_package;
use crate::manifest::ExtensionManifest;
use crate::package::{
    InstallResult, Package, PackageCategory, PackageKind, ReadmeFormat,
    group_packages_in_categories,
};
use crate::protocol::git_host::{GithubUrls, RepoUrls, normalize, path_relative};
use crate::sources::PackageSource;
use crate::worker;
use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    /// Plugin class passed to the host's registration call.
    static ref WORKBENCH_CLASS: Regex = Regex::new(r"addWorkbench\s*\(\s*(?P<class>\w+)").unwrap();
}

/// Source over everything installed locally: core and user modules plus
/// user macros.
pub struct InstalledPackageSource {
    pub show_core_packages: bool,
}

impl Default for InstalledPackageSource {
    fn default() -> Self {
        Self {
            show_core_packages: true,
        }
    }
}

impl InstalledPackageSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn import_mods(&self, host: &Host, root: &Path, is_core: bool) -> Vec<Package> {
        let mut packages = Vec::new();
        let Ok(entries) = std::fs::read_dir(root) else {
            return packages;
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            packages.push(import_mod(host, &entry.path(), &name, is_core));
        }
        packages
    }

    fn import_macros(&self, host: &Host) -> Vec<Package> {
        let mut packages = Vec::new();
        let Ok(entries) = std::fs::read_dir(&host.user_macro_dir) else {
            return packages;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_macro = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("fcmacro"))
                .unwrap_or(false);
            if !path.is_file() || !is_macro {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match build_macro_package(host, &path, stem, false, false, false, None) {
                Ok(mut pkg) => {
                    apply_predefined_flags(&mut pkg);
                    analyse_installed_macro(host, &mut pkg);
                    packages.push(pkg);
                }
                Err(err) => warn!("Skipping macro {}: {}", path.display(), err),
            }
        }
        packages
    }
}

#[async_trait]
impl PackageSource for InstalledPackageSource {
    fn title(&self) -> &str {
        "Installed packages"
    }

    fn description(&self) -> &str {
        "All installed packages"
    }

    fn icon(&self) -> &str {
        "icons/source_installed.svg"
    }

    async fn get_packages(&self, host: &Host) -> Vec<Package> {
        let mut packages = Vec::new();
        if self.show_core_packages {
            packages.extend(self.import_mods(host, &host.core_mod_root(), true));
        }
        packages.extend(self.import_mods(host, &host.mod_root(), false));
        packages.extend(self.import_macros(host));
        packages.sort_by_key(|pkg| pkg.display_title().to_lowercase());
        packages
    }

    async fn get_categories(&self, host: &Host, _cache: bool) -> Vec<PackageCategory> {
        group_packages_in_categories(self.get_packages(host).await)
    }

    async fn install(&self, _host: &Host, name: &str) -> Result<InstallResult> {
        Ok(InstallResult::failed(format!(
            "{} can only be installed from a cloud source",
            name
        )))
    }

    async fn uninstall(&self, host: &Host, name: &str) -> Result<InstallResult> {
        let Some(pkg) = self.find_package_by_name(host, name).await else {
            return Ok(InstallResult::failed(format!(
                "Package {} is not installed",
                name
            )));
        };

        let lock = worker::install_lock(&pkg.key);
        let _guard = lock.lock().await;

        let result = match pkg.kind {
            PackageKind::Macro => uninstall_macro(host, &pkg),
            PackageKind::Mod | PackageKind::Workbench => uninstall_mod(host, &pkg),
        };
        if result.ok {
            if let Some(file) = cache::package_cache_file(host, &pkg) {
                let _ = std::fs::remove_file(file);
            }
        }
        Ok(result)
    }

    fn update_package_list(&self, _host: &Host) {}
}

fn import_mod(host: &Host, install_dir: &Path, name: &str, is_core: bool) -> Package {
    let key = workbench_key(name);
    // A module with a plugin registration entry point is a workbench
    let kind = if find_plugin_entry_point(install_dir).is_some() {
        PackageKind::Workbench
    } else {
        PackageKind::Mod
    };

    let icon_file = install_dir
        .join("Resources")
        .join("icons")
        .join(format!("{}Workbench.svg", name));
    let icon = if icon_file.exists() {
        path_to_url(&icon_file)
    } else {
        path_to_url(&host.core_resource_dir.join("icons").join("workbench.svg"))
    };

    let mut pkg = Package {
        key,
        name: name.to_string(),
        title: Some(name.to_string()),
        kind,
        is_core,
        is_git: install_dir.join(".git").is_dir(),
        install_dir: Some(install_dir.to_path_buf()),
        icon: Some(icon),
        categories: predefined_workbench_categories(&workbench_key(name)),
        ..Package::default()
    };
    apply_predefined_flags(&mut pkg);
    analyse_installed_mod(host, &mut pkg);
    pkg
}

/// Full analysis of an installed module, short-circuited by the
/// metadata cache.
fn analyse_installed_mod(host: &Host, pkg: &mut Package) {
    if cache::load_package_metadata(host, pkg) {
        debug!("Metadata cache hit for {}", pkg.name);
        return;
    }
    analyse_git(pkg);
    analyse_manifest(pkg);
    analyse_workbench_key(pkg);
    analyse_readme(pkg);
    if let Err(err) = cache::save_package_metadata(host, pkg) {
        warn!("Could not cache metadata for {}: {}", pkg.name, err);
    }
}

fn analyse_installed_macro(host: &Host, pkg: &mut Package) {
    if !cache::load_package_metadata(host, pkg) {
        if let Err(err) = cache::save_package_metadata(host, pkg) {
            warn!("Could not cache metadata for {}: {}", pkg.name, err);
        }
    }
}

fn analyse_git(pkg: &mut Package) {
    let Some(install_dir) = pkg.install_dir.as_ref() else {
        return;
    };
    if install_dir.join(".git").exists() {
        if let Some(url) = git::origin_url(install_dir) {
            pkg.git = Some(url);
            pkg.is_git = true;
        }
    }
}

fn analyse_manifest(pkg: &mut Package) {
    let Some(install_dir) = pkg.install_dir.as_ref() else {
        return;
    };
    let mut path = install_dir.join("manifest.ini");
    if !path.exists() {
        path = install_dir.join("metadata.txt");
    }
    let Ok(content) = std::fs::read_to_string(&path) else {
        return;
    };
    let manifest = ExtensionManifest::parse(&content);
    if let Some(description) = manifest.general_value("description") {
        pkg.description = Some(description.to_string());
    }
    if let Some(version) = manifest.general_value("version") {
        pkg.version = Some(version.to_string());
    }
    if let Some(author) = manifest.general_value("author") {
        pkg.author = Some(author.to_string());
    }
    if let Some(homepage) = manifest.general_value("url") {
        pkg.homepage = Some(homepage.to_string());
    }
    if let Some(categories) = manifest.categories() {
        if !categories.is_empty() {
            pkg.categories = categories;
        }
    }
}

/// Resolve the package key to the registered plugin class name found in
/// the module's entry point, when there is one.
pub fn analyse_workbench_key(pkg: &mut Package) {
    let Some(install_dir) = pkg.install_dir.as_ref() else {
        return;
    };
    let Some(entry_point) = find_plugin_entry_point(install_dir) else {
        return;
    };
    let Ok(content) = std::fs::read_to_string(&entry_point) else {
        return;
    };
    if let Some(caps) = WORKBENCH_CLASS.captures(&content) {
        pkg.key = caps["class"].to_string();
    }
}

/// Legacy `InitGui.py` at the module root, or `init_gui.py` under a
/// `freecad/<package>/` layout.
fn find_plugin_entry_point(install_dir: &Path) -> Option<PathBuf> {
    let legacy = install_dir.join("InitGui.py");
    if legacy.exists() {
        return Some(legacy);
    }
    let namespace = install_dir.join("freecad");
    for entry in std::fs::read_dir(namespace).ok()?.flatten() {
        let init = entry.path().join("init_gui.py");
        if init.exists() {
            return Some(init);
        }
    }
    None
}

fn analyse_readme(pkg: &mut Package) {
    let Some(install_dir) = pkg.install_dir.as_ref() else {
        return;
    };
    let Some(git_url) = pkg.git.as_deref() else {
        return;
    };
    if install_dir.join("README.md").exists() && git_url.contains("github.com") {
        let urls = GithubUrls::new(git_url);
        pkg.readme_url = Some(urls.raw_file_url("README.md"));
        pkg.readme_format = ReadmeFormat::Markdown;
    }
}

fn uninstall_macro(host: &Host, pkg: &Package) -> InstallResult {
    let Some(install_file) = pkg.install_file.as_ref() else {
        return InstallResult::failed("Macro has no install file");
    };
    info!("Removing {}", install_file.display());
    if let Err(err) = std::fs::remove_file(install_file) {
        warn!("Removal of {} failed: {}", install_file.display(), err);
        return InstallResult::failed(format!("Could not remove {}", install_file.display()));
    }

    // Declared companion files, confined to the macro directory
    let macro_root = normalize(&host.user_macro_dir);
    for declared in &pkg.files {
        let target = normalize(&host.user_macro_dir.join(path_relative(declared)));
        if !target.starts_with(&macro_root) || !target.is_file() {
            continue;
        }
        if let Err(err) = std::fs::remove_file(&target) {
            warn!("Removal of {} failed: {}", target.display(), err);
            continue;
        }
        // Drop directories the companion left empty
        let mut dir = target.parent().map(Path::to_path_buf);
        while let Some(current) = dir {
            if current == macro_root || std::fs::remove_dir(&current).is_err() {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }
    }

    InstallResult {
        ok: true,
        ..InstallResult::default()
    }
}

fn uninstall_mod(host: &Host, pkg: &Package) -> InstallResult {
    if pkg.is_core {
        return InstallResult::failed("Core packages cannot be uninstalled");
    }
    let Some(install_dir) = pkg.install_dir.as_ref() else {
        return InstallResult::failed("Package has no install directory");
    };
    let target = normalize(install_dir);
    if !target.starts_with(normalize(&host.mod_root())) {
        return InstallResult::failed(format!(
            "{} is outside the user module directory",
            install_dir.display()
        ));
    }

    remove_macro_links(host, &target);

    info!("Removing {}", target.display());
    match std::fs::remove_dir_all(&target) {
        Ok(()) => InstallResult {
            ok: true,
            ..InstallResult::default()
        },
        Err(err) => {
            warn!("Removal of {} failed: {}", target.display(), err);
            InstallResult::failed(format!("Could not remove {}", target.display()))
        }
    }
}

/// Remove macro-directory symlinks pointing into a module tree that is
/// about to be deleted.
fn remove_macro_links(host: &Host, module_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(&host.user_macro_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let link = entry.path();
        let Ok(target) = std::fs::read_link(&link) else {
            continue;
        };
        if normalize(&target).starts_with(module_dir) {
            debug!("Removing macro link {}", link.display());
            let _ = std::fs::remove_file(&link);
        }
    }
}
