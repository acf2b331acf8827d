// Git-hosting protocol: enumerates modules from a submodules index,
// installs via clone or archive fallback, and materializes macro trees
// into the local cache.
//
// Two hosting services are supported through one generic protocol
// parameterized by a `RepoUrls` strategy; they differ only in raw-file
// and archive URL conventions.

use crate::archive;
use crate::constants::MACRO_FILE_EXT;
use crate::deps::check_dependencies;
use crate::flags::apply_predefined_flags;
use crate::git;
use crate::host::{Host, path_to_url, predefined_workbench_categories, workbench_key};
use crate::http;
use crate::macro_parser::build_macro_package;
use crate::manifest::{ExtensionManifest, comma_string_list};
use crate::package::{InstallResult, Package, PackageKind, ReadmeFormat};
use crate::protocol::Protocol;
use crate::protocol::wiki::{self, ModIndexEntry};
use crate::worker::Worker;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Component, Path, PathBuf};

lazy_static! {
    static ref SUBMODULE_LINE: Regex = Regex::new(
        r#"(?m)^\s*\[\s*submodule\s+["'](?P<module>[^"']+)["']\s*\]\s*$|^\s*(?P<var>path|url)\s*=\s*(?P<value>.+?)\s*$"#
    )
    .unwrap();
}

const OUTSIDE_INSTALL_PATH: &str =
    "Macro package attempts to install files outside of permitted path";
const OUTSIDE_SOURCE_PATH: &str =
    "Macro package attempts to access files outside of permitted path";

/// One entry of a `.gitmodules` index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubModule {
    pub name: String,
    pub path: Option<String>,
    pub url: Option<String>,
}

/// Parse a standard `.gitmodules` file: repeated `[submodule "name"]`
/// headers each followed by `path =` / `url =` lines. Lines before the
/// first header are ignored.
pub fn parse_submodules(content: &str) -> Vec<SubModule> {
    let mut modules: Vec<SubModule> = Vec::new();
    for caps in SUBMODULE_LINE.captures_iter(content) {
        if let Some(name) = caps.name("module") {
            modules.push(SubModule {
                name: name.as_str().to_string(),
                ..SubModule::default()
            });
        } else if let (Some(var), Some(value), Some(module)) =
            (caps.name("var"), caps.name("value"), modules.last_mut())
        {
            match var.as_str() {
                "path" => module.path = Some(value.as_str().to_string()),
                "url" => module.url = Some(value.as_str().to_string()),
                _ => {}
            }
        }
    }
    modules
}

/// Repository URL with the `.git` suffix and trailing slashes removed.
/// Also the key the wiki-derived module index is looked up by.
pub fn repo_base(url: &str) -> String {
    let url = url.trim_end_matches('/');
    url.strip_suffix(".git")
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

/// URL conventions of one git hosting service.
pub trait RepoUrls: Send + Sync {
    /// URL of a file on the default branch, served raw.
    fn raw_file_url(&self, path: &str) -> String;

    /// URL of a zip archive of the default branch, when the service
    /// offers one.
    fn zip_url(&self) -> Option<String>;

    fn readme_url(&self) -> String;

    fn readme_format(&self) -> ReadmeFormat;
}

pub struct GithubUrls {
    base: String,
}

impl GithubUrls {
    pub fn new(url: &str) -> Self {
        Self {
            base: repo_base(url),
        }
    }
}

impl RepoUrls for GithubUrls {
    fn raw_file_url(&self, path: &str) -> String {
        let raw = self.base.replace("github.com", "raw.githubusercontent.com");
        format!("{}/master/{}", raw, path)
    }

    fn zip_url(&self) -> Option<String> {
        Some(format!("{}/archive/master.zip", self.base))
    }

    fn readme_url(&self) -> String {
        self.raw_file_url("README.md")
    }

    fn readme_format(&self) -> ReadmeFormat {
        ReadmeFormat::Markdown
    }
}

pub struct FramagitUrls {
    base: String,
}

impl FramagitUrls {
    pub fn new(url: &str) -> Self {
        Self {
            base: repo_base(url),
        }
    }
}

impl RepoUrls for FramagitUrls {
    fn raw_file_url(&self, path: &str) -> String {
        format!("{}/-/raw/master/{}", self.base, path)
    }

    fn zip_url(&self) -> Option<String> {
        let repo = self.base.rsplit('/').next()?;
        Some(format!("{}/-/archive/{}-master.zip", self.base, repo))
    }

    fn readme_url(&self) -> String {
        format!("{}/-/blob/master/README.md", self.base)
    }

    fn readme_format(&self) -> ReadmeFormat {
        ReadmeFormat::Html
    }
}

fn github_urls(url: &str) -> Box<dyn RepoUrls> {
    Box::new(GithubUrls::new(url))
}

fn framagit_urls(url: &str) -> Box<dyn RepoUrls> {
    Box::new(FramagitUrls::new(url))
}

/// Protocol over a git hosting service. The main repository acts as a
/// catalog through its submodules index; an optional wiki-derived index
/// table enriches titles, descriptions, categories and authors.
pub struct GitHostProtocol {
    url: String,
    submodules_url: Option<String>,
    index_type: Option<String>,
    index_url: Option<String>,
    wiki_url: Option<String>,
    make_urls: fn(&str) -> Box<dyn RepoUrls>,
}

impl GitHostProtocol {
    pub fn github(
        url: String,
        submodules_url: Option<String>,
        index_type: Option<String>,
        index_url: Option<String>,
        wiki_url: Option<String>,
    ) -> Self {
        Self {
            url,
            submodules_url,
            index_type,
            index_url,
            wiki_url,
            make_urls: github_urls,
        }
    }

    pub fn framagit(
        url: String,
        submodules_url: Option<String>,
        index_type: Option<String>,
        index_url: Option<String>,
        wiki_url: Option<String>,
    ) -> Self {
        Self {
            url,
            submodules_url,
            index_type,
            index_url,
            wiki_url,
            make_urls: framagit_urls,
        }
    }

    fn mod_from_submodule(
        &self,
        host: &Host,
        subm: &SubModule,
        index: &BTreeMap<String, ModIndexEntry>,
    ) -> Option<Package> {
        let url = subm.url.clone()?;
        let urls = (self.make_urls)(&url);
        let indexed = index.get(&repo_base(&url));

        let mut icon_path = format!("Resources/icons/{}Workbench.svg", subm.name);
        if let Some(icon) = indexed.and_then(|e| e.icon.clone()) {
            icon_path = icon;
        }

        let install_dir = host.mod_root().join(&subm.name);
        let icon_sources = workbench_icon_candidates(
            &subm.name,
            urls.as_ref(),
            &icon_path,
            &install_dir,
            &host.cache_dir,
        );

        let categories = indexed
            .and_then(|e| e.categories.as_deref())
            .map(comma_string_list)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| predefined_workbench_categories(&workbench_key(&subm.name)));

        let mut pkg = Package {
            key: subm.name.clone(),
            name: subm.name.clone(),
            title: Some(
                indexed
                    .map(|e| e.title.clone())
                    .unwrap_or_else(|| subm.name.clone()),
            ),
            description: indexed.and_then(|e| e.description.clone()),
            author: indexed.and_then(|e| e.author.clone()),
            kind: PackageKind::Workbench,
            install_dir: Some(install_dir),
            icon: icon_sources.first().cloned(),
            icon_sources,
            is_git: true,
            git: Some(url),
            categories,
            readme_url: Some(urls.readme_url()),
            readme_format: urls.readme_format(),
            ..Package::default()
        };
        if indexed.and_then(|e| e.flag.as_deref()).is_some() {
            pkg.flags.insert("obsolete".to_string(), true);
        }
        apply_predefined_flags(&mut pkg);
        Some(pkg)
    }

    /// Materialize the catalog repository into the per-source cache
    /// directory, preferring a clone so future syncs are incremental and
    /// falling back to a one-shot archive download.
    async fn download_macro_tree(&self, host: &Host) -> Option<PathBuf> {
        let digest = hex::encode(Sha256::digest(self.url.as_bytes()));
        let local_dir = host.cache_dir.join("git").join(digest);

        if git::install_info().usable() {
            match git::clone(&self.url, &local_dir) {
                Ok(()) => return Some(local_dir),
                Err(err) => {
                    warn!("Clone of {} failed: {}", self.url, err);
                }
            }
        }

        if !archive::is_available() {
            return None;
        }

        let urls = (self.make_urls)(&self.url);
        let zip_url = urls.zip_url()?;
        if std::fs::create_dir_all(&host.cache_dir).is_err() {
            return None;
        }
        let staging = tempfile::tempdir_in(&host.cache_dir).ok()?;
        let zip_path = staging.path().join("archive.zip");
        if !http::download(&zip_url, &zip_path).await {
            return None;
        }
        let exploded = staging.path().join("tree");
        if let Err(err) = archive::unzip(&zip_path, &exploded) {
            warn!("Extraction of {} failed: {}", zip_url, err);
            return None;
        }
        if local_dir.exists() {
            std::fs::remove_dir_all(&local_dir).ok()?;
        }
        std::fs::create_dir_all(local_dir.parent()?).ok()?;
        // An archive holds one top level directory named after the branch
        for entry in std::fs::read_dir(&exploded).ok()?.flatten() {
            if entry.path().is_dir() {
                std::fs::rename(entry.path(), &local_dir).ok()?;
                return Some(local_dir);
            }
        }
        None
    }

    fn install_mod_from_git(&self, url: &str, install_dir: &Path) -> Result<()> {
        if !install_dir.exists() {
            return git::clone(url, install_dir);
        }
        if !install_dir.join(".git").exists() {
            // Upgrade a zip install to a git-managed one in place
            git::clone_bare(url, &install_dir.join(".git"))?;
            git::config_set(install_dir, "core", "bare", "false")?;
        }
        git::update(install_dir)
    }

    async fn install_mod_from_zip(&self, urls: &dyn RepoUrls, install_dir: &Path) -> Result<()> {
        let zip_url = urls
            .zip_url()
            .context("No archive URL for this repository")?;
        let parent = install_dir
            .parent()
            .context("Install dir has no parent directory")?;
        std::fs::create_dir_all(parent)?;

        let staging = tempfile::tempdir_in(parent)?;
        let zip_path = staging.path().join("archive.zip");
        if !http::download(&zip_url, &zip_path).await {
            bail!("Download of {} failed", zip_url);
        }
        let exploded = staging.path().join("tree");
        archive::unzip(&zip_path, &exploded)?;

        // Last writer wins: the old tree is gone before the new one lands
        if install_dir.exists() {
            std::fs::remove_dir_all(install_dir)?;
        }
        for entry in std::fs::read_dir(&exploded)?.flatten() {
            if entry.path().is_dir() {
                std::fs::rename(entry.path(), install_dir)?;
                return Ok(());
            }
        }
        bail!("Archive of {} did not contain a directory", zip_url)
    }
}

#[async_trait]
impl Protocol for GitHostProtocol {
    async fn get_mod_list(&self, host: &Host) -> Vec<Package> {
        let mut index = BTreeMap::new();
        if self.index_type.as_deref() == Some("wiki") {
            if let (Some(index_url), Some(wiki_url)) = (&self.index_url, &self.wiki_url) {
                index = wiki::get_mod_index(index_url, wiki_url).await;
            }
        }

        let Some(submodules_url) = &self.submodules_url else {
            return Vec::new();
        };
        let Some(content) = http::get_text(submodules_url).await else {
            return Vec::new();
        };
        parse_submodules(&content)
            .iter()
            .filter_map(|subm| self.mod_from_submodule(host, subm, &index))
            .collect()
    }

    async fn get_macro_list(&self, host: &Host) -> Vec<Package> {
        let Some(tree) = self.download_macro_tree(host).await else {
            return Vec::new();
        };

        // One worker per file; the join bounds latency to the slowest
        // single parse instead of the sum.
        let mut workers = Vec::new();
        for path in find_macro_files(&tree) {
            let host = host.clone();
            workers.push(Worker::spawn_blocking(move || -> Option<Package> {
                let stem = path.file_stem()?.to_string_lossy().to_string();
                let base = path.parent().map(Path::to_path_buf);
                match build_macro_package(&host, &path, &stem, false, true, false, base.as_deref())
                {
                    Ok(mut pkg) => {
                        apply_predefined_flags(&mut pkg);
                        Some(pkg)
                    }
                    Err(err) => {
                        warn!("Skipping macro {}: {}", path.display(), err);
                        None
                    }
                }
            }));
        }

        futures::future::join_all(workers.into_iter().map(Worker::join))
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(Some(Some(pkg))) => Some(pkg),
                _ => None,
            })
            .collect()
    }

    async fn install_mod(&self, host: &Host, pkg: &mut Package) -> InstallResult {
        let git_info = git::install_info();
        let mut result = InstallResult {
            git_available: git_info.available,
            git_python_available: git_info.available,
            git_version_ok: git_info.version_ok,
            git_version: git_info.version.clone(),
            zip_available: archive::is_available(),
            ..InstallResult::default()
        };

        let Some(install_dir) = pkg.install_dir.clone() else {
            result.invalid_install_dir = true;
            return result;
        };
        if !is_permitted_install_dir(host, &install_dir) {
            warn!("Invalid install dir: {}", install_dir.display());
            result.invalid_install_dir = true;
            return result;
        }

        let Some(url) = pkg.git.clone() else {
            result.message = Some("Package has no repository URL".to_string());
            return result;
        };
        let urls = (self.make_urls)(&url);

        // Dependencies are checked before any filesystem mutation
        let manifest = fetch_manifest(urls.as_ref()).await.unwrap_or_default();
        let (deps_ok, failed) = check_dependencies(&manifest, host);
        if !deps_ok {
            result.failed_dependencies = failed;
            return result;
        }

        if git_info.usable() {
            match self.install_mod_from_git(&url, &install_dir) {
                Ok(()) => result.ok = true,
                Err(err) => {
                    warn!("Git install of {} failed: {}", pkg.name, err);
                    result.message = Some(err.to_string());
                }
            }
        } else if result.zip_available {
            match self.install_mod_from_zip(urls.as_ref(), &install_dir).await {
                Ok(()) => result.ok = true,
                Err(err) => {
                    warn!("Archive install of {} failed: {}", pkg.name, err);
                    result.message = Some(err.to_string());
                }
            }
        } else {
            result.message =
                Some("Neither git nor archive extraction is available".to_string());
        }

        if result.ok {
            if let Err(err) = link_macros_from_mod(host, pkg) {
                warn!("Macro links for {} failed: {}", pkg.name, err);
            }
        }
        result
    }

    async fn install_macro(&self, host: &Host, pkg: &mut Package) -> InstallResult {
        let git_info = git::install_info();
        let mut result = InstallResult {
            git_available: git_info.available,
            git_python_available: git_info.available,
            git_version_ok: git_info.version_ok,
            git_version: git_info.version.clone(),
            zip_available: archive::is_available(),
            ..InstallResult::default()
        };

        let Some(install_file) = pkg.install_file.clone() else {
            result.message = Some("Macro has no install target".to_string());
            return result;
        };
        let Some(file_name) = install_file.file_name().map(PathBuf::from) else {
            result.message = Some("Macro has no install target".to_string());
            return result;
        };

        // Make sure the source tree is materialized locally
        let base_path = match pkg.base_path.clone().filter(|p| p.exists()) {
            Some(path) => path,
            None => {
                let Some(tree) = self.download_macro_tree(host).await else {
                    result.message = Some("Could not fetch the macro package".to_string());
                    return result;
                };
                match find_macro_files(&tree)
                    .into_iter()
                    .find(|f| f.file_name() == Some(file_name.as_os_str()))
                    .and_then(|f| f.parent().map(Path::to_path_buf))
                {
                    Some(parent) => parent,
                    None => {
                        result.message = Some("Could not fetch the macro package".to_string());
                        return result;
                    }
                }
            }
        };

        let install_dir = normalize(
            pkg.install_dir
                .as_deref()
                .unwrap_or(host.user_macro_dir.as_path()),
        );
        let base_root = normalize(&base_path);

        let mut created: Vec<PathBuf> = Vec::new();
        let outcome = (|| -> Result<()> {
            std::fs::create_dir_all(&host.user_macro_dir)?;
            info!("Installing {}", install_file.display());
            std::fs::copy(base_path.join(&file_name), &install_file)?;
            created.push(install_file.clone());

            for declared in &pkg.files {
                let rel = path_relative(declared);
                let dst = normalize(&install_dir.join(&rel));
                let src = normalize(&base_path.join(&rel));
                if !dst.starts_with(&install_dir) {
                    bail!(OUTSIDE_INSTALL_PATH);
                }
                if !src.starts_with(&base_root) {
                    bail!(OUTSIDE_SOURCE_PATH);
                }
                if let Some(dst_dir) = dst.parent() {
                    if dst_dir != install_dir && !dst_dir.exists() {
                        std::fs::create_dir_all(dst_dir)?;
                        created.push(dst_dir.to_path_buf());
                    }
                }
                info!("Installing {}", dst.display());
                std::fs::copy(&src, &dst)?;
                created.push(dst);
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => result.ok = true,
            Err(err) => {
                warn!("Macro install of {} failed: {}", pkg.name, err);
                let text = err.to_string();
                result.message = Some(if text == OUTSIDE_INSTALL_PATH || text == OUTSIDE_SOURCE_PATH
                {
                    text
                } else {
                    "Macro was not installed, please contact the maintainer.".to_string()
                });
                // Best-effort rollback, newest first; a failed deletion is
                // logged and must not mask the original failure
                for path in created.iter().rev() {
                    debug!("Rollback {}", path.display());
                    let removed = if path.is_dir() {
                        std::fs::remove_dir_all(path)
                    } else {
                        std::fs::remove_file(path)
                    };
                    if let Err(err) = removed {
                        warn!("Rollback of {} failed: {}", path.display(), err);
                    }
                }
            }
        }
        result
    }
}

/// Fetch and parse the package manifest over raw HTTP, trying the
/// primary manifest name first and a legacy one second.
pub async fn fetch_manifest(urls: &dyn RepoUrls) -> Option<ExtensionManifest> {
    let content = match http::get_text(&urls.raw_file_url("manifest.ini")).await {
        Some(content) => Some(content),
        None => http::get_text(&urls.raw_file_url("metadata.txt")).await,
    };
    content.map(|c| ExtensionManifest::parse(&c))
}

/// Ordered icon fallback candidates for a workbench: locally installed
/// file, previously cached file, remote raw file, legacy compiled-in
/// reference. Availability of each is only discovered at render time.
fn workbench_icon_candidates(
    name: &str,
    urls: &dyn RepoUrls,
    icon_path: &str,
    local_dir: &Path,
    cache_dir: &Path,
) -> Vec<String> {
    let mut sources = Vec::new();
    if !icon_path.is_empty() {
        sources.push(path_to_url(&local_dir.join(icon_path)));
        sources.push(path_to_url(
            &cache_dir.join(format!("{}_workbench_icon.svg", name)),
        ));
        if icon_path.starts_with("http") {
            sources.push(icon_path.to_string());
        } else {
            sources.push(urls.raw_file_url(icon_path));
        }
    }
    sources.push(format!("qrc:/icons/{}_workbench_icon.svg", name));
    sources
}

/// Breadth-first walk collecting every macro file, skipping `.git`.
fn find_macro_files(root: &Path) -> Vec<PathBuf> {
    let suffix = format!(".{}", MACRO_FILE_EXT);
    let mut files = Vec::new();
    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if entry.file_name() != ".git" {
                    queue.push_back(path);
                }
            } else if entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .ends_with(&suffix)
            {
                files.push(path);
            }
        }
    }
    files
}

/// Lexically resolve `.` and `..` components. `Path::starts_with` is
/// purely textual, so traversal components must be folded away before a
/// containment check means anything.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// An install target is confined to the user module root or the user
/// macro directory.
fn is_permitted_install_dir(host: &Host, dir: &Path) -> bool {
    let dir = normalize(dir);
    dir.starts_with(normalize(&host.mod_root())) || dir.starts_with(normalize(&host.user_macro_dir))
}

/// A declared companion file path, relative: leading slashes stripped.
pub(crate) fn path_relative(path: &str) -> PathBuf {
    PathBuf::from(path.replace('\\', "/").trim_start_matches('/'))
}

/// Symlink macro files found directly inside a freshly installed module
/// into the user macro directory and record the module as their owner.
fn link_macros_from_mod(host: &Host, pkg: &Package) -> Result<()> {
    let Some(install_dir) = pkg.install_dir.as_ref() else {
        return Ok(());
    };
    std::fs::create_dir_all(&host.user_macro_dir)?;
    let suffix = format!(".{}", MACRO_FILE_EXT);
    for entry in std::fs::read_dir(install_dir)?.flatten() {
        let name = entry.file_name();
        let is_macro = name.to_string_lossy().to_lowercase().ends_with(&suffix);
        if is_macro && entry.path().is_file() {
            let link = host.user_macro_dir.join(&name);
            if !link.exists() {
                symlink(&entry.path(), &link)?;
            }
            host.record_plugin_destination(&pkg.name, install_dir)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, link)
}
