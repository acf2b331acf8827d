// Cache layer: per-source category listings and per-package metadata,
// stored as JSON with absolute paths rewritten to placeholder tokens so
// a cache written by one installation stays valid in another (AppImage
// style relocations, reinstalls at a different prefix).

use crate::constants::{
    CORE_RES_DIR_TOKEN, CORE_RES_URL_TOKEN, USER_DATA_DIR_TOKEN, USER_DATA_URL_TOKEN,
    USER_MACRO_DIR_TOKEN, USER_MACRO_URL_TOKEN,
};
use crate::host::{Host, path_to_url};
use crate::package::{Package, PackageCategory, PackageKind};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"\W+").unwrap();
}

/// Directory string with a trailing slash, so token substitution is an
/// exact involution when the runtime roots are unchanged.
fn dir_str(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/");
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

fn roots(host: &Host) -> [(String, &'static str, &'static str); 3] {
    [
        (
            dir_str(&host.core_resource_dir),
            CORE_RES_DIR_TOKEN,
            CORE_RES_URL_TOKEN,
        ),
        (
            dir_str(&host.user_data_dir),
            USER_DATA_DIR_TOKEN,
            USER_DATA_URL_TOKEN,
        ),
        (
            dir_str(&host.user_macro_dir),
            USER_MACRO_DIR_TOKEN,
            USER_MACRO_URL_TOKEN,
        ),
    ]
}

/// Replace absolute host paths (and their URL forms) with placeholder
/// tokens before writing cache content.
pub fn remove_absolute_paths(host: &Host, content: &str) -> String {
    let mut content = content.to_string();
    for (dir, dir_token, url_token) in roots(host) {
        // URL form first: it contains the plain dir as a substring.
        let url = path_to_url(Path::new(dir.trim_end_matches('/')));
        content = content.replace(&format!("{}/", url), url_token);
        content = content.replace(&dir, dir_token);
    }
    content
}

/// Substitute the current runtime paths back into cache content.
pub fn restore_absolute_paths(host: &Host, content: &str) -> String {
    let mut content = content.to_string();
    for (dir, dir_token, url_token) in roots(host) {
        let url = format!("{}/", path_to_url(Path::new(dir.trim_end_matches('/'))));
        content = content.replace(url_token, &url);
        content = content.replace(dir_token, &dir);
    }
    content
}

/// Cache file for one cloud source's category listing, keyed by the
/// sanitized `{channel_id}-{source_name}`.
pub fn source_cache_file(host: &Host, channel_id: &str, source_name: &str) -> PathBuf {
    let key = NON_WORD
        .replace_all(&format!("{}-{}", channel_id, source_name), "-")
        .to_string();
    host.cache_dir.join(format!("{}.json", key))
}

pub fn store_categories(
    host: &Host,
    channel_id: &str,
    source_name: &str,
    categories: &[PackageCategory],
) -> Result<()> {
    std::fs::create_dir_all(&host.cache_dir)?;
    let file = source_cache_file(host, channel_id, source_name);
    let content = serde_json::to_string_pretty(categories)?;
    std::fs::write(&file, remove_absolute_paths(host, &content))
        .with_context(|| format!("Failed to write listing cache {}", file.display()))
}

pub fn load_categories(
    host: &Host,
    channel_id: &str,
    source_name: &str,
) -> Option<Vec<PackageCategory>> {
    let file = source_cache_file(host, channel_id, source_name);
    let content = std::fs::read_to_string(&file).ok()?;
    match serde_json::from_str(&restore_absolute_paths(host, &content)) {
        Ok(categories) => Some(categories),
        Err(err) => {
            debug!("Discarding unreadable cache {}: {}", file.display(), err);
            None
        }
    }
}

/// Manual invalidation: `update_package_list` deletes the cache file and
/// the next read recomputes from the protocol.
pub fn invalidate(host: &Host, channel_id: &str, source_name: &str) {
    let file = source_cache_file(host, channel_id, source_name);
    let _ = std::fs::remove_file(file);
}

/// Metadata cache file for one package, keyed by its stable identity:
/// macro file stem (lowercased) or module name.
pub fn package_cache_file(host: &Host, pkg: &Package) -> Option<PathBuf> {
    match pkg.kind {
        PackageKind::Macro => {
            let stem = pkg.install_file.as_ref()?.file_name()?.to_str()?.to_lowercase();
            Some(host.cache_dir.join("Macro").join(format!("{}.json", stem)))
        }
        PackageKind::Mod | PackageKind::Workbench => Some(
            host.cache_dir
                .join("Mod")
                .join(format!("{}.json", pkg.name)),
        ),
    }
}

/// Persist a package's analyzed metadata so re-scans skip the manifest /
/// readme / git-origin introspection.
pub fn save_package_metadata(host: &Host, pkg: &Package) -> Result<()> {
    let Some(file) = package_cache_file(host, pkg) else {
        return Ok(());
    };
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(pkg)?;
    std::fs::write(&file, remove_absolute_paths(host, &content))
        .with_context(|| format!("Failed to write package cache {}", file.display()))
}

/// Load cached metadata into `pkg`. Returns whether a cache entry was
/// found and applied.
pub fn load_package_metadata(host: &Host, pkg: &mut Package) -> bool {
    let Some(file) = package_cache_file(host, pkg) else {
        return false;
    };
    let Ok(content) = std::fs::read_to_string(&file) else {
        return false;
    };
    match serde_json::from_str::<Package>(&restore_absolute_paths(host, &content)) {
        Ok(cached) => {
            *pkg = cached;
            true
        }
        Err(err) => {
            debug!("Discarding unreadable cache {}: {}", file.display(), err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageKind;
    use tempfile::TempDir;

    #[test]
    fn path_tokens_are_an_involution() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let content = format!(
            r#"{{"a":"{}/Mod/Sample","b":"{}/Sample.FCMacro","c":"{}"}}"#,
            host.user_data_dir.display(),
            host.user_macro_dir.display(),
            path_to_url(&host.user_macro_dir.join("x"))
        );
        let tokenized = remove_absolute_paths(&host, &content);
        assert!(!tokenized.contains(dir.path().to_str().unwrap()));
        assert!(tokenized.contains(USER_DATA_DIR_TOKEN));
        assert!(tokenized.contains(USER_MACRO_URL_TOKEN));
        assert_eq!(restore_absolute_paths(&host, &tokenized), content);
    }

    #[test]
    fn tokens_restore_under_relocated_roots() {
        let old = TempDir::new().unwrap();
        let new = TempDir::new().unwrap();
        let old_host = Host::for_root(old.path());
        let new_host = Host::for_root(new.path());

        let content = format!("{}/Mod/Sample", old_host.user_data_dir.display());
        let tokenized = remove_absolute_paths(&old_host, &content);
        let restored = restore_absolute_paths(&new_host, &tokenized);
        assert_eq!(
            restored,
            format!("{}/Mod/Sample", new_host.user_data_dir.display())
        );
    }

    #[test]
    fn cache_file_key_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let file = source_cache_file(&host, "default", "A source (mods)");
        assert_eq!(
            file.file_name().unwrap().to_str().unwrap(),
            "default-A-source-mods-.json"
        );
    }

    #[test]
    fn category_cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let pkg = Package {
            key: "Sample".into(),
            name: "Sample".into(),
            kind: PackageKind::Workbench,
            install_dir: Some(host.mod_root().join("Sample")),
            ..Package::default()
        };
        let cat = PackageCategory {
            name: "CAD/CAM".into(),
            packages: vec![pkg],
        };

        store_categories(&host, "default", "mods", &[cat]).unwrap();
        let loaded = load_categories(&host, "default", "mods").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].packages[0].key, "Sample");
        assert_eq!(
            loaded[0].packages[0].install_dir,
            Some(host.mod_root().join("Sample"))
        );

        invalidate(&host, "default", "mods");
        assert!(load_categories(&host, "default", "mods").is_none());
    }

    #[test]
    fn package_metadata_roundtrip_by_identity() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let pkg = Package {
            key: "SampleWorkbench".into(),
            name: "Sample".into(),
            kind: PackageKind::Mod,
            description: Some("cached".into()),
            ..Package::default()
        };
        save_package_metadata(&host, &pkg).unwrap();

        let mut fresh = Package {
            key: String::new(),
            name: "Sample".into(),
            kind: PackageKind::Mod,
            ..Package::default()
        };
        assert!(load_package_metadata(&host, &mut fresh));
        assert_eq!(fresh.key, "SampleWorkbench");
        assert_eq!(fresh.description.as_deref(), Some("cached"));
    }
}
