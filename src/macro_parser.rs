// Macro metadata parser: `__tag__ = "value"` lines in macro source files

use crate::constants::UNCATEGORIZED;
use crate::host::{Host, path_to_url};
use crate::manifest::comma_string_list;
use crate::package::{Package, PackageKind, ReadmeFormat};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

lazy_static! {
    // Single or triple quoted values; quotes of the matching style are
    // not allowed inside the value, which matches how macro authors
    // actually write these tags.
    static ref MACRO_TAG: Regex = Regex::new(
        r#"(?m)^\s*__(?P<tag>\w+?)__\s*=\s*(?:"""(?P<tdq>[^"]+?)"""|'''(?P<tsq>[^']+?)'''|"(?P<dq>[^"]+?)"|'(?P<sq>[^']+?)')"#
    )
    .unwrap();
    static ref STRIP_TAGS: Regex = Regex::new(r"<[^>]+>").unwrap();
}

/// Tag names recognized in macro files. Anything else is ignored, not an
/// error.
const MACRO_TAG_FILTER: &[&str] = &[
    "name", "title", "author", "version", "date", "comment", "web", "wiki", "icon", "license",
    "help", "status", "requires", "categories", "download", "files", "description", "readme",
];

/// Extract the recognized `__tag__` values from macro source code.
pub fn get_macro_tags(code: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    for caps in MACRO_TAG.captures_iter(code) {
        let tag = caps["tag"].to_lowercase();
        if !MACRO_TAG_FILTER.contains(&tag.as_str()) {
            continue;
        }
        let value = caps
            .name("tdq")
            .or_else(|| caps.name("tsq"))
            .or_else(|| caps.name("dq"))
            .or_else(|| caps.name("sq"))
            .map(|m| STRIP_TAGS.replace_all(m.as_str(), "").trim().to_string());
        if let Some(value) = value {
            tags.insert(tag, value);
        }
    }
    tags
}

/// Build a macro Package from a source file on disk, reading its in-file
/// metadata tags.
#[allow(clippy::too_many_arguments)]
pub fn build_macro_package(
    host: &Host,
    path: &Path,
    file_stem: &str,
    is_core: bool,
    is_git: bool,
    is_wiki: bool,
    base_path: Option<&Path>,
) -> Result<Package> {
    let code = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read macro {}", path.display()))?;
    let tags = get_macro_tags(&code);

    let install_dir = host.user_macro_dir.clone();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("{}.FCMacro", file_stem));
    let install_file = install_dir.join(&file_name);

    let mut pkg = Package {
        key: install_file.to_string_lossy().to_string(),
        name: file_stem.to_string(),
        kind: PackageKind::Macro,
        is_core,
        is_git,
        is_wiki,
        install_dir: Some(install_dir),
        install_file: Some(install_file),
        base_path: base_path.map(|p| p.to_path_buf()),
        ..Package::default()
    };

    pkg.title = Some(
        tags.get("title")
            .or_else(|| tags.get("name"))
            .cloned()
            .unwrap_or_else(|| file_stem.to_string()),
    );
    pkg.version = tags.get("version").cloned();
    pkg.date = tags.get("date").cloned();
    pkg.author = tags.get("author").cloned();
    pkg.homepage = tags.get("web").cloned();

    pkg.description = tags
        .get("comment")
        .or_else(|| tags.get("description"))
        .cloned()
        .or_else(|| Some("Warning! No description".to_string()));

    pkg.categories = match tags.get("categories") {
        Some(cats) => comma_string_list(cats),
        None => vec![UNCATEGORIZED.to_string()],
    };

    if let Some(files) = tags.get("files") {
        pkg.files = comma_string_list(files);
    }

    // Icon must exist locally to be useful; otherwise fall back to the
    // stock macro icon shipped with the host.
    pkg.icon = Some(match tags.get("icon") {
        Some(icon) if Path::new(icon).exists() => path_to_url(Path::new(icon)),
        _ => path_to_url(&host.core_resource_dir.join("icons").join("package_macro.svg")),
    });

    let readme = tags
        .get("readme")
        .or_else(|| tags.get("wiki"))
        .or_else(|| tags.get("web"));
    if let Some(url) = readme {
        pkg.readme_url = Some(url.clone());
        pkg.readme_format = ReadmeFormat::Html;
    }

    Ok(pkg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
__title__ = "Foo"
__version__ = '1.2'
__author__ = "Someone"
__comment__ = "Draws a foo"
__categories__ = "CAD/CAM, Utilities"
__files__ = "helper.py, data/shapes.csv"
__wiki__ = "https://wiki.example.org/Macro_Foo"
__bogus__ = "x"
"#;

    #[test]
    fn recognized_tags_are_extracted() {
        let tags = get_macro_tags(SAMPLE);
        assert_eq!(tags.get("title").unwrap(), "Foo");
        assert_eq!(tags.get("version").unwrap(), "1.2");
        assert_eq!(tags.get("author").unwrap(), "Someone");
    }

    #[test]
    fn unrecognized_tags_are_ignored() {
        let tags = get_macro_tags(SAMPLE);
        assert!(!tags.contains_key("bogus"));
    }

    #[test]
    fn triple_quoted_values_work() {
        let tags = get_macro_tags(r#"__comment__ = """multi word comment""""#);
        assert_eq!(tags.get("comment").unwrap(), "multi word comment");
    }

    #[test]
    fn build_package_from_file() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let macro_path = dir.path().join("Foo.FCMacro");
        std::fs::write(&macro_path, SAMPLE).unwrap();

        let pkg =
            build_macro_package(&host, &macro_path, "Foo", false, true, false, None).unwrap();
        assert_eq!(pkg.kind, PackageKind::Macro);
        assert_eq!(pkg.name, "Foo");
        assert_eq!(pkg.title.as_deref(), Some("Foo"));
        assert_eq!(pkg.version.as_deref(), Some("1.2"));
        assert_eq!(pkg.description.as_deref(), Some("Draws a foo"));
        assert_eq!(pkg.categories, vec!["CAD/CAM", "Utilities"]);
        assert_eq!(pkg.files, vec!["helper.py", "data/shapes.csv"]);
        assert_eq!(
            pkg.install_file,
            Some(host.user_macro_dir.join("Foo.FCMacro"))
        );
        assert_eq!(pkg.readme_format, ReadmeFormat::Html);
        assert!(pkg.is_git);
    }

    #[test]
    fn missing_tags_get_defaults() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        let macro_path = dir.path().join("Bare.FCMacro");
        std::fs::write(&macro_path, "print('hi')\n").unwrap();

        let pkg =
            build_macro_package(&host, &macro_path, "Bare", false, false, false, None).unwrap();
        assert_eq!(pkg.title.as_deref(), Some("Bare"));
        assert_eq!(pkg.description.as_deref(), Some("Warning! No description"));
        assert_eq!(pkg.categories, vec![UNCATEGORIZED.to_string()]);
    }
}
