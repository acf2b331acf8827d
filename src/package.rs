// Package data model: installable units, categories and install outcomes

use crate::constants::{LIBRARIES, OTHER, UNCATEGORIZED};
use crate::deps::DependencyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Kind of installable unit. `Workbench` is a module with a registered
/// host plugin; for flag lookups it folds into `Mod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    Mod,
    Workbench,
    Macro,
}

impl PackageKind {
    pub fn is_module(&self) -> bool {
        matches!(self, PackageKind::Mod | PackageKind::Workbench)
    }

    /// Key prefix used by the predefined flags table and the metadata cache.
    pub fn flag_key(&self) -> &'static str {
        match self {
            PackageKind::Mod | PackageKind::Workbench => "Mod",
            PackageKind::Macro => "Macro",
        }
    }
}

/// Markup format of a package readme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadmeFormat {
    Markdown,
    Mediawiki,
    Html,
}

/// One installable unit: a directory-based module/workbench or a
/// single-file macro. Constructed by a protocol (remote) or by local
/// filesystem introspection, then enriched by manifest parsing and the
/// predefined flags table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Package {
    /// Stable install identity (resolved plugin class name for modules,
    /// install path stem for macros).
    pub key: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: PackageKind,
    /// Install target for modules (and base dir for macro companions).
    pub install_dir: Option<PathBuf>,
    /// Install target for macros.
    pub install_file: Option<PathBuf>,
    /// For macros: root of the source tree the file was materialized into.
    pub base_path: Option<PathBuf>,
    pub icon: Option<String>,
    /// Ordered icon fallback candidates. Availability of each is only
    /// discovered at render time, so all of them are kept.
    pub icon_sources: Vec<String>,
    pub is_core: bool,
    pub is_git: bool,
    pub is_wiki: bool,
    /// For macros: skip the install confirmation prompt.
    pub marked_as_safe: bool,
    pub categories: Vec<String>,
    pub date: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    /// Version-control URL.
    pub git: Option<String>,
    pub dependencies: Option<BTreeMap<String, String>>,
    pub homepage: Option<String>,
    /// Arbitrary flag set: "obsolete", "banned", "py2only", ...
    pub flags: BTreeMap<String, bool>,
    pub readme_url: Option<String>,
    pub readme_format: ReadmeFormat,
    /// For macros: declared companion files, relative to `base_path`.
    pub files: Vec<String>,
    /// Source ownership: which channel/source produced this package.
    pub channel_id: Option<String>,
    pub source_name: Option<String>,
}

impl Default for Package {
    fn default() -> Self {
        Self {
            key: String::new(),
            name: String::new(),
            title: None,
            description: None,
            kind: PackageKind::Mod,
            install_dir: None,
            install_file: None,
            base_path: None,
            icon: None,
            icon_sources: Vec::new(),
            is_core: false,
            is_git: false,
            is_wiki: false,
            marked_as_safe: false,
            categories: vec![UNCATEGORIZED.to_string()],
            date: None,
            version: None,
            author: None,
            git: None,
            dependencies: None,
            homepage: None,
            flags: BTreeMap::new(),
            readme_url: None,
            readme_format: ReadmeFormat::Markdown,
            files: Vec::new(),
            channel_id: None,
            source_name: None,
        }
    }
}

impl Package {
    pub fn is_installed(&self) -> bool {
        match self.kind {
            PackageKind::Mod | PackageKind::Workbench => self
                .install_dir
                .as_ref()
                .map(|d| d.exists())
                .unwrap_or(false),
            PackageKind::Macro => self
                .install_file
                .as_ref()
                .map(|f| f.exists())
                .unwrap_or(false),
        }
    }

    /// Display title, falling back to the package name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }
}

/// A named bucket of packages for display grouping. A package may appear
/// in several categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageCategory {
    pub name: String,
    pub packages: Vec<Package>,
}

impl PackageCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: Vec::new(),
        }
    }
}

/// Outcome record for one install/update/uninstall call. Never mutated
/// after return.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallResult {
    pub ok: bool,
    /// User-facing message, possibly HTML.
    pub message: Option<String>,
    pub failed_dependencies: Vec<(String, DependencyKind)>,
    /// Set when the install target escaped the permitted roots.
    pub invalid_install_dir: bool,
    pub git_available: bool,
    /// The original host also probed a scripting binding for the
    /// version-control tool; here it mirrors tool presence.
    pub git_python_available: bool,
    pub git_version_ok: bool,
    pub git_version: Option<String>,
    pub zip_available: bool,
}

impl InstallResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Group packages into display categories.
///
/// A module whose only category is "Uncategorized" is regrouped under
/// "Libraries". The reserved names "Uncategorized", "Libraries" and
/// "Other" sort after everything else regardless of alphabet.
pub fn group_packages_in_categories(packages: Vec<Package>) -> Vec<PackageCategory> {
    let mut categories: Vec<PackageCategory> = Vec::new();

    for pkg in packages {
        if pkg.categories.is_empty() {
            continue;
        }

        let names: Vec<String> = if pkg.kind.is_module()
            && pkg.categories.len() == 1
            && pkg.categories[0].eq_ignore_ascii_case(UNCATEGORIZED)
        {
            vec![LIBRARIES.to_string()]
        } else {
            pkg.categories.clone()
        };

        for name in names {
            match categories.iter_mut().find(|c| c.name == name) {
                Some(cat) => cat.packages.push(pkg.clone()),
                None => {
                    let mut cat = PackageCategory::new(name);
                    cat.packages.push(pkg.clone());
                    categories.push(cat);
                }
            }
        }
    }

    categories.sort_by_key(|c| {
        if c.name == UNCATEGORIZED || c.name == LIBRARIES || c.name == OTHER {
            ("zzzz".to_string(), c.name.to_lowercase())
        } else {
            (c.name.to_lowercase(), String::new())
        }
    });
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, categories: &[&str]) -> Package {
        Package {
            key: name.to_string(),
            name: name.to_string(),
            kind: PackageKind::Mod,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Package::default()
        }
    }

    #[test]
    fn uncategorized_module_regroups_under_libraries() {
        let cats = group_packages_in_categories(vec![module("a", &[UNCATEGORIZED])]);
        assert_eq!(cats.len(), 1);
        assert_eq!(cats[0].name, LIBRARIES);
        assert_eq!(cats[0].packages.len(), 1);
    }

    #[test]
    fn explicit_categories_kept_verbatim() {
        let cats = group_packages_in_categories(vec![module("a", &["CAD/CAM", "Analysis"])]);
        let names: Vec<_> = cats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Analysis", "CAD/CAM"]);
    }

    #[test]
    fn reserved_categories_sort_last() {
        let cats = group_packages_in_categories(vec![
            module("z", &["Zoo"]),
            module("o", &[OTHER]),
            module("l", &["Analysis", LIBRARIES]),
        ]);
        let names: Vec<_> = cats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Analysis", "Zoo", LIBRARIES, OTHER]);
    }

    #[test]
    fn macro_with_uncategorized_stays() {
        let mut pkg = module("m", &[UNCATEGORIZED]);
        pkg.kind = PackageKind::Macro;
        let cats = group_packages_in_categories(vec![pkg]);
        assert_eq!(cats[0].name, UNCATEGORIZED);
    }

    #[test]
    fn package_roundtrip_preserves_identity() {
        let mut pkg = module("RoundTrip", &["CAD/CAM"]);
        pkg.kind = PackageKind::Workbench;
        pkg.install_dir = Some(PathBuf::from("/data/Mod/RoundTrip"));
        pkg.flags.insert("obsolete".to_string(), true);

        let json = serde_json::to_string(&pkg).unwrap();
        let back: Package = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, pkg.key);
        assert_eq!(back.kind, pkg.kind);
        assert_eq!(back.install_dir, pkg.install_dir);
        assert_eq!(back.categories, pkg.categories);
        assert!(back.has_flag("obsolete"));
    }

    #[test]
    fn deserialize_tolerates_missing_fields() {
        let pkg: Package = serde_json::from_str(r#"{"key":"X","name":"X"}"#).unwrap();
        assert_eq!(pkg.categories, vec![UNCATEGORIZED.to_string()]);
        assert!(pkg.flags.is_empty());
    }
}
