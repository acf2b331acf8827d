// Manifest module for parsing package-supplied configuration files
//
// Accepted format is INI-like: `[section]` headers followed by
// `key = value` lines. Known sections are `general`, `dependencies`,
// `install` and `git`; anything else is captured as an extra section.
// A malformed manifest yields an empty manifest, never an error.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref SECTION: Regex = Regex::new(r"^\s*\[\s*(?P<name>[^\]]+?)\s*\]\s*$").unwrap();
    static ref KEY_VALUE: Regex =
        Regex::new(r"^\s*(?P<key>[A-Za-z0-9_.\-]+)\s*[=:]\s*(?P<value>.*?)\s*$").unwrap();
    static ref STRIP_TAGS: Regex = Regex::new(r"<[^>]+>|<!--(?s:.)*").unwrap();
    static ref COMMA_SEP: Regex = Regex::new(r"\s*,\s*").unwrap();
}

/// Remove markup from a manifest value. Values end up in rendered HTML,
/// so tags are never taken verbatim from package authors.
pub fn sanitized_html(value: &str) -> String {
    STRIP_TAGS.replace_all(value, "").trim().to_string()
}

/// Split a comma-separated value into trimmed, non-empty items.
pub fn comma_string_list(value: &str) -> Vec<String> {
    COMMA_SEP
        .split(value.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub type ManifestSection = BTreeMap<String, String>;

/// Parsed package manifest.
#[derive(Debug, Clone, Default)]
pub struct ExtensionManifest {
    pub general: ManifestSection,
    pub dependencies: Option<ManifestSection>,
    pub install: Option<ManifestSection>,
    pub git: Option<ManifestSection>,
    /// Unknown sections, kept for protocol-specific blocks.
    pub extra: BTreeMap<String, ManifestSection>,
}

impl ExtensionManifest {
    pub fn parse(content: &str) -> Self {
        let mut manifest = Self::default();
        let mut current: Option<String> = None;
        let mut section = ManifestSection::new();

        let mut flush = |name: Option<String>, section: ManifestSection| {
            let Some(name) = name else { return };
            match name.as_str() {
                "general" => manifest.general = section,
                "dependencies" => manifest.dependencies = Some(section),
                "install" => manifest.install = Some(section),
                "git" => manifest.git = Some(section),
                _ => {
                    manifest.extra.insert(name, section);
                }
            }
        };

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if let Some(m) = SECTION.captures(line) {
                flush(current.take(), std::mem::take(&mut section));
                current = Some(m["name"].to_lowercase());
            } else if let Some(m) = KEY_VALUE.captures(line) {
                if current.is_some() {
                    section.insert(m["key"].to_lowercase(), sanitized_html(&m["value"]));
                }
                // Keys before any section header are dropped
            }
        }
        flush(current, section);
        manifest
    }

    /// `general.categories`, normalized from a comma string to a list.
    pub fn categories(&self) -> Option<Vec<String>> {
        self.general.get("categories").map(|c| comma_string_list(c))
    }

    pub fn general_value(&self, key: &str) -> Option<&str> {
        self.general.get(key).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[general]
name = Sample Workbench
version = 1.2.0
description = Does <b>things</b>
categories = CAD/CAM, Analysis
iconPath = resources/icon.svg

[dependencies]
pylibs = numpy, scipy
workbenches = Draft
external = openscad

[git]
branch = master

[custom-block]
whatever = 42
";

    #[test]
    fn parses_sections_and_values() {
        let m = ExtensionManifest::parse(SAMPLE);
        assert_eq!(m.general_value("name"), Some("Sample Workbench"));
        assert_eq!(m.general_value("version"), Some("1.2.0"));
        let deps = m.dependencies.as_ref().unwrap();
        assert_eq!(deps.get("pylibs").unwrap(), "numpy, scipy");
        assert_eq!(m.git.as_ref().unwrap().get("branch").unwrap(), "master");
        assert_eq!(m.extra["custom-block"].get("whatever").unwrap(), "42");
    }

    #[test]
    fn strips_html_from_values() {
        let m = ExtensionManifest::parse(SAMPLE);
        assert_eq!(m.general_value("description"), Some("Does things"));
    }

    #[test]
    fn categories_normalize_comma_string() {
        let m = ExtensionManifest::parse(SAMPLE);
        assert_eq!(m.categories().unwrap(), vec!["CAD/CAM", "Analysis"]);
    }

    #[test]
    fn keys_are_lowercased() {
        let m = ExtensionManifest::parse(SAMPLE);
        assert_eq!(m.general_value("iconpath"), Some("resources/icon.svg"));
    }

    #[test]
    fn malformed_content_yields_empty_manifest() {
        let m = ExtensionManifest::parse("not an ini file at all\n{{{");
        assert!(m.general.is_empty());
        assert!(m.dependencies.is_none());
    }

    #[test]
    fn comma_list_trims_and_drops_empty() {
        assert_eq!(comma_string_list("a , b,,c "), vec!["a", "b", "c"]);
        assert!(comma_string_list("  ").is_empty());
    }
}
