// Curated package flags: obsolete / banned / py2only overrides
//
// Upstream package authors cannot be relied on to self-report
// deprecation, so a table shipped with the application force-annotates
// known-problematic third-party packages independent of what they
// declare themselves.

use crate::package::Package;
use lazy_static::lazy_static;
use log::warn;
use serde::Deserialize;
use std::collections::BTreeMap;

const FLAGS_JSON: &str = include_str!("../resources/data/flags.json");

#[derive(Debug, Default, Deserialize)]
struct FlagEntry {
    #[serde(rename = "Mod", default)]
    mods: Vec<String>,
    #[serde(rename = "Macro", default)]
    macros: Vec<String>,
}

lazy_static! {
    /// `{kind}:{lowercased name}` -> set flag ids, inverted from the
    /// packaged `{flagId: {Mod: [...], Macro: [...]}}` table.
    static ref FLAGS_DB: BTreeMap<String, BTreeMap<String, bool>> = {
        let parsed: BTreeMap<String, FlagEntry> = match serde_json::from_str(FLAGS_JSON) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Packaged flags table is unreadable: {}", err);
                BTreeMap::new()
            }
        };
        let mut db: BTreeMap<String, BTreeMap<String, bool>> = BTreeMap::new();
        for (flag_id, entry) in parsed {
            let items = entry
                .mods
                .iter()
                .map(|n| ("Mod", n))
                .chain(entry.macros.iter().map(|n| ("Macro", n)));
            for (kind, name) in items {
                db.entry(format!("{}:{}", kind, name.to_lowercase()))
                    .or_default()
                    .insert(flag_id.clone(), true);
            }
        }
        db
    };
}

/// Merge the curated flags for this package's kind and name into its
/// flag map. Workbench packages look up under the Mod key space.
pub fn apply_predefined_flags(pkg: &mut Package) {
    let key = format!("{}:{}", pkg.kind.flag_key(), pkg.name.to_lowercase());
    if let Some(flags) = FLAGS_DB.get(&key) {
        for (flag, value) in flags {
            pkg.flags.insert(flag.clone(), *value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageKind;

    fn pkg(name: &str, kind: PackageKind) -> Package {
        Package {
            key: name.to_string(),
            name: name.to_string(),
            kind,
            ..Package::default()
        }
    }

    #[test]
    fn known_obsolete_module_is_flagged() {
        let mut p = pkg("drawing_dimensioning", PackageKind::Mod);
        apply_predefined_flags(&mut p);
        assert!(p.has_flag("obsolete"));
    }

    #[test]
    fn lookup_is_case_insensitive_on_name() {
        let mut p = pkg("Drawing_Dimensioning", PackageKind::Mod);
        apply_predefined_flags(&mut p);
        assert!(p.has_flag("obsolete"));
    }

    #[test]
    fn workbench_kind_folds_into_mod() {
        let mut p = pkg("drawing_dimensioning", PackageKind::Workbench);
        apply_predefined_flags(&mut p);
        assert!(p.has_flag("obsolete"));
    }

    #[test]
    fn unknown_package_keeps_existing_flags() {
        let mut p = pkg("totally_fine_wb", PackageKind::Mod);
        p.flags.insert("local".into(), true);
        apply_predefined_flags(&mut p);
        assert_eq!(p.flags.len(), 1);
        assert!(p.has_flag("local"));
    }
}
