// Dependency checking for manifest-declared prerequisites

use crate::host::Host;
use crate::manifest::{ExtensionManifest, comma_string_list};
use log::debug;
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};

/// Kind of a declared prerequisite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Importable library in the host's scripting runtime.
    PyLib,
    /// Host plugin registered by key.
    Workbench,
    /// Executable reachable on PATH.
    External,
}

/// Probe the host's scripting runtime for an importable library.
pub fn is_python_lib_available(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return false;
    }
    let interpreter = which::which("python3")
        .or_else(|_| which::which("python"))
        .ok();
    match interpreter {
        Some(python) => Command::new(python)
            .arg("-c")
            .arg(format!("import {}", name))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false),
        None => false,
    }
}

/// A workbench is available if its exact name is registered, or the
/// conventional `<name>Workbench` key is.
pub fn is_workbench_available(name: &str, keys: &[String]) -> bool {
    let name = name.trim();
    keys.iter()
        .any(|k| k == name || *k == format!("{}Workbench", name))
}

pub fn is_executable_available(name: &str) -> bool {
    which::which(name.trim()).is_ok()
}

/// Validate every prerequisite declared in the manifest's
/// `[dependencies]` section. Each comma-separated list is checked
/// independently; absence of the section is vacuously satisfied.
pub fn check_dependencies(
    manifest: &ExtensionManifest,
    host: &Host,
) -> (bool, Vec<(String, DependencyKind)>) {
    let mut unmet = Vec::new();

    let Some(deps) = manifest.dependencies.as_ref() else {
        return (true, unmet);
    };

    if let Some(pylibs) = deps.get("pylibs") {
        for dep in comma_string_list(pylibs) {
            if !is_python_lib_available(&dep) {
                debug!("unmet scripting library dependency: {}", dep);
                unmet.push((dep, DependencyKind::PyLib));
            }
        }
    }

    if let Some(workbenches) = deps.get("workbenches") {
        let keys = host.workbenches();
        for dep in comma_string_list(workbenches) {
            if !is_workbench_available(&dep, &keys) {
                debug!("unmet workbench dependency: {}", dep);
                unmet.push((dep, DependencyKind::Workbench));
            }
        }
    }

    if let Some(external) = deps.get("external") {
        for dep in comma_string_list(external) {
            if !is_executable_available(&dep) {
                debug!("unmet external tool dependency: {}", dep);
                unmet.push((dep, DependencyKind::External));
            }
        }
    }

    (unmet.is_empty(), unmet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::manifest::ExtensionManifest;
    use tempfile::TempDir;

    fn test_host(dir: &TempDir) -> Host {
        Host::for_root(dir.path())
    }

    #[test]
    fn missing_dependencies_section_is_satisfied() {
        let dir = TempDir::new().unwrap();
        let m = ExtensionManifest::parse("[general]\nname = x\n");
        let (ok, unmet) = check_dependencies(&m, &test_host(&dir));
        assert!(ok);
        assert!(unmet.is_empty());
    }

    #[test]
    fn nonexistent_pylib_is_reported() {
        let dir = TempDir::new().unwrap();
        let m = ExtensionManifest::parse("[dependencies]\npylibs = nonexistent_xyz123\n");
        let (ok, unmet) = check_dependencies(&m, &test_host(&dir));
        assert!(!ok);
        assert_eq!(
            unmet,
            vec![("nonexistent_xyz123".to_string(), DependencyKind::PyLib)]
        );
    }

    #[test]
    fn nonexistent_executable_is_reported() {
        let dir = TempDir::new().unwrap();
        let m = ExtensionManifest::parse("[dependencies]\nexternal = no-such-binary-xyz123\n");
        let (ok, unmet) = check_dependencies(&m, &test_host(&dir));
        assert!(!ok);
        assert_eq!(unmet[0].1, DependencyKind::External);
    }

    #[test]
    fn workbench_matches_with_suffix() {
        let keys = vec!["DraftWorkbench".to_string()];
        assert!(is_workbench_available("Draft", &keys));
        assert!(is_workbench_available("DraftWorkbench", &keys));
        assert!(!is_workbench_available("Sketcher", &keys));
    }
}
