// Version-control backend: drives the external git tool
//
// All operations degrade gracefully: a missing or too-old git makes the
// backend report itself unavailable and callers fall back to the archive
// path. A corrupted checkout is healed by a clean-slate re-clone at the
// cost of local modifications, which installed packages are not expected
// to carry.

use crate::constants::MIN_GIT_VERSION;
use anyhow::{Context, Result, bail};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

lazy_static! {
    static ref VERSION: Regex = Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap();
}

/// Availability snapshot of the version-control backend.
#[derive(Debug, Clone, Default)]
pub struct GitInfo {
    pub available: bool,
    pub exe_path: Option<PathBuf>,
    pub version: Option<String>,
    pub version_ok: bool,
}

impl GitInfo {
    /// Whether the backend can actually be used for clone/update work.
    pub fn usable(&self) -> bool {
        self.available && self.version_ok
    }
}

/// Parse "git version 2.39.2" style output into a comparable triple.
fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    let caps = VERSION.captures(text)?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Detect the git executable and check it against the minimum version
/// floor. Below the floor the backend is reported unavailable even
/// though the executable exists.
pub fn install_info() -> GitInfo {
    let Ok(exe) = which::which("git") else {
        return GitInfo::default();
    };

    let output = Command::new(&exe).arg("--version").output();
    let version_text = match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).to_string(),
        _ => String::new(),
    };

    let parsed = parse_version(&version_text);
    let version = parsed.map(|(a, b, c)| format!("{}.{}.{}", a, b, c));
    let version_ok = parsed.map(|v| v >= MIN_GIT_VERSION).unwrap_or(false);

    GitInfo {
        available: parsed.is_some(),
        exe_path: Some(exe),
        version,
        version_ok,
    }
}

fn run_git(workdir: Option<&Path>, args: &[&str]) -> Result<()> {
    let mut cmd = Command::new("git");
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    let output = cmd.args(args).output().context("Failed to run git")?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Clone `url` into `path`, preferring a shallow fetch. If the path
/// already holds a checkout, degrades to `update`.
pub fn clone(url: &str, path: &Path) -> Result<()> {
    if path.join(".git").exists() {
        return update(path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!("Cloning {} into {}", url, path.display());
    run_git(
        None,
        &["clone", "--depth", "1", url, &path.to_string_lossy()],
    )
}

/// Full (non-shallow) bare clone, used when upgrading a zip install to a
/// git-managed one.
pub fn clone_bare(url: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    run_git(None, &["clone", "--bare", url, &path.to_string_lossy()])
}

fn reset_pull_submodules(path: &Path) -> Result<()> {
    run_git(Some(path), &["reset", "--hard"])?;
    run_git(Some(path), &["pull"])?;
    run_git(
        Some(path),
        &["submodule", "update", "--init", "--recursive"],
    )
}

/// Hard-reset, pull and update submodules. If that fails, re-clone into
/// a temporary location and swap it into place; local edits are lost.
pub fn update(path: &Path) -> Result<()> {
    if !path.join(".git").exists() {
        bail!("Not a git checkout: {}", path.display());
    }

    match reset_pull_submodules(path) {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(
                "Update of {} failed ({}), attempting clean re-clone",
                path.display(),
                err
            );
            let url = origin_url(path).context("No origin URL for re-clone")?;
            let staging = tempfile::tempdir_in(path.parent().unwrap_or(Path::new(".")))?;
            let fresh = staging.path().join("checkout");
            run_git(
                None,
                &["clone", "--depth", "1", &url, &fresh.to_string_lossy()],
            )?;
            std::fs::remove_dir_all(path)?;
            std::fs::rename(&fresh, path)?;
            debug!("Re-cloned {} from {}", path.display(), url);
            Ok(())
        }
    }
}

/// Write one config value in a checkout.
pub fn config_set(path: &Path, section: &str, key: &str, value: &str) -> Result<()> {
    run_git(Some(path), &["config", &format!("{}.{}", section, key), value])
}

/// Configured origin remote of a checkout, if any.
pub fn origin_url(path: &Path) -> Option<String> {
    let output = Command::new("git")
        .current_dir(path)
        .args(["config", "--get", "remote.origin.url"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!url.is_empty()).then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_version_output() {
        assert_eq!(parse_version("git version 2.39.2"), Some((2, 39, 2)));
        assert_eq!(
            parse_version("git version 2.37.1 (Apple Git-137.1)"),
            Some((2, 37, 1))
        );
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn version_floor_is_enforced() {
        assert!((2, 15, 0) >= MIN_GIT_VERSION);
        assert!((2, 14, 0) < MIN_GIT_VERSION);
        assert!((1, 99, 99) < MIN_GIT_VERSION);
    }

    #[test]
    fn update_rejects_non_checkout() {
        let dir = tempfile::tempdir().unwrap();
        assert!(update(dir.path()).is_err());
    }
}
