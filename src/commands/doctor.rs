// Doctor module for health checking

#![allow(clippy::print_stdout)]

use crate::archive;
use crate::constants;
use crate::git;
use crate::host::Host;
use crate::sources;
use crate::ui;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct Issue {
    severity: String,
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct GitBackendInfo {
    available: bool,
    version: Option<String>,
    version_ok: bool,
    exe_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ZipBackendInfo {
    available: bool,
}

#[derive(Debug, Serialize)]
struct DirectoriesInfo {
    mod_root: String,
    mod_root_present: bool,
    macro_dir: String,
    macro_dir_present: bool,
    cache_dir: String,
    cache_dir_present: bool,
}

#[derive(Debug, Serialize)]
struct SourcesInfo {
    valid: bool,
    channels: usize,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_version: u32,
    status: String,
    exit_code: i32,
    git: GitBackendInfo,
    zip: ZipBackendInfo,
    directories: DirectoriesInfo,
    sources: SourcesInfo,
    issues: Vec<Issue>,
}

pub fn check_health(host: &Host, json: bool) -> anyhow::Result<i32> {
    let mut issues = Vec::new();

    let git_info = check_git(&mut issues);
    let zip_info = check_zip(&git_info, &mut issues);
    let dirs_info = check_directories(host, &mut issues);
    let sources_info = check_sources(host, &mut issues);

    // Sort issues deterministically by code, then message
    issues.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.message.cmp(&b.message)));

    let has_errors = issues.iter().any(|i| i.severity == "error");
    let has_warnings = issues.iter().any(|i| i.severity == "warning");

    let (status, exit_code) = if has_errors {
        ("error".to_string(), 2)
    } else if has_warnings {
        ("warning".to_string(), 1)
    } else {
        ("ok".to_string(), 0)
    };

    let output = DoctorOutput {
        schema_version: constants::SCHEMA_VERSION,
        status,
        exit_code,
        git: git_info,
        zip: zip_info,
        directories: dirs_info,
        sources: sources_info,
        issues,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        output_human_readable(&output);
    }

    Ok(exit_code)
}

fn check_git(issues: &mut Vec<Issue>) -> GitBackendInfo {
    let info = git::install_info();

    if !info.available {
        issues.push(Issue {
            severity: "warning".to_string(),
            code: "GIT_MISSING".to_string(),
            message: "git is not installed; repository sources fall back to zip downloads"
                .to_string(),
            path: None,
        });
    } else if !info.version_ok {
        let (major, minor, _) = constants::MIN_GIT_VERSION;
        issues.push(Issue {
            severity: "warning".to_string(),
            code: "GIT_TOO_OLD".to_string(),
            message: format!(
                "git {} is older than the supported minimum ({}.{}+)",
                info.version.as_deref().unwrap_or("unknown"),
                major,
                minor + 1
            ),
            path: info
                .exe_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        });
    }

    GitBackendInfo {
        available: info.available,
        version: info.version,
        version_ok: info.version_ok,
        exe_path: info.exe_path.map(|p| p.to_string_lossy().into_owned()),
    }
}

fn check_zip(git_info: &GitBackendInfo, issues: &mut Vec<Issue>) -> ZipBackendInfo {
    let available = archive::is_available();

    if !available {
        // Without git this leaves no install backend at all
        let severity = if git_info.available && git_info.version_ok {
            "warning"
        } else {
            "error"
        };
        issues.push(Issue {
            severity: severity.to_string(),
            code: "ZIP_UNAVAILABLE".to_string(),
            message: "zip archive support is unavailable".to_string(),
            path: None,
        });
    }

    ZipBackendInfo { available }
}

fn check_directories(host: &Host, issues: &mut Vec<Issue>) -> DirectoriesInfo {
    let mod_root = host.mod_root();
    let macro_dir = host.user_macro_dir.clone();
    let cache_dir = host.cache_dir.clone();

    // Mod and cache dirs are created on first install; only the macro
    // dir is worth flagging.
    let macro_dir_present = dir_present(&macro_dir);
    if !macro_dir_present {
        issues.push(Issue {
            severity: "warning".to_string(),
            code: "MACRO_DIR_MISSING".to_string(),
            message: "user macro directory does not exist yet".to_string(),
            path: Some(macro_dir.to_string_lossy().into_owned()),
        });
    }

    DirectoriesInfo {
        mod_root_present: dir_present(&mod_root),
        mod_root: mod_root.to_string_lossy().into_owned(),
        macro_dir_present,
        macro_dir: macro_dir.to_string_lossy().into_owned(),
        cache_dir_present: dir_present(&cache_dir),
        cache_dir: cache_dir.to_string_lossy().into_owned(),
    }
}

fn check_sources(host: &Host, issues: &mut Vec<Issue>) -> SourcesInfo {
    match sources::sources_data(host) {
        Ok(channels) => SourcesInfo {
            valid: true,
            channels: channels.len(),
        },
        Err(e) => {
            issues.push(Issue {
                severity: "error".to_string(),
                code: "SOURCES_INVALID".to_string(),
                message: format!("package source registry is invalid: {}", e),
                path: None,
            });
            SourcesInfo {
                valid: false,
                channels: 0,
            }
        }
    }
}

fn dir_present(path: &Path) -> bool {
    path.is_dir()
}

fn output_human_readable(output: &DoctorOutput) {
    ui::header("Backends");
    if output.git.available {
        let version = output.git.version.as_deref().unwrap_or("unknown");
        if output.git.version_ok {
            ui::success(&format!("git {}", version));
        } else {
            ui::warning(&format!("git {} (too old)", version));
        }
    } else {
        ui::warning("git not found");
    }
    if output.zip.available {
        ui::success("zip archives");
    } else {
        ui::error("zip archives unavailable");
    }

    ui::header("Directories");
    print_dir("Mod root", &output.directories.mod_root, output.directories.mod_root_present);
    print_dir("Macro dir", &output.directories.macro_dir, output.directories.macro_dir_present);
    print_dir("Cache dir", &output.directories.cache_dir, output.directories.cache_dir_present);

    ui::header("Sources");
    if output.sources.valid {
        ui::success(&format!("{} channels configured", output.sources.channels));
    } else {
        ui::error("source registry invalid");
    }

    if !output.issues.is_empty() {
        ui::header("Issues");
        for issue in &output.issues {
            let line = format!("[{}] {}", issue.code, issue.message);
            if issue.severity == "error" {
                ui::error(&line);
            } else {
                ui::warning(&line);
            }
        }
    }

    ui::status("Status:", &output.status);
}

fn print_dir(label: &str, path: &str, present: bool) {
    if present {
        ui::success(&format!("{}: {}", label, path));
    } else {
        ui::dim(&format!("{}: {} (missing)", label, path));
    }
}
