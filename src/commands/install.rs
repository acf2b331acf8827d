// Install module for fetching a package from a cloud source

use crate::deps::DependencyKind;
use crate::host::Host;
use crate::package::InstallResult;
use crate::sources;
use crate::sources::PackageSource;
use crate::ui;
use anyhow::bail;

pub async fn install_package(host: &Host, source_arg: &str, name: &str) -> anyhow::Result<i32> {
    let (channel_id, source_name) = crate::cli::split_source_arg(source_arg);

    let Some(source) = sources::find_source(host, channel_id, source_name)? else {
        bail!("No source '{}' in channel '{}'", source_name, channel_id);
    };

    let pb = ui::spinner(&format!("Installing {}", name));
    let result = source.install(host, name).await?;

    if result.ok {
        ui::finish_spinner_success(&pb, &format!("Installed {}", name));
        if let Some(message) = &result.message {
            ui::dim(message);
        }
        Ok(0)
    } else {
        ui::finish_spinner_error(&pb, &format!("Failed to install {}", name));
        report_failure(&result);
        Ok(1)
    }
}

/// Explain a failed install result to the user.
pub fn report_failure(result: &InstallResult) {
    if let Some(message) = &result.message {
        ui::error(message);
    }
    if result.invalid_install_dir {
        ui::error("The package declares an install location outside of the permitted directories.");
    }
    for (name, kind) in &result.failed_dependencies {
        let kind = match kind {
            DependencyKind::PyLib => "python library",
            DependencyKind::Workbench => "workbench",
            DependencyKind::External => "external tool",
        };
        ui::warning(&format!("Missing dependency: {} ({})", name, kind));
    }
    if !result.git_available {
        ui::warning("git is not installed; repository sources fall back to zip downloads.");
    } else if !result.git_version_ok {
        let version = result.git_version.as_deref().unwrap_or("unknown");
        ui::warning(&format!("git {} is older than the supported minimum.", version));
    }
}
