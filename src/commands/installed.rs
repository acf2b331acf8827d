// Installed module for listing locally installed packages

use crate::host::Host;
use crate::sources::{InstalledPackageSource, PackageSource};
use crate::ui;

pub async fn list_installed(host: &Host, show_core: bool) -> anyhow::Result<()> {
    let source = InstalledPackageSource { show_core_packages: show_core };
    let packages = source.get_packages(host).await;

    if packages.is_empty() {
        ui::dim("No packages installed.");
        return Ok(());
    }

    for pkg in &packages {
        let mut line = format!("{} ({})", pkg.display_title(), pkg.kind.flag_key());
        if let Some(version) = &pkg.version {
            line.push_str(&format!(" {}", version));
        }
        if pkg.is_core {
            line.push_str(" [core]");
        }
        ui::action(&line);
        if let Some(description) = &pkg.description {
            ui::dim(&format!("  {}", description));
        }
    }

    Ok(())
}
