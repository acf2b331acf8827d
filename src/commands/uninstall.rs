// Uninstall module for removing locally installed packages

use crate::host::Host;
use crate::sources::{InstalledPackageSource, PackageSource};
use crate::ui;

pub async fn uninstall_package(host: &Host, name: &str) -> anyhow::Result<i32> {
    let source = InstalledPackageSource::new();
    let result = source.uninstall(host, name).await?;

    if result.ok {
        ui::success(&format!("Uninstalled {}", name));
        Ok(0)
    } else {
        ui::error(
            result
                .message
                .as_deref()
                .unwrap_or("The package could not be uninstalled."),
        );
        Ok(1)
    }
}
