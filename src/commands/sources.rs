// Sources module for listing the configured package registry

use crate::host::Host;
use crate::sources;
use crate::sources::PackageSource;
use crate::ui;

pub fn list_sources(host: &Host) -> anyhow::Result<()> {
    let channels = sources::find_cloud_channels(host)?;

    for channel in &channels {
        ui::header(&format!("{} ({})", channel.name, channel.id));
        for source in &channel.sources {
            ui::status(
                &format!("  {}:{}", channel.id, source.name()),
                source.description(),
            );
        }
    }

    if channels.is_empty() {
        ui::dim("No package sources configured.");
    }

    Ok(())
}
