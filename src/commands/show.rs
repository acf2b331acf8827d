// Show module for the detail view of one package

use crate::host::Host;
use crate::sources;
use crate::sources::PackageSource;
use crate::ui;
use anyhow::bail;

pub async fn show_package(host: &Host, source_arg: &str, name: &str) -> anyhow::Result<i32> {
    let (channel_id, source_name) = crate::cli::split_source_arg(source_arg);

    let Some(source) = sources::find_source(host, channel_id, source_name)? else {
        bail!("No source '{}' in channel '{}'", source_name, channel_id);
    };

    let pb = ui::spinner(&format!("Looking up {}", name));
    let Some(pkg) = source.find_package_by_name(host, name).await else {
        ui::finish_spinner_error(&pb, &format!("No package '{}' in {}", name, source_arg));
        return Ok(1);
    };
    ui::finish_spinner_success(&pb, pkg.display_title());

    if let Some(description) = &pkg.description {
        ui::dim(description);
    }
    ui::status("Kind:", pkg.kind.flag_key());
    ui::status("Key:", &pkg.key);
    if let Some(version) = &pkg.version {
        ui::status("Version:", version);
    }
    if let Some(author) = &pkg.author {
        ui::status("Author:", author);
    }
    if !pkg.categories.is_empty() {
        ui::status("Categories:", &pkg.categories.join(", "));
    }
    if let Some(git) = &pkg.git {
        ui::status("Repository:", git);
    }
    if let Some(homepage) = &pkg.homepage {
        ui::status("Homepage:", homepage);
    }
    if let Some(readme) = &pkg.readme_url {
        ui::status("Readme:", readme);
    }
    let flags: Vec<&str> = pkg
        .flags
        .iter()
        .filter(|(_, set)| **set)
        .map(|(flag, _)| flag.as_str())
        .collect();
    if !flags.is_empty() {
        ui::status("Flags:", &flags.join(", "));
    }
    ui::status(
        "Installed:",
        if pkg.is_installed() { "yes" } else { "no" },
    );

    Ok(0)
}
