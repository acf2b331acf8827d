// List module for the categorized package listing of one source

use crate::host::Host;
use crate::package::Package;
use crate::sources;
use crate::sources::PackageSource;
use crate::ui;
use anyhow::bail;

pub async fn list_packages(host: &Host, source_arg: &str, refresh: bool) -> anyhow::Result<()> {
    let (channel_id, source_name) = crate::cli::split_source_arg(source_arg);

    let Some(source) = sources::find_source(host, channel_id, source_name)? else {
        bail!("No source '{}' in channel '{}'", source_name, channel_id);
    };

    if refresh {
        source.update_package_list(host);
    }

    let pb = ui::spinner(&format!("Fetching {}:{}", channel_id, source_name));
    let categories = source.get_categories(host, true).await;
    let total: usize = categories.iter().map(|c| c.packages.len()).sum();
    ui::finish_spinner_success(&pb, &format!("{} packages", total));

    for category in &categories {
        ui::header(&category.name);
        for pkg in &category.packages {
            print_line(pkg);
        }
    }

    Ok(())
}

fn print_line(pkg: &Package) {
    let mut line = format!("  {}", pkg.display_title());
    if let Some(version) = &pkg.version {
        line.push_str(&format!(" {}", version));
    }
    if pkg.is_installed() {
        line.push_str(" [installed]");
    }
    if pkg.has_flag("obsolete") {
        line.push_str(" [obsolete]");
    }
    ui::dim(&line);
}
