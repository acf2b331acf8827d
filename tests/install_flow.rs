// End-to-end flows against a host rooted in a temp directory: macro
// install through the repository protocol, local scanning, uninstall,
// and cache relocation between installations.

use cadpm::cache;
use cadpm::host::Host;
use cadpm::macro_parser::build_macro_package;
use cadpm::package::PackageKind;
use cadpm::protocol::{GitHostProtocol, Protocol};
use cadpm::sources::{InstalledPackageSource, PackageSource};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn host_fixture() -> (TempDir, Host) {
    let dir = TempDir::new().expect("temp dir");
    let host = Host::for_root(dir.path());
    fs::create_dir_all(host.mod_root()).unwrap();
    fs::create_dir_all(host.core_mod_root()).unwrap();
    fs::create_dir_all(&host.user_macro_dir).unwrap();
    fs::create_dir_all(&host.cache_dir).unwrap();
    (dir, host)
}

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn github_protocol() -> GitHostProtocol {
    GitHostProtocol::github(
        "https://github.com/example/macros".to_string(),
        None,
        None,
        None,
        None,
    )
}

#[tokio::test]
async fn macro_installs_from_checkout_and_uninstalls_by_name() {
    let (dir, host) = host_fixture();

    // A materialized macro source tree, as a clone would leave it
    let checkout = dir.path().join("checkout");
    write_file(
        &checkout.join("Gears.FCMacro"),
        "__comment__ = \"Generate gears\"\n__files__ = \"lib/involute.py\"\n",
    );
    write_file(&checkout.join("lib/involute.py"), "TEETH = 17\n");

    let mut pkg = build_macro_package(
        &host,
        &checkout.join("Gears.FCMacro"),
        "Gears",
        false,
        true,
        false,
        Some(&checkout),
    )
    .unwrap();

    let result = github_protocol().install_macro(&host, &mut pkg).await;
    assert!(result.ok, "install failed: {:?}", result.message);
    assert!(host.user_macro_dir.join("Gears.FCMacro").exists());
    assert!(host.user_macro_dir.join("lib/involute.py").exists());

    // The installed scan must pick it up with its in-file metadata
    let source = InstalledPackageSource::new();
    let found = source.find_package_by_name(&host, "Gears").await.unwrap();
    assert_eq!(found.kind, PackageKind::Macro);
    assert_eq!(found.description.as_deref(), Some("Generate gears"));

    let removed = source.uninstall(&host, "Gears").await.unwrap();
    assert!(removed.ok, "uninstall failed: {:?}", removed.message);
    assert!(!host.user_macro_dir.join("Gears.FCMacro").exists());
    assert!(!host.user_macro_dir.join("lib/involute.py").exists());
}

#[tokio::test]
async fn installed_workbench_is_scanned_and_categorized() {
    let (_dir, host) = host_fixture();

    let module = host.mod_root().join("Gearbox");
    write_file(
        &module.join("InitGui.py"),
        "import FreeCADGui as Gui\nGui.addWorkbench(GearboxWorkbench())\n",
    );
    write_file(
        &module.join("manifest.ini"),
        "[general]\nname=Gearbox\ndescription=Gear trains\ncategories=Engineering\n",
    );

    let source = InstalledPackageSource::new();
    let categories = source.get_categories(&host, false).await;

    let engineering = categories
        .iter()
        .find(|c| c.name == "Engineering")
        .expect("category from manifest");
    let pkg = engineering
        .packages
        .iter()
        .find(|p| p.name == "Gearbox")
        .expect("scanned module");
    assert_eq!(pkg.kind, PackageKind::Workbench);
    assert_eq!(pkg.key, "GearboxWorkbench");
    assert!(pkg.is_installed());
}

#[tokio::test]
async fn listing_cache_relocates_to_another_installation() {
    let (_dir_a, host_a) = host_fixture();
    let (_dir_b, host_b) = host_fixture();

    let pkg = cadpm::package::Package {
        key: "Gearbox".to_string(),
        name: "Gearbox".to_string(),
        install_dir: Some(host_a.mod_root().join("Gearbox")),
        ..Default::default()
    };
    let mut category = cadpm::package::PackageCategory::new("Engineering");
    category.packages.push(pkg);

    cache::store_categories(&host_a, "default", "Workbenches", &[category]).unwrap();

    // Written cache must not contain host A's absolute root
    let file_a = cache::source_cache_file(&host_a, "default", "Workbenches");
    let raw = fs::read_to_string(&file_a).unwrap();
    assert!(!raw.contains(&host_a.user_data_dir.to_string_lossy().replace('\\', "/")));

    // Move the cache file to installation B, as a prefix change would
    let file_b = cache::source_cache_file(&host_b, "default", "Workbenches");
    fs::copy(&file_a, &file_b).unwrap();

    let restored = cache::load_categories(&host_b, "default", "Workbenches").unwrap();
    assert_eq!(
        restored[0].packages[0].install_dir,
        Some(host_b.mod_root().join("Gearbox"))
    );
}
