// Host context: directories, plugin registry and preferences of the
// embedding CAD application, passed explicitly to whoever needs them.

use crate::constants::{MOD_DIR_NAME, RESOURCE_SCHEME, UNCATEGORIZED};
use crate::prefs::Preferences;
use anyhow::Result;
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

lazy_static! {
    /// Modules whose registered workbench key does not follow the
    /// `<dirname>Workbench` convention.
    static ref NON_STANDARD_WORKBENCH_NAMES: BTreeMap<&'static str, &'static str> = {
        let mut m = BTreeMap::new();
        m.insert("flamingo", "flamingoToolsWorkbench");
        m.insert("geodata", "GeodatWorkbench");
        m.insert("A2plus", "a2pWorkbench");
        m.insert("ArchTextures", "ArchTextureWorkbench");
        m.insert("cadquery_module", "CadQueryWorkbench");
        m.insert("Defeaturing", "DefeaturingWB");
        m.insert("kicadStepUpMod", "KiCadStepUpWB");
        m.insert("Manipulator", "ManipulatorWB");
        m.insert("Part-o-magic", "PartOMagicWorkbench");
        m.insert("sheetmetal", "SMWorkbench");
        m.insert("FCGear", "gearWorkbench");
        m.insert("frame", "frame_Workbench");
        m.insert("CurvedShapes", "CurvedShapesWB");
        m
    };

    /// Display categories of the workbenches shipped with the host.
    static ref PREDEFINED_CATEGORIES: BTreeMap<&'static str, &'static [&'static str]> = {
        let mut m: BTreeMap<&'static str, &'static [&'static str]> = BTreeMap::new();
        m.insert("ArchWorkbench", &["Architecture"]);
        m.insert("DraftWorkbench", &["CAD/CAM"]);
        m.insert("FemWorkbench", &["Analysis"]);
        m.insert("InspectionWorkbench", &["Analysis"]);
        m.insert("MeshWorkbench", &["3D"]);
        m.insert("OpenSCADWorkbench", &["CAD/CAM"]);
        m.insert("PartWorkbench", &["CAD/CAM"]);
        m.insert("PartDesignWorkbench", &["CAD/CAM"]);
        m.insert("PathWorkbench", &["CAD/CAM"]);
        m.insert("PointsWorkbench", &["CAD/CAM"]);
        m.insert("RaytracingWorkbench", &["3D"]);
        m.insert("ReverseEngineeringWorkbench", &["Engineering"]);
        m.insert("RobotWorkbench", &["Engineering"]);
        m.insert("SketcherWorkbench", &["CAD/CAM"]);
        m.insert("SpreadsheetWorkbench", &["Data"]);
        m.insert("TechDrawWorkbench", &["CAD/CAM"]);
        m.insert("gearWorkbench", &["Engineering"]);
        m.insert("CurvesWorkbench", &["CAD/CAM"]);
        m.insert("CurvedShapesWB", &["CAD/CAM"]);
        m.insert("KiCadStepUpWB", &["PCB/EDA"]);
        m
    };
}

/// Application context for one host installation. Created once in `main`
/// (or per test fixture) and passed by reference; cloning is cheap and
/// shares the preference store.
#[derive(Clone)]
pub struct Host {
    /// Read-only resources shipped with the host application.
    pub core_resource_dir: PathBuf,
    /// Per-user data dir; user modules live under `<user_data_dir>/Mod`.
    pub user_data_dir: PathBuf,
    /// Per-user macro dir.
    pub user_macro_dir: PathBuf,
    /// Cache root for downloaded listings, repos and metadata.
    pub cache_dir: PathBuf,
    pub prefs: Arc<Mutex<Preferences>>,
}

impl Host {
    /// Resolve directories from `CADPM_*` env overrides, falling back
    /// to the platform data dir.
    pub fn new() -> Result<Self> {
        let base = std::env::var_os("CADPM_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("cadpm")))
            .unwrap_or_else(|| PathBuf::from(".cadpm"));

        let core_resource_dir = std::env::var_os("CADPM_RESOURCE_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_local_dir().map(|d| d.join("cadpm").join("resources")))
            .unwrap_or_else(|| base.join("resources"));

        let user_macro_dir = std::env::var_os("CADPM_MACRO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("Macro"));

        let cache_dir = std::env::var_os("CADPM_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("cache"));

        let prefs = Preferences::load(base.join("prefs.toml"));
        crate::http::configure_proxy(prefs.proxy_url());

        Ok(Self {
            core_resource_dir,
            user_data_dir: base,
            user_macro_dir,
            cache_dir,
            prefs: Arc::new(Mutex::new(prefs)),
        })
    }

    /// A host rooted at an arbitrary directory. Used by tests and by
    /// portable installations.
    pub fn for_root(root: &Path) -> Self {
        let base = root.join("data");
        Self {
            core_resource_dir: root.join("resources"),
            user_macro_dir: root.join("Macro"),
            cache_dir: root.join("cache"),
            prefs: Arc::new(Mutex::new(Preferences::load(base.join("prefs.toml")))),
            user_data_dir: base,
        }
    }

    /// Root of user-installed modules.
    pub fn mod_root(&self) -> PathBuf {
        self.user_data_dir.join(MOD_DIR_NAME)
    }

    /// Root of host-shipped (core) modules.
    pub fn core_mod_root(&self) -> PathBuf {
        self.core_resource_dir.join(MOD_DIR_NAME)
    }

    /// Keys of currently registered host plugins: every core and user
    /// module directory mapped through the workbench naming convention.
    pub fn workbenches(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for root in [self.core_mod_root(), self.mod_root()] {
            let Ok(entries) = std::fs::read_dir(&root) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    if let Some(name) = entry.file_name().to_str() {
                        keys.push(workbench_key(name));
                    }
                }
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn record_plugin_destination(&self, plugin: &str, destination: &Path) -> Result<()> {
        let mut prefs = self.prefs.lock().unwrap_or_else(|p| p.into_inner());
        prefs.set_plugin_parameter(plugin, "destination", destination.to_string_lossy());
        prefs.save()
    }
}

/// Registered plugin key for a module directory name: the non-standard
/// name table first, then the `<name>Workbench` convention.
pub fn workbench_key(name: &str) -> String {
    let base = name.strip_suffix("Workbench").unwrap_or(name);
    match NON_STANDARD_WORKBENCH_NAMES.get(base) {
        Some(key) => (*key).to_string(),
        None => format!("{}Workbench", base),
    }
}

/// Display categories for a registered workbench key.
pub fn predefined_workbench_categories(key: &str) -> Vec<String> {
    PREDEFINED_CATEGORIES
        .get(key)
        .map(|cats| cats.iter().map(|c| c.to_string()).collect())
        .unwrap_or_else(|| vec![UNCATEGORIZED.to_string()])
}

/// Scheme URL for a local path, as consumed by the host UI. Always uses
/// forward slashes.
pub fn path_to_url(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    format!("{}{}", RESOURCE_SCHEME, text.trim_start_matches("file://"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn workbench_key_follows_convention() {
        assert_eq!(workbench_key("Draft"), "DraftWorkbench");
        assert_eq!(workbench_key("DraftWorkbench"), "DraftWorkbench");
    }

    #[test]
    fn workbench_key_honors_non_standard_names() {
        assert_eq!(workbench_key("sheetmetal"), "SMWorkbench");
        assert_eq!(workbench_key("A2plus"), "a2pWorkbench");
    }

    #[test]
    fn workbenches_lists_module_dirs() {
        let dir = TempDir::new().unwrap();
        let host = Host::for_root(dir.path());
        std::fs::create_dir_all(host.mod_root().join("Draft")).unwrap();
        std::fs::create_dir_all(host.core_mod_root().join("Part")).unwrap();
        let keys = host.workbenches();
        assert!(keys.contains(&"DraftWorkbench".to_string()));
        assert!(keys.contains(&"PartWorkbench".to_string()));
    }

    #[test]
    fn path_to_url_uses_scheme() {
        let url = path_to_url(Path::new("/data/Mod/x"));
        assert_eq!(url, "cadpm:///data/Mod/x");
    }
}
