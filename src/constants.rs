// Constants module for shared string constants

/// File extension of single-file macros (matched case-insensitively).
pub const MACRO_FILE_EXT: &str = "fcmacro";

/// Reserved category names. These always sort last in a category listing.
pub const UNCATEGORIZED: &str = "Uncategorized";
pub const LIBRARIES: &str = "Libraries";
pub const OTHER: &str = "Other";

/// Directory name for installable modules under the user data dir.
pub const MOD_DIR_NAME: &str = "Mod";

/// Minimum git version with reliable shallow-clone and submodule
/// semantics. Older releases report the backend as unavailable.
pub const MIN_GIT_VERSION: (u32, u32, u32) = (2, 14, 99);

/// URL scheme used by the host UI for local resources.
pub const RESOURCE_SCHEME: &str = "cadpm://";

/// Placeholder tokens substituted for absolute paths in cache files so a
/// cache written by one installation stays valid in another.
pub const CORE_RES_DIR_TOKEN: &str = "_CORE_RES_DIR_";
pub const CORE_RES_URL_TOKEN: &str = "_CORE_RES_URL_";
pub const USER_DATA_DIR_TOKEN: &str = "_USER_DATA_DIR_";
pub const USER_DATA_URL_TOKEN: &str = "_USER_DATA_URL_";
pub const USER_MACRO_DIR_TOKEN: &str = "_USER_MACRO_DIR_";
pub const USER_MACRO_URL_TOKEN: &str = "_USER_MACRO_URL_";

/// Schema version for the doctor --json output format.
pub const SCHEMA_VERSION: u32 = 1;
