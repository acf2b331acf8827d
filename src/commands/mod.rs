// Command implementations, one module per subcommand

pub mod doctor;
pub mod install;
pub mod installed;
pub mod list;
pub mod show;
pub mod sources;
pub mod uninstall;
