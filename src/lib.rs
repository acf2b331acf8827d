// Extension manager core: package discovery, caching and installation
// for CAD workbench modules and macros.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod constants;
pub mod deps;
pub mod flags;
pub mod git;
pub mod host;
pub mod http;
pub mod macro_parser;
pub mod manifest;
pub mod package;
pub mod prefs;
pub mod protocol;
pub mod sources;
pub mod ui;
pub mod worker;
