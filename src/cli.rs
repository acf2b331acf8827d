// CLI module for handling command-line interface

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cadpm")]
#[command(about = "Extension manager for CAD workbench modules and macros")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured channels and package sources
    Sources,
    /// List the packages of a source, grouped by category
    List {
        /// Source to list, as `channel:source` (channel defaults to "default")
        source: String,
        /// Drop the cached listing and fetch a fresh one
        #[arg(long)]
        refresh: bool,
    },
    /// List locally installed packages
    Installed {
        /// Include packages bundled with the host application
        #[arg(long)]
        core: bool,
    },
    /// Install or update a package from a source
    Install {
        /// Source to install from, as `channel:source`
        source: String,
        /// Package name
        name: String,
    },
    /// Remove an installed package
    Uninstall {
        /// Package name
        name: String,
    },
    /// Show the details of one package
    Show {
        /// Source to query, as `channel:source`
        source: String,
        /// Package name
        name: String,
    },
    /// Report backend availability and directory health
    Doctor {
        /// Emit a machine-readable JSON report
        #[arg(long)]
        json: bool,
    },
}

/// Split a `channel:source` argument. A bare source name belongs to the
/// "default" channel.
pub fn split_source_arg(arg: &str) -> (&str, &str) {
    match arg.split_once(':') {
        Some((channel, source)) => (channel, source),
        None => ("default", arg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_argument_splits_on_colon() {
        assert_eq!(
            split_source_arg("framagit:Workbenches"),
            ("framagit", "Workbenches")
        );
        assert_eq!(split_source_arg("Macros"), ("default", "Macros"));
    }
}
