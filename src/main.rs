use cadpm::cli::{Cli, Commands};
use cadpm::commands;
use cadpm::host::Host;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let host = Host::new()?;

    let exit_code = match cli.command {
        Commands::Sources => {
            commands::sources::list_sources(&host)?;
            0
        }
        Commands::List { source, refresh } => {
            commands::list::list_packages(&host, &source, refresh).await?;
            0
        }
        Commands::Installed { core } => {
            commands::installed::list_installed(&host, core).await?;
            0
        }
        Commands::Install { source, name } => {
            commands::install::install_package(&host, &source, &name).await?
        }
        Commands::Uninstall { name } => commands::uninstall::uninstall_package(&host, &name).await?,
        Commands::Show { source, name } => commands::show::show_package(&host, &source, &name).await?,
        Commands::Doctor { json } => commands::doctor::check_health(&host, json)?,
    };

    std::process::exit(exit_code);
}
