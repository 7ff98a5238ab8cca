mod args;
mod commands;
mod init;

use args::{Cli, Commands};
use clap::Parser;
use dialoguer::console::style;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init::init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Completions { shell } = cli.command {
        commands::completions::cmd_completions(shell);
        return Ok(());
    }

    init::ensure_macos()?;
    let reconciler = init::build_reconciler().await?;
    if !cli.command.skips_install_gate() {
        reconciler.installed_config()?;
    }

    match cli.command {
        Commands::Install { tld } => commands::install::cmd_install(&reconciler, &tld).await?,
        Commands::Uninstall => commands::install::cmd_uninstall(&reconciler).await?,
        Commands::Link { domain } => commands::link::cmd_link(&reconciler, domain).await?,
        Commands::Unlink { domain } => commands::link::cmd_unlink(&reconciler, &domain).await?,
        Commands::Proxy { domain, target } => {
            commands::proxy::cmd_proxy(&reconciler, &domain, &target).await?
        }
        Commands::Unproxy { domain } => commands::proxy::cmd_unproxy(&reconciler, &domain).await?,
        Commands::Sites => commands::sites::cmd_sites(&reconciler)?,
        Commands::Isolate { domain, version } => {
            commands::isolate::cmd_isolate(&reconciler, domain, version).await?
        }
        Commands::Php => commands::php::cmd_php(&reconciler).await?,
        Commands::Tld { tld } => commands::tld::cmd_tld(&reconciler, &tld).await?,
        Commands::Start { restart } => commands::services::cmd_start(&reconciler, restart).await?,
        Commands::Status => commands::services::cmd_status(&reconciler).await?,
        Commands::Open { domain } => commands::open::cmd_open(&reconciler, domain).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
