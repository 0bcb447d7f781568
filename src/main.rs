use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod command;

use cli::{Cli, Commands};
use command::CommandContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.globals.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Bootstrap) => {
            let ctx = CommandContext::new(&cli.globals)?;
            command::run_bootstrap(&ctx).await?;
        }
        Some(Commands::Call {
            surface,
            path,
            get,
            body,
        }) => {
            let ctx = CommandContext::new(&cli.globals)?;
            command::run_call(&ctx, surface, &path, get, body).await?;
        }
        Some(Commands::Login) => {
            let ctx = CommandContext::new(&cli.globals)?;
            command::run_login(&ctx).await?;
        }
        Some(Commands::Logout) => {
            let (store, _) = command::open_store(&cli.globals)?;
            command::run_logout(&store).await?;
        }
        Some(Commands::Status) => {
            let (store, _) = command::open_store(&cli.globals)?;
            command::run_status(&store).await?;
        }
        Some(Commands::Org { id, clear }) => {
            let (store, _) = command::open_store(&cli.globals)?;
            command::run_org(&store, id, clear).await?;
        }
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            eprintln!("Use 'console-rpc login' to authenticate or 'console-rpc bootstrap' to check the setup.");
        }
    }

    Ok(())
}
