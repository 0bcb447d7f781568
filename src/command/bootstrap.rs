use anyhow::Result;

use console_rpc::bootstrap::BootstrapOutcome;
use console_rpc::rpc::Surface;

use super::CommandContext;

pub async fn run_bootstrap(ctx: &CommandContext) -> Result<()> {
    match ctx.bootstrap().await? {
        BootstrapOutcome::Installed {
            attempt,
            auth_config,
        } => {
            println!("✅ RPC clients ready (attempt {})", attempt);
            if let Some(clients) = ctx.bootstrapper.clients() {
                for surface in Surface::ALL {
                    let client = clients.get(surface);
                    println!("   {:<6} {}{}", surface, client.base_url(), surface.prefix());
                }
            }
            println!("\nAuth configuration:");
            println!("{}", serde_json::to_string_pretty(&auth_config)?);
        }
        BootstrapOutcome::SkippedIncompleteEnvironment => {
            println!("⚠️  The environment is missing the API URL or issuer.");
            println!("   No RPC clients were created.");
        }
        BootstrapOutcome::Superseded { attempt } => {
            println!("Bootstrap attempt {} was superseded by a newer one.", attempt);
        }
    }

    Ok(())
}
