use std::path::Path;

use anyhow::Result;

use console_rpc::auth::AuthBootstrapConfig;
use console_rpc::oauth::OAuthFlow;
use console_rpc::session::SessionStore;

use super::CommandContext;
use crate::cli::{confirm, read_line};

pub async fn run_login(ctx: &CommandContext) -> Result<()> {
    if ctx.store.is_logged_in() {
        println!("⚠️  You are already logged in.");
        println!("Logging in again will replace your current session.\n");

        let proceed =
            tokio::task::spawn_blocking(|| confirm("Do you want to continue?", false)).await??;
        if !proceed {
            println!("Login cancelled. Your existing session remains active.");
            return Ok(());
        }
    }

    let config = ctx.auth_config().await?;

    println!("🔐 Starting login at {}...\n", config.issuer);
    interactive_login(&config, &ctx.store, ctx.cache_dir()).await?;

    println!("\n✅ Successfully logged in!");
    Ok(())
}

/// Run the browser flow and store the resulting token.
pub async fn interactive_login(
    config: &AuthBootstrapConfig,
    store: &SessionStore,
    cache_dir: &Path,
) -> Result<()> {
    let flow = OAuthFlow::new(config.clone(), cache_dir)?;
    let authorize_url = flow.start_flow()?;

    let open_browser = tokio::task::spawn_blocking(|| {
        confirm("Open authentication page in browser?", true)
    })
    .await??;

    if open_browser {
        println!("🌐 Opening authentication page in your browser...");
        if open::that(&authorize_url).is_err() {
            println!("⚠️  Could not open browser automatically.");
        }
    }

    println!("Please complete authentication in your browser:");
    println!("\n{}\n", authorize_url);
    println!("Afterwards you are sent to {}", config.redirect_uri);
    println!("Copy the full address from the browser and paste it below.\n");

    let pasted =
        tokio::task::spawn_blocking(|| read_line("Paste the redirect URL here: ")).await??;

    let token = flow.complete_flow(&pasted).await?;
    store.save_token(&token.access_token, &config.issuer)?;
    Ok(())
}
