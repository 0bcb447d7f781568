use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use console_rpc::auth::SessionPrompt;
use console_rpc::locale::TranslationCatalog;

/// Print `prompt` and read one trimmed line from stdin.
pub fn read_line(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

/// Ask a yes/no question. An empty answer picks `default`.
pub fn confirm(question: &str, default: bool) -> io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let answer = read_line(&format!("{} {}: ", question, hint))?.to_lowercase();

    Ok(match answer.as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    })
}

/// "Session expired" prompt on the terminal.
pub struct TerminalPrompt {
    catalog: Arc<TranslationCatalog>,
}

impl TerminalPrompt {
    pub fn new(catalog: Arc<TranslationCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl SessionPrompt for TerminalPrompt {
    async fn confirm_session_expired(&self) -> bool {
        let question = self
            .catalog
            .translate("SESSION.EXPIRED")
            .unwrap_or_else(|| "Your session has expired. Log in again?".to_string());

        // stdin is blocking; keep it off the runtime's worker threads
        match tokio::task::spawn_blocking(move || confirm(&format!("\n⚠️  {}", question), false))
            .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("Could not read answer from terminal: {}", e);
                false
            }
            Err(e) => {
                warn!("Prompt task failed: {}", e);
                false
            }
        }
    }
}
