use anyhow::Result;

use console_rpc::interceptor::OrgContextStore;
use console_rpc::session::{SessionStore, ACCESS_TOKEN_ENV};

pub async fn run_status(store: &SessionStore) -> Result<()> {
    let session = store.snapshot();

    if store.is_logged_in() {
        println!("✅ Logged in");
        if std::env::var(ACCESS_TOKEN_ENV).is_ok_and(|t| !t.is_empty()) {
            println!("   Token: from {}", ACCESS_TOKEN_ENV);
        }
        if let Some(issuer) = &session.issuer {
            println!("   Issuer: {}", issuer);
        }
    } else {
        println!("❌ Not logged in");
        println!("   Run 'console-rpc login' to authenticate.");
    }

    match store.current_org_id() {
        Some(org) => println!("   Organization: {}", org),
        None => println!("   Organization: (default of the user)"),
    }
    println!("   Session file: {}", store.session_path().display());

    Ok(())
}
