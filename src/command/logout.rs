use anyhow::Result;

use console_rpc::session::SessionStore;

pub async fn run_logout(store: &SessionStore) -> Result<()> {
    if !store.is_logged_in() {
        println!("You are not logged in.");
        return Ok(());
    }

    store.remove_session()?;
    println!("✅ Successfully logged out.");

    Ok(())
}
