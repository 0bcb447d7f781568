use anyhow::Result;

use console_rpc::session::SessionStore;

pub async fn run_org(store: &SessionStore, id: Option<String>, clear: bool) -> Result<()> {
    match id.filter(|_| !clear) {
        Some(id) => {
            store.set_org(&id)?;
            println!("✅ Calls now run in organization {}", id);
        }
        None => {
            store.clear_org()?;
            println!("✅ Organization selection cleared.");
        }
    }

    Ok(())
}
