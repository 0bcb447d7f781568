use anyhow::{Context, Result};
use serde_json::Value;

use console_rpc::rpc::{RpcError, Surface};

use super::CommandContext;

pub async fn run_call(
    ctx: &CommandContext,
    surface: Surface,
    path: &str,
    get: bool,
    body: Option<String>,
) -> Result<()> {
    let body: Value = match body {
        Some(raw) => serde_json::from_str(&raw).context("--body is not valid JSON")?,
        None => Value::Object(Default::default()),
    };

    let clients = ctx.clients().await?;
    let client = clients.get(surface);

    let result: Result<Value, RpcError> = if get {
        client.get(path).await
    } else {
        client.post(path, &body).await
    };

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {} {} failed", surface, path);
            if let RpcError::Exhausted {
                instance_management_url: Some(url),
                ..
            } = &e
            {
                eprintln!("   Manage the instance at {}", url);
            }
            eprintln!("   {}", e.user_hint());
            Err(e.into())
        }
    }
}
