//! LeadRelay server binary.
//!
//! Loads configuration from `server.*` files and `LEADRELAY_SERVER__*`
//! environment variables, then serves until SIGTERM/Ctrl+C.

use server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::load()?;

    server::start_server(config).await?;

    Ok(())
}
