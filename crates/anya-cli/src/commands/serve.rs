//! Server command implementation

use std::path::Path;

use anyhow::Result;
use anya_core::EngineConfig;

use super::open_orchestrator;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    config: EngineConfig,
) -> Result<()> {
    println!("🚀 Starting Anya web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    let server_config = anya_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins: vec![],
        ..Default::default()
    }
    .with_env_api_keys();

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if server_config.api_keys.is_empty() {
        println!("   ❌ No API keys configured: set ANYA_API_KEYS (comma-separated)");
    } else {
        println!(
            "   🔑 API keys: {} configured (ANYA_API_KEYS)",
            server_config.api_keys.len()
        );
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let orchestrator = open_orchestrator(db_path, no_encrypt, config)?;
    anya_server::serve_with_config(orchestrator, host, port, server_config).await?;

    Ok(())
}
