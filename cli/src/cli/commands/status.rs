use std::time::Duration;

use marketingkreis_edge_core::config::{default_config_path, Config};

pub async fn run(config: &Config) -> anyhow::Result<()> {
    println!("MarketingKreis Edge Status");
    println!("==========================");
    println!();
    println!("Configuration:");
    println!("  Default config file: {:?}", default_config_path());
    println!();
    println!("Server settings:");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    match config.backend.resolve() {
        Ok(base) => println!("  Backend: {}", base),
        Err(e) => println!("  Backend: ERROR ({})", e),
    }
    println!();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let url = format!("http://{}:{}/healthz", config.server.host, config.server.port);
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let backend = body.get("backend").and_then(|v| v.as_str()).unwrap_or("-");
            println!("Server: RUNNING ✓ (forwarding to {})", backend);
        }
        _ => {
            println!("Server: NOT RUNNING");
        }
    }

    Ok(())
}
