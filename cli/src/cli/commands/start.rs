use marketingkreis_edge_core::config::Config;
use marketingkreis_edge_core::proxy::ProxyServer;

pub async fn run(mut config: Config, port_override: Option<u16>) -> anyhow::Result<()> {
    // Apply port override if provided
    if let Some(port) = port_override {
        config.server.port = port;
    }

    tracing::info!("Starting MarketingKreis edge...");
    tracing::info!("  Port: {}", config.server.port);
    tracing::info!("  Host: {}", config.server.host);

    // Fails fast when the backend URL is missing in production
    let server = ProxyServer::from_config(&config)?;

    tracing::info!("  Backend: {}", server.backend_url());
    tracing::info!(
        "  Timeouts: read {}ms, write {}ms, long-running {}ms, cold start {}ms",
        config.timeouts.read_ms,
        config.timeouts.write_ms,
        config.timeouts.long_running_ms,
        config.timeouts.cold_start_ms
    );
    if config.server.public_origin.is_none() {
        tracing::warn!("server.public_origin not set; CSRF origin checks rely on Host/X-Forwarded-* headers");
    }

    tracing::info!("Edge server starting on http://{}:{}", config.server.host, config.server.port);
    tracing::info!("Press Ctrl+C to stop");

    // Run server (blocks until shutdown)
    server.run().await?;

    Ok(())
}
