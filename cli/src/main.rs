use std::path::PathBuf;

use clap::Parser;
use marketingkreis_edge_core::config::{load_config, Config};
use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config_logged(cli.config.clone(), std::io::stdout)?;

    // Initialize logging; RUST_LOG directives take precedence
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("marketingkreis_edge=info".parse()?)
                .add_directive(format!("marketingkreis_edge_core={}", config.logging.level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    match cli.command {
        Commands::Start { port } => {
            cli::commands::start::run(config, port).await?;
        }
        Commands::Status => {
            cli::commands::status::run(&config).await?;
        }
        Commands::Config => {
            cli::commands::config::run(&config)?;
        }
    }

    Ok(())
}

/// Load the config under a temporary subscriber; the configured one needs
/// the log level from this very file.
fn load_config_logged<W>(path: Option<PathBuf>, writer: W) -> anyhow::Result<Config>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marketingkreis_edge_core=info")),
        )
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(bootstrap, || load_config(path))
}
