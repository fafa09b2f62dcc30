use marketingkreis_edge_core::config::{Config, BACKEND_URL_ENV, RUNTIME_ENV_VAR};

pub fn run(config: &Config) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);

    println!("# {} = {:?}", BACKEND_URL_ENV, std::env::var(BACKEND_URL_ENV).ok());
    println!("# {} = {:?}", RUNTIME_ENV_VAR, std::env::var(RUNTIME_ENV_VAR).ok());
    match config.backend.resolve() {
        Ok(base) => println!("# resolved backend: {}", base),
        Err(e) => {
            println!("# configuration error: {}", e);
            anyhow::bail!(e);
        }
    }

    Ok(())
}
