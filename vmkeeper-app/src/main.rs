use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vmkeeper_app::config::{Config, DEFAULT_CONFIG_PATH};
use vmkeeper_app::daemon;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("check") {
        let path = config_path(args.get(2));
        let config = load_config(&path)?;
        println!("✓ {} is valid (rotation at {})", path.display(), config.schedule_time);
        return Ok(());
    }

    let path = config_path(args.get(1));
    let config = load_config(&path)?;

    println!("vmkeeper {}", env!("CARGO_PKG_VERSION"));
    println!("Template:    {}", config.ova_path.display());
    println!("Storage:     {}", config.base_folder.display());
    println!("Rotation at: {}", config.schedule_time);
    println!();

    daemon::run(config).await
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(arg: Option<&String>) -> PathBuf {
    arg.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn load_config(path: &PathBuf) -> Result<Config> {
    let config = Config::load(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}
