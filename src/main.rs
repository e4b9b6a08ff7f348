use clap::Parser;
use trailguard::cli::{Cli, Commands};
use trailguard::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    // Initialize telemetry
    trailguard::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(real = args.real, "Starting engine");
            args.execute(&config).await?;
        }
        Commands::Status(args) => args.execute(&config).await?,
        Commands::Config => {
            println!("# Effective configuration ({})", cli.config);
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
