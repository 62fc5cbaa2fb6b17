use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcpwire::lease::normalize_mac;
use dhcpwire::{Config, DhcpServer, Result, StaticLeases};

#[derive(Parser)]
#[command(name = "dhcpwire")]
#[command(author, version, about = "A DHCP server that acknowledges from static configuration", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
    ListPool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting DHCP server with config: {:?}", cli.config);
            let provider = StaticLeases::from_config(&config)?;
            let mut server = DhcpServer::new(&config, provider).await?;
            server.run().await
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::ListPool => {
            let leases = StaticLeases::from_config(&config)?;

            println!(
                "Dynamic pool: {} - {} ({} free of {})",
                config.pool_start,
                config.pool_end,
                leases.free_count(),
                config.pool_size()
            );

            if config.static_bindings.is_empty() {
                println!("No static bindings.");
            } else {
                println!("{:<20} {:<16} {:<8}", "MAC Address", "IP Address", "Options");
                println!("{}", "-".repeat(46));

                for binding in &config.static_bindings {
                    let mac = normalize_mac(&binding.mac_address)
                        .unwrap_or_else(|| binding.mac_address.clone());
                    println!(
                        "{:<20} {:<16} {:<8}",
                        mac,
                        binding.ip_address,
                        binding.options.len()
                    );
                }
            }

            Ok(())
        }
    }
}
