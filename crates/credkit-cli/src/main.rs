mod keygen;
mod sign;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "credkit", about = "Request short-lived SSH certificates from a signing authority")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new SSH keypair
    Keygen(keygen::KeygenArgs),
    /// Have the authority sign a key and save the certificate
    Sign(sign::SignArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Keygen(args) => keygen::run(args)?,
        Commands::Sign(args) => sign::run(args).await?,
    }
    Ok(())
}
