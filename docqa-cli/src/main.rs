use anyhow::Result;
use clap::Parser;
use docqa_cli::{Cli, execute};
use docqa_telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    docqa_telemetry::init(&TelemetryConfig { format: cli.log_format, ..TelemetryConfig::default() })?;

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
