use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use finadvisor::config::{ArchiveBackend, ChallengeSettings};
use finadvisor::{advice, constants, web_server, Settings, SubmissionPipeline, UserProfile};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the financial profile form.
    Start {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED, help = "Address to bind.")]
        host: Ipv4Addr,
    },
    /// Print the advice prompt that a saved profile would produce.
    Prompt {
        #[arg(help = "Path to a profile JSON file, as archived by the server.")]
        path: PathBuf,
    },
    /// Check that the required secrets are present in the environment.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for API keys and reCAPTCHA secrets)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,finadvisor=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { port, host } => {
            let settings = Settings::from_env().context("Failed to load settings")?;
            info!(model = %settings.model, "Starting financial advisor form on port {}...", port);

            let client = reqwest::Client::new();
            let pipeline = SubmissionPipeline::from_settings(&settings, client);
            if !pipeline.is_archiving() {
                info!("BUCKET_NAME not set; submitted profiles will not be archived");
            }

            let state = web_server::AppState::new(settings.templates_dir.clone(), pipeline);
            let router = web_server::build_router(state, settings.static_dir.clone());
            web_server::start_web_server(host.octets(), port, router).await?;
            info!("Shutdown complete.");
        }
        Commands::Prompt { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let profile: UserProfile = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a valid profile", path.display()))?;
            println!("{}", advice::build_prompt(&profile));
        }
        Commands::CheckConfig => {
            let settings = Settings::from_env().context("Configuration is incomplete")?;
            println!("Chat endpoint: {}", settings.chat_endpoint);
            println!("Model: {}", settings.model);
            match &settings.challenge {
                ChallengeSettings::Recaptcha { verify_url, .. } => {
                    println!("Challenge: reCAPTCHA ({})", verify_url)
                }
                ChallengeSettings::Image => println!("Challenge: image"),
            }
            match &settings.archive {
                None => println!("Archive: disabled"),
                Some(archive) => match &archive.backend {
                    ArchiveBackend::Http { endpoint, .. } => {
                        println!("Archive: bucket {} at {}", archive.bucket, endpoint)
                    }
                    ArchiveBackend::Fs { root } => {
                        println!("Archive: bucket {} under {}", archive.bucket, root.display())
                    }
                },
            }
        }
    }

    Ok(())
}
