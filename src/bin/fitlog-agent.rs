use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fitlog_agent::client::FitbitClient;
use fitlog_agent::server;
use fitlog_agent::utils::config_loader;
use fitlog_agent::utils::logging;
use fitlog_agent::utils::logging::LogLevel;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "fitlog-agent.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load the stored credential and serve the admin/metrics endpoints (default)
    Serve,
    /// Print the provider consent url to obtain an authorization code
    AuthorizeUrl,
    /// Trade an authorization code for a token pair and persist it
    Exchange {
        #[arg(long)]
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // -------------------------------
    // 1. Load YAML config
    // -------------------------------

    let service_config = match config_loader::run(&args.config).await {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::run(None, args.log_level);
            return Err(e);
        }
    };
    logging::run(Some(&service_config), args.log_level);

    match args.command.unwrap_or(Command::Serve) {
        Command::AuthorizeUrl => {
            let client = FitbitClient::from_config(&service_config)?;
            println!("{}", client.authenticator().authorization_url()?);
        }
        Command::Exchange { code } => {
            let client = FitbitClient::from_config(&service_config)?;
            client
                .exchange_code(&code)
                .await
                .context("authorization code exchange failed")?;
            info!("credential stored at '{}'", service_config.token_store.path);
        }
        Command::Serve => {
            // -------------------------------
            // 2. Load credential, fail fast when there is none
            // -------------------------------

            let client = FitbitClient::connect(&service_config).await?;

            // -------------------------------
            // 3. Start http server with admin and metrics routes
            // -------------------------------

            info!("Service starting...");
            server::server::start(&service_config.settings, client).await?;
        }
    }

    Ok(())
}
