use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use groupsmigrate::archive::DryRunArchive;
use groupsmigrate::config::{CliArgs, Config};
use groupsmigrate::groups_client::GroupsClient;
use groupsmigrate::mailbox::Mailbox;
use groupsmigrate::uploader::{RunSummary, Uploader};

#[tokio::main]
async fn main() -> Result<()> {
    // Load a .env file if present
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging
    env_logger::init();

    // Resolve the run parameters
    let config = Config::from_args(&args).context("Invalid configuration")?;

    // If requested, only show the configuration
    if args.check_config {
        println!("✅ Configuration valid!");
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if config.dry_run {
        info!("🧪 Starting groupsmigrate in DRY-RUN mode (no authentication, no upload)");
    } else {
        info!("🚀 Starting groupsmigrate for group {}", config.group_id);
    }

    // A missing archive is fatal before any authentication
    config.check_mbox()?;
    let mailbox = Mailbox::open(&config.mbox_file)?;

    match run(&config, &mailbox).await {
        Ok(summary) => {
            println!("{}", summary);
            Ok(())
        }
        Err(e) => {
            error!("❌ Migration aborted: {:#}", e);
            Err(e)
        }
    }
}

async fn run(config: &Config, mailbox: &Mailbox) -> Result<RunSummary> {
    // Dry-run: no authentication, every eligible message is accepted locally
    if config.dry_run {
        let uploader = Uploader::new(&DryRunArchive, config);
        return Ok(uploader.run(mailbox).await);
    }

    // Authenticate, then upload through the Groups Migration API
    let client = GroupsClient::new(&config.auth)
        .await
        .context("Unable to connect to Groups Migration API")?;

    let uploader = Uploader::new(&client, config);
    Ok(uploader.run(mailbox).await)
}
