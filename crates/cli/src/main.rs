//! Yay Reviews CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! yr-cli migrate
//!
//! # Run the review request sweep now (optionally for another day)
//! yr-cli sweep --date 2025-07-14
//!
//! # Send a sample email to up to five addresses
//! yr-cli send-test-email --shop demo.myshopify.com --kind reward --to me@example.com
//!
//! # Subscribe a shop to fulfillment webhooks
//! yr-cli webhooks register --shop demo.myshopify.com
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `sweep` - Process due review requests once
//! - `send-test-email` - Preview a merchant template with sample data
//! - `webhooks register` - Register the fulfillment webhook for a shop

#![cfg_attr(not(test), forbid(unsafe_code))]

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use yay_reviews_server::services::EmailKind;

mod commands;

#[derive(Parser)]
#[command(name = "yr-cli")]
#[command(author, version, about = "Yay Reviews CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Process review requests due today (UTC)
    Sweep {
        /// Process requests scheduled on this day instead (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Send a template rendered with sample data
    SendTestEmail {
        /// Shop domain (e.g. demo.myshopify.com)
        #[arg(short, long)]
        shop: String,

        /// Template to render (`reminder` or `reward`)
        #[arg(short, long, default_value = "reminder")]
        kind: EmailKind,

        /// Recipient address (repeat for up to five)
        #[arg(short, long = "to", required = true)]
        to: Vec<String>,
    },
    /// Manage Shopify webhook subscriptions
    Webhooks {
        #[command(subcommand)]
        action: WebhookAction,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Subscribe a shop to fulfillment notifications
    Register {
        /// Shop domain (e.g. demo.myshopify.com)
        #[arg(short, long)]
        shop: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Shopify and SMTP calls need a crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::warn!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Sweep { date } => commands::sweep::run(date).await?,
        Commands::SendTestEmail { shop, kind, to } => {
            commands::test_email::send(&shop, kind, &to).await?;
        }
        Commands::Webhooks { action } => match action {
            WebhookAction::Register { shop } => commands::webhooks::register(&shop).await?,
        },
    }
    Ok(())
}
