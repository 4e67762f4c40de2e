//! Merkato CLI - Database migrations and account management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! merkato-cli migrate
//!
//! # Let an existing account list products
//! merkato-cli seller grant -e seller@example.com
//!
//! # Take the seller flag away again
//! merkato-cli seller revoke -e seller@example.com
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seller grant|revoke` - Toggle the seller flag on an account

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "merkato-cli")]
#[command(author, version, about = "Merkato CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage seller accounts
    Seller {
        #[command(subcommand)]
        action: SellerAction,
    },
}

#[derive(Subcommand)]
enum SellerAction {
    /// Allow an account to list products
    Grant {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Stop an account from listing products
    Revoke {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

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
        Commands::Seller { action } => match action {
            SellerAction::Grant { email } => commands::seller::set_seller(&email, true).await?,
            SellerAction::Revoke { email } => commands::seller::set_seller(&email, false).await?,
        },
    }
    Ok(())
}
