//! Yedek CLI - Database migrations and offline cart tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! yedek migrate storefront
//!
//! # Price a cart file with the configured tax, shipping and discounts
//! yedek quote cart.json
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `quote` - Price a cart JSON file offline

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "yedek")]
#[command(author, version, about = "Yedek storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Price a cart JSON file without a database
    Quote {
        /// Path to the cart file
        file: PathBuf,

        /// Print the cart and summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Run storefront database migrations
    Storefront,
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
        Commands::Migrate { target } => match target {
            MigrateTarget::Storefront => commands::migrate::storefront().await?,
        },
        Commands::Quote { file, json } => commands::quote::run(&file, json).await?,
    }
    Ok(())
}
