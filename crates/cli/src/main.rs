//! ecomm CLI - Schema migrations, event ingest and order handling.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! ecomm migrate run
//!
//! # Show applied and pending migrations
//! ecomm migrate status
//!
//! # Ingest newline-delimited entity events (stdin when --file is omitted)
//! ecomm ingest --file events.ndjson
//!
//! # Replay events stored in failed_events
//! ecomm ingest retry --topic products
//!
//! # Place an order from a cart
//! ecomm checkout --cart <CART_ID> --payment credit_card --delivery standard
//!
//! # Move an order one step along its fulfilment path
//! ecomm order advance --order <ORDER_ID>
//!
//! # Audit the category tree for cycles and dangling parents
//! ecomm category check
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` or `POSTGRES_HOST` / `POSTGRES_PORT` / `POSTGRES_DB` /
//!   `POSTGRES_USER` / `POSTGRES_PASSWORD` - Database connection
//! - `RUST_LOG` - Log filter (default `ecomm=info`)
//! - `LOG_FORMAT` - `json` for structured log lines

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecomm_core::{CartId, OrderId};

mod commands;

#[derive(Parser)]
#[command(name = "ecomm")]
#[command(author, version, about = "ecomm store tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Ingest newline-delimited entity events
    #[command(args_conflicts_with_subcommands = true)]
    Ingest {
        /// Input file; reads stdin when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[command(subcommand)]
        action: Option<IngestAction>,
    },
    /// Place an order from an active cart
    Checkout {
        /// Cart to check out
        #[arg(long)]
        cart: CartId,

        /// Payment method, e.g. `credit_card`
        #[arg(long)]
        payment: String,

        /// Delivery method, e.g. `standard`
        #[arg(long)]
        delivery: String,
    },
    /// Manage orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Inspect the category tree
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply pending migrations
    Run,
    /// List migrations and whether they are applied
    Status,
}

#[derive(Subcommand)]
enum IngestAction {
    /// Replay events stored in failed_events
    Retry {
        /// Only retry this topic
        #[arg(long)]
        topic: Option<String>,

        /// Maximum number of events to replay
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Advance an order to its next status
    Advance {
        #[arg(long)]
        order: OrderId,
    },
    /// Cancel an order that hasn't shipped
    Cancel {
        #[arg(long)]
        order: OrderId,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    /// Report parent cycles and dangling parents
    Check,
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ecomm=info,ecomm_db=info,ecomm_cli=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let pool = commands::connect().await?;

    match cli.command {
        Commands::Migrate { action } => match action {
            MigrateAction::Run => commands::migrate::run(&pool).await?,
            MigrateAction::Status => commands::migrate::status(&pool).await?,
        },
        Commands::Ingest { file, action } => match action {
            None => commands::ingest::run(&pool, file.as_deref()).await?,
            Some(IngestAction::Retry { topic, limit }) => {
                commands::ingest::retry(&pool, topic.as_deref(), limit).await?;
            }
        },
        Commands::Checkout {
            cart,
            payment,
            delivery,
        } => commands::checkout::run(&pool, cart, &payment, &delivery).await?,
        Commands::Order { action } => match action {
            OrderAction::Advance { order } => commands::order::advance(&pool, order).await?,
            OrderAction::Cancel { order } => commands::order::cancel(&pool, order).await?,
        },
        Commands::Category { action } => match action {
            CategoryAction::Check => commands::category::check(&pool).await?,
        },
    }

    pool.close().await;
    Ok(())
}
