//! dcraft CLI - Drive the cart engine by hand.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart (guest snapshot, or the remote cart when signed in)
//! dcraft-cart show
//!
//! # Add one unit of a product
//! dcraft-cart add 7 -t "Clay vase" -p 12.50 -s 3
//!
//! # Take one unit away / drop the line / empty the cart
//! dcraft-cart decrease 7
//! dcraft-cart remove 7
//! dcraft-cart clear
//!
//! # Sign in with a bearer token, then sign out again
//! dcraft-cart login --token "$DCRAFT_TOKEN"
//! dcraft-cart logout
//! ```
//!
//! # Environment Variables
//!
//! See `dcraft_cart::config`. `RUST_LOG` controls log verbosity.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dcraft_cart::{CartConfig, CartLineInput};
use dcraft_core::{Price, ProductId};
use secrecy::SecretString;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{CommandError, Session};

#[derive(Parser)]
#[command(name = "dcraft-cart")]
#[command(author, version, about = "dcraft cart engine CLI")]
struct Cli {
    /// Offline cache directory (overrides `DCRAFT_CACHE_DIR`)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Require a signed-in session for every add
    #[arg(long, global = true)]
    signed_in_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the cart and print it
    Show,
    /// Add one unit of a product
    Add {
        /// Product ID
        product_id: ProductId,

        /// Product title
        #[arg(short, long)]
        title: String,

        /// Unit price (decimal)
        #[arg(short, long)]
        price: Price,

        /// Known stock ceiling
        #[arg(short, long)]
        stock: Option<u32>,

        /// Image URL
        #[arg(short, long)]
        image: Option<String>,
    },
    /// Remove one unit of a product
    Decrease {
        /// Product ID
        product_id: ProductId,
    },
    /// Remove a product's line entirely
    Remove {
        /// Product ID
        product_id: ProductId,
    },
    /// Empty the cart
    Clear,
    /// Store a session token and load the remote cart
    Login {
        /// Bearer token issued by the dcraft backend
        #[arg(long)]
        token: String,
    },
    /// Forget the session token and reset the local cart
    Logout,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Warnings and errors become Sentry events; info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dcraft_cart=info,dcraft_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let config = CartConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        if matches!(e, CommandError::Cart(ref err) if err.is_login_required()) {
            tracing::error!("Login required: run `dcraft-cart login --token <TOKEN>`");
        } else {
            tracing::error!("Command failed: {e}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut config: CartConfig) -> Result<(), CommandError> {
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    let session = Session::open(&config, cli.signed_in_only)?;

    match cli.command {
        Commands::Show => commands::cart::show(&session).await?,
        Commands::Add {
            product_id,
            title,
            price,
            stock,
            image,
        } => {
            let mut input = CartLineInput::new(product_id, title, price);
            if let Some(stock) = stock {
                input = input.with_stock(stock);
            }
            if let Some(image) = image {
                input = input.with_image(image);
            }
            commands::cart::add(&session, input).await?;
        }
        Commands::Decrease { product_id } => commands::cart::decrease(&session, product_id).await?,
        Commands::Remove { product_id } => commands::cart::remove(&session, product_id).await?,
        Commands::Clear => commands::cart::clear(&session).await?,
        Commands::Login { token } => {
            commands::session::login(&session, &SecretString::from(token)).await?;
        }
        Commands::Logout => commands::session::logout(&session).await?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "dcraft-cart", "add", "7", "-t", "Clay vase", "-p", "12.50", "-s", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Add {
                product_id,
                price,
                stock,
                image,
                ..
            } => {
                assert_eq!(product_id, ProductId::new(7));
                assert_eq!(price, "12.5".parse::<Price>().unwrap());
                assert_eq!(stock, Some(3));
                assert!(image.is_none());
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_product_id() {
        assert!(Cli::try_parse_from(["dcraft-cart", "remove", "vase"]).is_err());
    }
}
