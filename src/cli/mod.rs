//! Command line interface for cachekit
//!
//! Every subcommand operates on the cache described by the loaded
//! configuration; `--namespace` selects a `namespaces.<name>` table.

mod commands;

use std::io::Write;

use clap::{Parser, Subcommand};

pub use commands::{execute, parse_value};

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::infrastructure::services::CacheService;

/// cachekit - inspect and manage a cache from the shell
#[derive(Debug, Parser)]
#[command(name = "cachekit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Use the cache settings under `namespaces.<NAME>`
    #[arg(long, short, global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the value stored under a key
    Get { key: String },

    /// Store a primitive value
    Set {
        key: String,
        value: String,

        /// Seconds until expiry; 0 keeps the key until deleted
        #[arg(long, default_value_t = 0)]
        ttl: u64,

        /// Store the value as a string even if it looks like a number or bool
        #[arg(long)]
        string: bool,
    },

    /// Print the values of several keys, one per line
    GetMany {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Delete keys and print how many existed
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Set a new TTL on a key; 0 removes its expiry
    Expire { key: String, ttl: u64 },

    /// Print the remaining TTL of a key (-1 no expiry, -2 missing)
    Ttl { key: String },

    /// Print whether a key exists
    Exists { key: String },

    /// Remove every key under the configured prefix
    Clear,

    /// Print the cache key derived for a computation call
    Key {
        identity: String,

        /// Computation version, the second key segment
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        key_version: i64,

        args: Vec<String>,
    },

    /// Check that the configured backend can be built and reached
    Ping,
}

/// Loads configuration, sets up logging and runs one command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load(cli.namespace.as_deref())?;
    logging::init_logging(&config.logging)?;

    let mut stdout = std::io::stdout().lock();

    if let Command::Key { identity, key_version, args } = &cli.command {
        writeln!(stdout, "{}", commands::derive_key(identity, *key_version, args)?)?;
        return Ok(());
    }

    let cache = CacheService::from_settings(&config.cache).await?;

    let result = execute(&cache, cli.command, &mut stdout).await;

    cache.close().await?;

    result
}
