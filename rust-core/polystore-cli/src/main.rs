// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! polystore: command-line client for Polystore backends.
//!
//! Resolves a store descriptor (config file, flags, or `POLYSTORE_*`
//! environment), connects the adapter, runs one command and closes it.
//! Values given on the command line are parsed as JSON and fall back to a
//! plain string. Bulk hash commands read a JSON array of entries from a
//! file (or `-` for stdin) and go through the concurrent hash driver.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use polystore::{
    new_store, HashDriver, HashInsert, SingleInsert, StoreAdapter, StoreConfig, StoreTag,
    DEFAULT_BATCH_SIZE,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

/// Talk to a document, key-value or record store.
#[derive(Parser, Debug)]
#[command(name = "polystore", version = VERSION, about = "Polystore command-line client")]
struct Cli {
    /// JSON store descriptor file (`{"storeType": ..., "url": ...}`).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Store type: a flag (1, 2, 4) or a name (document, key-value, record).
    #[arg(long)]
    store_type: Option<String>,

    /// Backend URL, or database file path for the record store.
    #[arg(long)]
    url: Option<String>,

    /// Logical namespace (database or table).
    #[arg(long)]
    name: Option<String>,

    /// Port merged into the URL when it has none.
    #[arg(long)]
    port: Option<u16>,

    /// Open a fresh client instead of reusing one.
    #[arg(long)]
    new_connection: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and health-check the store.
    Ping,
    /// Read one value.
    Get { collection: String, key: String },
    /// Read several values of one collection.
    Mget {
        collection: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Write one value.
    Set {
        collection: String,
        key: String,
        value: String,
        /// Time-to-live in seconds.
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Read one field of a hash.
    Hget {
        collection: String,
        key: String,
        field: String,
    },
    /// Write fields of a hash, given as `field=value`.
    Hset {
        collection: String,
        key: String,
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, Value)>,
        /// Time-to-live in seconds.
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Write many hash entries from a JSON array through the driver.
    BulkHset {
        /// File holding `[{collection, key, fields, ttl?}, ...]`, or `-`.
        input: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Read many hash fields from a JSON array through the driver.
    BulkHget {
        /// File holding `[{collection, key, field}, ...]`, or `-`.
        input: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok((field.to_string(), parse_value(value))),
        _ => Err(format!("expected field=value, got `{raw}`")),
    }
}

fn ttl(seconds: Option<u64>) -> Option<Duration> {
    seconds.map(Duration::from_secs)
}

// ---------------------------------------------------------------------------
// Descriptor resolution
// ---------------------------------------------------------------------------

fn resolve_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = if let Some(path) = &cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        StoreConfig::from_json_str(&text)?
    } else if let Some(store_type) = &cli.store_type {
        let Some(url) = &cli.url else {
            bail!("--url is required with --store-type");
        };
        StoreConfig {
            store_type: match store_type.parse::<u64>() {
                Ok(flag) => StoreTag::Flag(flag),
                Err(_) => StoreTag::Name(store_type.clone()),
            },
            url: url.clone(),
            name: String::new(),
            port: None,
            new_connection: false,
        }
    } else {
        StoreConfig::from_env().context("no --config or --store-type given")?
    };

    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(name) = &cli.name {
        config.name = name.clone();
    }
    if let Some(port) = cli.port {
        config.port = Some(port);
    }
    config.new_connection |= cli.new_connection;
    Ok(config)
}

fn read_entries(path: &Path) -> Result<Vec<Value>> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    match serde_json::from_str(&text)? {
        Value::Array(entries) => Ok(entries),
        _ => bail!("{}: expected a JSON array of entries", path.display()),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_optional(value: Option<Value>) -> Result<()> {
    print_json(&value.unwrap_or(Value::Null))
}

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

async fn run(store: &dyn StoreAdapter, driver: HashDriver, command: Command) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling outstanding work");
            on_interrupt.cancel();
        }
    });

    match command {
        Command::Ping => println!("ok ({})", store.name()),
        Command::Get { collection, key } => print_optional(store.find_one(&collection, &key).await?)?,
        Command::Mget { collection, keys } => {
            let values = store.find_many(&collection, &keys).await?;
            print_json(&Value::Array(
                values.into_iter().map(|v| v.unwrap_or(Value::Null)).collect(),
            ))?;
        }
        Command::Set {
            collection,
            key,
            value,
            ttl: seconds,
        } => {
            let mut record = SingleInsert::new(key, parse_value(&value));
            if let Some(ttl) = ttl(seconds) {
                record = record.with_ttl(ttl);
            }
            store.insert_one(&collection, &record).await?;
            println!("OK");
        }
        Command::Hget {
            collection,
            key,
            field,
        } => print_optional(store.find_one_field(&collection, &key, &field).await?)?,
        Command::Hset {
            collection,
            key,
            fields,
            ttl: seconds,
        } => {
            let mut record = HashInsert::new(collection, key);
            record.fields.extend(fields);
            if let Some(ttl) = ttl(seconds) {
                record = record.with_ttl(ttl);
            }
            store.insert_one_hash(&record).await?;
            println!("OK");
        }
        Command::BulkHset { input, batch_size } => {
            let entries = read_entries(&input)?;
            let count = entries.len();
            driver
                .with_batch_size(batch_size)
                .insert_many_raw(entries, &cancel)
                .await?;
            println!("wrote {count} hash entries");
        }
        Command::BulkHget { input, batch_size } => {
            let entries = read_entries(&input)?;
            let values = driver
                .with_batch_size(batch_size)
                .find_many_raw(entries, &cancel)
                .await?;
            print_json(&Value::Array(
                values.into_iter().map(|v| v.unwrap_or(Value::Null)).collect(),
            ))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    info!(url = %config.endpoint(), "resolved store descriptor");

    let store = new_store(&config)?;
    store
        .connect()
        .await
        .with_context(|| format!("connecting to {}", config.endpoint()))?;

    let driver = HashDriver::new(store.clone());
    let outcome = run(store.as_ref(), driver, cli.command).await;
    store.close().await;
    outcome
}
