//! SyncDB CLI
//!
//! Command-line access to a SyncDB store.
//!
//! # Commands
//!
//! - `run` - Serve peers and sync periodically
//! - `sync` - Run a single sync round
//! - `get` / `set` / `gset` - Read and write settings
//! - `exec` / `query` - Run SQL
//! - `ids` - List recorded transaction ids
//! - `tables` / `schema` - Inspect user tables

mod commands;

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use syncdb_sync_engine::DEFAULT_DISCOVERY_URL;
use tracing_subscriber::EnvFilter;

/// SyncDB command-line tools.
#[derive(Parser)]
#[command(name = "syncdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, long, default_value = "store.db")]
    db: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve peers and sync every interval until interrupted
    Run {
        /// Company id to store before starting
        #[arg(long)]
        company: Option<String>,

        /// Node id to store before starting
        #[arg(long)]
        node: Option<String>,

        /// Address the sync listener binds to
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Discovery service URL
        #[arg(long, default_value = DEFAULT_DISCOVERY_URL)]
        discovery: String,

        /// Seconds between sync rounds
        #[arg(long, default_value = "300")]
        interval: u64,
    },

    /// Run one sync round
    Sync {
        /// Discovery service URL
        #[arg(long, default_value = DEFAULT_DISCOVERY_URL)]
        discovery: String,
    },

    /// Read a setting
    Get {
        /// Setting key
        key: String,
    },

    /// Write a local setting
    Set {
        /// Setting key
        key: String,
        /// Setting value
        value: String,
    },

    /// Write a setting that replicates to peers
    Gset {
        /// Setting key
        key: String,
        /// Setting value
        value: String,
    },

    /// Execute a logged SQL statement
    Exec {
        /// SQL text
        sql: String,
    },

    /// Run a read-only query
    Query {
        /// SQL text
        sql: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List recorded transaction ids
    Ids,

    /// List user tables
    Tables,

    /// Show the columns of a table
    Schema {
        /// Table name
        table: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            company,
            node,
            bind,
            discovery,
            interval,
        } => {
            let options = commands::run::RunOptions {
                company,
                node,
                bind,
                discovery_url: discovery,
                interval: std::time::Duration::from_secs(interval),
            };
            commands::run::run(&cli.db, options)?;
        }
        Commands::Sync { discovery } => commands::run::sync_once(&cli.db, discovery)?,
        Commands::Get { key } => println!("{}", commands::settings::get(&cli.db, &key)?),
        Commands::Set { key, value } => {
            println!("{}", commands::settings::set(&cli.db, &key, &value, false)?)
        }
        Commands::Gset { key, value } => {
            println!("{}", commands::settings::set(&cli.db, &key, &value, true)?)
        }
        Commands::Exec { sql } => println!("{}", commands::sql::exec(&cli.db, &sql)?),
        Commands::Query { sql, format } => {
            println!("{}", commands::sql::query(&cli.db, &sql, &format)?)
        }
        Commands::Ids => {
            for id in commands::sql::ids(&cli.db)? {
                println!("{id}");
            }
        }
        Commands::Tables => println!("{}", commands::sql::tables(&cli.db)?),
        Commands::Schema { table } => println!("{}", commands::sql::schema(&cli.db, &table)?),
        Commands::Version => {
            println!("SyncDB CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
