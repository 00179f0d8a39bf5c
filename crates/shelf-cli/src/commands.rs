use clap::{Parser, Subcommand};
use shelf_core::storage::models::EntryType;

#[derive(Debug, Parser)]
#[command(name = "shelf")]
#[command(about = "Filesystem catalog with media indexing and streaming", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan the configured roots forever, sleeping between passes
    Run,
    /// Run a single scan and catalog pass
    Scan,
    /// Serve cataloged files over HTTP
    Serve {
        /// Bind address, overrides the configured one
        #[arg(long)]
        listen: Option<String>,
    },
    /// Search entries by path, comment or tag
    Search {
        query: String,
        /// Only return entries of this type (file, folder, link)
        #[arg(long = "type")]
        entry_type: Option<EntryType>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show the most used tags
    Tags {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// Protect a file entry with a password
    SetPassword { id: String, password: String },
    /// Remove the password from a file entry
    RemovePassword { id: String },
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}
