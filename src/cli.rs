use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fileshelf", about = "Org-scoped file stash with semantic search")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP daemon with the background embedding queue
    Daemon {
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,
    },

    /// Upload a file from disk and schedule its embedding
    Add {
        path: PathBuf,

        #[arg(long)]
        org: String,

        #[arg(long, default_value = "cli")]
        user: String,

        /// Display name; defaults to the file name
        #[arg(long)]
        name: Option<String>,

        /// Declared category (image, pdf, word, presentation,
        /// spreadsheet, csv, archive, audio, video, other); sniffed
        /// when omitted
        #[arg(long)]
        category: Option<String>,
    },

    /// Semantic search within one org
    Search {
        #[arg(long)]
        org: String,

        query: String,
    },

    /// List files by name/category filters
    List {
        #[arg(long)]
        org: String,

        #[arg(long)]
        keyword: Option<String>,

        /// Show the trash instead of active files
        #[arg(long)]
        deleted: bool,
    },

    /// Schedule embedding for every file still missing a vector
    Backfill {},

    /// Re-run extraction + embedding for one file
    Retry { id: u64 },

    /// Hard-delete files past the soft-delete grace period
    Purge {},
}
