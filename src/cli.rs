// Command-line interface.
// Subcommands for discovery, link trails, quota, history and cache upkeep.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::discovery::SearchSort;

#[derive(Parser, Debug)]
#[command(name = "mdroulette")]
#[command(about = "Discover random markdown documents on GitHub", long_about = None)]
pub struct Cli {
    /// API base URL
    #[arg(long, global = true, env = "MDROULETTE_API_URL")]
    pub api_url: Option<String>,

    /// Cache directory
    #[arg(long, global = true, env = "MDROULETTE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pick a random repository and one of its markdown documents
    Discover {
        /// Restrict to a primary language
        #[arg(short, long)]
        language: Option<String>,

        /// Minimum star count
        #[arg(long, default_value_t = 1)]
        min_stars: u64,

        /// Recency window in years
        #[arg(long, default_value_t = 3)]
        years: u32,

        /// Result order: best-match, stars, forks or updated
        #[arg(long, default_value_t = SearchSort::BestMatch)]
        sort: SearchSort,

        /// Prefer repositories whose readme mentions documentation
        #[arg(long)]
        docs: bool,
    },

    /// Follow a random relative link from a document
    Next {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        /// Path of the current document in the repository
        #[arg(long)]
        path: String,

        /// Branch, tag or commit
        #[arg(long = "ref")]
        ref_name: Option<String>,

        /// Local copy of the current document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the current API quota
    RateLimit,

    /// Show or clear the reading history
    History {
        #[arg(long)]
        clear: bool,
    },

    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached response
    Clear,

    /// Remove cached responses whose key contains PATTERN
    Invalidate { pattern: String },

    /// Show entry counts and sizes per tier
    Stats,
}
