use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add or update jobs from a JSON array of postings
    Import {
        /// Path to the JSON file
        file: std::path::PathBuf,

        /// Skip re-indexing after the import
        #[clap(long, default_value = "false")]
        no_index: bool,
    },

    /// Embed every job in jobs.csv into the vector index
    Index {},

    /// Match a profile against indexed jobs and print the results as JSON
    Match {
        /// Profile id or email
        #[clap(short, long)]
        profile: String,

        /// Number of jobs to return. Defaults to matcher.top_k from config
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Also print request statistics to stderr
        #[clap(long, default_value = "false")]
        stats: bool,
    },

    /// Print the cached enrichment of one job for a profile
    Cached {
        /// Profile id or email
        #[clap(short, long)]
        profile: String,

        /// Job id
        #[clap(short, long)]
        job: String,
    },

    /// Ask the career assistant a question
    Chat {
        /// Profile id or email. Without it the assistant uses default profile fields
        #[clap(short, long)]
        profile: Option<String>,

        message: String,
    },
}
