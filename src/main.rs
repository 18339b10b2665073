use clap::Parser;
use tracing_subscriber::EnvFilter;

mod ai;
mod app;
mod cache;
mod cli;
mod config;
mod dedup;
mod fingerprint;
mod jobs;
mod matcher;
mod profiles;
mod semantic;
mod storage;

use app::AppFactory;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let paths = AppFactory::get_paths()?;
    let app = AppFactory::create_app_service(&paths)?;

    match args.command {
        cli::Command::Import { file, no_index } => cli::handle_import(&app, &file, no_index),
        cli::Command::Index {} => cli::handle_index(&app),
        cli::Command::Match {
            profile,
            top_k,
            stats,
        } => cli::handle_match(&app, &profile, top_k, stats),
        cli::Command::Cached { profile, job } => cli::handle_cached(&app, &profile, &job),
        cli::Command::Chat { profile, message } => {
            cli::handle_chat(&app, profile.as_deref(), &message)
        }
    }
}
