use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::{
    app::AppService,
    jobs::{EnrichedJob, JobPosting},
    matcher::{MatchReport, MatchSource, MatchedJob},
};

/// JSON shape of one matched job: the flat enriched job plus its provenance.
#[derive(Debug, Serialize)]
struct MatchOutput<'a> {
    #[serde(flatten)]
    job: &'a EnrichedJob,
    source: &'static str,
}

impl<'a> From<&'a MatchedJob> for MatchOutput<'a> {
    fn from(matched: &'a MatchedJob) -> Self {
        let source = match &matched.source {
            MatchSource::Cached => "cache",
            MatchSource::Enriched(_) if matched.is_fallback() => "fallback",
            MatchSource::Enriched(_) => "ai",
        };
        Self {
            job: &matched.job,
            source,
        }
    }
}

fn render_matches(report: &MatchReport) -> Result<String> {
    let output: Vec<MatchOutput> = report.matches.iter().map(MatchOutput::from).collect();
    Ok(serde_json::to_string_pretty(&output)?)
}

pub fn handle_import(app: &AppService, file: &Path, no_index: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let postings: Vec<JobPosting> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of job postings", file.display()))?;

    let report = app.import_jobs(&postings)?;
    println!("{} imported, {} skipped", report.imported, report.skipped);

    if !no_index {
        handle_index(app)?;
    }
    Ok(())
}

pub fn handle_index(app: &AppService) -> Result<()> {
    let report = app.index_jobs()?;
    println!(
        "{} embedded, {} unchanged, {} failed, {} removed",
        report.embedded, report.unchanged, report.failed, report.removed
    );
    Ok(())
}

pub fn handle_match(
    app: &AppService,
    profile: &str,
    top_k: Option<usize>,
    stats: bool,
) -> Result<()> {
    let report = app.match_profile(profile, top_k)?;
    println!("{}", render_matches(&report)?);

    if stats {
        eprintln!("{}", serde_json::to_string_pretty(&report.stats)?);
    }
    Ok(())
}

pub fn handle_cached(app: &AppService, profile: &str, job: &str) -> Result<()> {
    match app.cached_job(profile, job)? {
        Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
        None => eprintln!("no cached enrichment for job {job}"),
    }
    Ok(())
}

pub fn handle_chat(app: &AppService, profile: Option<&str>, message: &str) -> Result<()> {
    println!("{}", app.chat(profile, message)?);
    Ok(())
}
