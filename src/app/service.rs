use std::{collections::HashSet, sync::Arc};

use crate::{
    ai::{ChatAssistant, EnrichmentClient, ProfileSummary, TextGenerator},
    app::errors::AppError,
    cache::CacheStore,
    config::Config,
    jobs::{EnrichedJob, JobPosting, JobStore},
    matcher::{MatchReport, Matcher},
    profiles::{Profile, ProfileStore},
    semantic::{Embedder, IndexReport, JobIndexer, VectorIndex, VectorStorage},
};

/// Long-lived handles the service is built from. Each one is constructed
/// once and shared by every component that needs it.
pub struct AppComponents {
    pub config: Config,
    pub profiles: Arc<dyn ProfileStore>,
    pub jobs: Arc<dyn JobStore>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<VectorIndex>,
    pub vectors: VectorStorage,
    pub generator: Arc<dyn TextGenerator>,
    pub cache: Arc<dyn CacheStore>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

pub struct AppService {
    config: Config,
    profiles: Arc<dyn ProfileStore>,
    jobs: Arc<dyn JobStore>,
    index: Arc<VectorIndex>,
    vectors: VectorStorage,
    model_id: [u8; 32],
    indexer: JobIndexer,
    matcher: Matcher,
    chat: ChatAssistant,
}

impl AppService {
    pub fn new(components: AppComponents) -> Self {
        let AppComponents {
            config,
            profiles,
            jobs,
            embedder,
            index,
            vectors,
            generator,
            cache,
        } = components;

        let embed_timeout = Some(config.embedding.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs);

        let matcher = Matcher::new(
            embedder.clone(),
            index.clone(),
            cache,
            jobs.clone(),
            EnrichmentClient::new(generator.clone()),
        )
        .with_embed_timeout(embed_timeout);

        Self {
            model_id: embedder.model_id_hash(),
            indexer: JobIndexer::new(embedder, index.clone()),
            chat: ChatAssistant::new(generator),
            matcher,
            config,
            profiles,
            jobs,
            index,
            vectors,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store postings from ingestion. Postings without an id or one of the
    /// display fields are skipped.
    pub fn import_jobs(&self, postings: &[JobPosting]) -> Result<ImportReport, AppError> {
        let mut report = ImportReport::default();

        for posting in postings {
            let required = [
                ("id", &posting.id),
                ("title", &posting.title),
                ("company", &posting.company),
                ("location", &posting.location),
                ("type", &posting.employment_type),
                ("posted", &posting.posted),
                ("description", &posting.description),
            ];
            if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
                log::warn!("Skipping job '{}': missing {}", posting.title, field);
                report.skipped += 1;
                continue;
            }

            self.jobs.upsert_posting(posting)?;
            report.imported += 1;
        }

        log::info!(
            "Imported {} jobs, skipped {}",
            report.imported,
            report.skipped
        );
        Ok(report)
    }

    /// Embed every stored job whose content changed, drop vectors of jobs
    /// that are no longer stored and persist the index.
    pub fn index_jobs(&self) -> Result<IndexReport, AppError> {
        let records = self.jobs.list()?;
        let mut report = self
            .indexer
            .index_jobs(records.iter().map(|record| &record.posting));

        let stored: HashSet<&str> = records.iter().map(|r| r.posting.id.as_str()).collect();
        for job_id in self.index.job_ids()? {
            if !stored.contains(job_id.as_str()) && self.index.remove(&job_id)?.is_some() {
                log::info!("Removed vector for deleted job {}", job_id);
                report.removed += 1;
            }
        }

        self.vectors.save(&self.index, &self.model_id)?;
        log::info!(
            "Saved {} vectors to {}",
            self.index.len(),
            self.vectors.path().display()
        );

        Ok(report)
    }

    /// Match a stored profile, given its id or email. `top_k` falls back to
    /// `matcher.top_k`.
    pub fn match_profile(
        &self,
        profile_id: &str,
        top_k: Option<usize>,
    ) -> Result<MatchReport, AppError> {
        let profile = self.profile(profile_id)?;
        let top_k = top_k.unwrap_or(self.config.matcher.top_k);
        Ok(self.matcher.match_profile(&profile, top_k)?)
    }

    pub fn cached_job(
        &self,
        profile_id: &str,
        job_id: &str,
    ) -> Result<Option<EnrichedJob>, AppError> {
        let profile = self.profile(profile_id)?;
        Ok(self.matcher.cached_job(&profile, job_id)?)
    }

    /// Without a profile id the assistant answers with default profile fields.
    pub fn chat(&self, profile_id: Option<&str>, message: &str) -> Result<String, AppError> {
        let summary = match profile_id {
            Some(id) => ProfileSummary::from(&self.profile(id)?),
            None => ProfileSummary::default(),
        };
        Ok(self.chat.reply(message, &summary)?)
    }

    /// Look a profile up by id, then by email when the key looks like one.
    fn profile(&self, key: &str) -> Result<Profile, AppError> {
        if let Some(profile) = self.profiles.get(key)? {
            return Ok(profile);
        }
        if key.contains('@') {
            if let Some(profile) = self.profiles.find_by_email(key)? {
                return Ok(profile);
            }
        }
        Err(AppError::ProfileNotFound(key.to_string()))
    }
}
