//! Profile to job matching.
//!
//! One request runs EMBED → RETRIEVE → DEDUPE and then walks the ranked
//! candidates, serving each from the cache or enriching it, until `top_k`
//! results exist. Only embedding and retrieval failures abort a request;
//! cache and durable-store failures degrade to recomputation.

use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    ai::{EnrichmentClient, EnrichmentOutcome},
    cache::{CacheKey, CacheStore},
    dedup::dedupe,
    jobs::{EnrichedJob, JobPosting, JobStore},
    profiles::Profile,
    semantic::{run_with_timeout, Candidate, Embedder, EmbeddingError, IndexError, JobIndex},
};

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("top_k must be a positive integer")]
    InvalidTopK,

    #[error("Failed to embed profile: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Failed to retrieve candidates: {0}")]
    Retrieval(#[from] IndexError),
}

/// Where a returned job came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSource {
    Cached,
    Enriched(EnrichmentOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedJob {
    pub job: EnrichedJob,
    pub source: MatchSource,
}

impl MatchedJob {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, MatchSource::Enriched(EnrichmentOutcome::Fallback(_)))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub retrieved: usize,
    pub duplicates: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub fallbacks: usize,
    pub cache_failures: usize,
    pub store_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub matches: Vec<MatchedJob>,
    pub stats: MatchStats,
}

pub struct Matcher {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn JobIndex>,
    cache: Arc<dyn CacheStore>,
    jobs: Arc<dyn JobStore>,
    enricher: EnrichmentClient,
    embed_timeout: Option<Duration>,
}

impl Matcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn JobIndex>,
        cache: Arc<dyn CacheStore>,
        jobs: Arc<dyn JobStore>,
        enricher: EnrichmentClient,
    ) -> Self {
        Self {
            embedder,
            index,
            cache,
            jobs,
            enricher,
            embed_timeout: None,
        }
    }

    /// Bound how long the profile embedding may take.
    ///
    /// A timed-out embedding keeps running on its worker thread until it
    /// finishes. [`EmbeddingModel`](crate::semantic::EmbeddingModel) holds its
    /// model lock for that whole call, so later requests in the same process
    /// queue behind it.
    pub fn with_embed_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn match_profile(&self, profile: &Profile, top_k: usize) -> Result<MatchReport, MatchError> {
        if top_k == 0 {
            return Err(MatchError::InvalidTopK);
        }

        let now = Instant::now();
        let mut stats = MatchStats::default();

        let vector = self.embed_profile(profile)?;

        let candidates = self.index.query(&vector, top_k.saturating_mul(2))?;
        stats.retrieved = candidates.len();

        let candidates = dedupe(candidates);
        stats.duplicates = stats.retrieved - candidates.len();

        let mut matches = Vec::with_capacity(top_k);
        for candidate in candidates {
            if matches.len() >= top_k {
                break;
            }

            let key = CacheKey::derive(profile, &candidate.job_id);
            let matched = match self.read_cached(&key, &mut stats) {
                Some(mut job) => {
                    stats.cache_hits += 1;
                    // cached enrichment, posting fields as currently indexed
                    job.posting = Self::indexed_posting(candidate);
                    self.persist(&job, &mut stats);
                    MatchedJob {
                        job,
                        source: MatchSource::Cached,
                    }
                }
                None => {
                    stats.cache_misses += 1;
                    self.enrich_and_store(profile, candidate, &key, &mut stats)
                }
            };

            matches.push(matched);
        }

        log::info!(
            "Matched {} jobs for {} in {}ms: {} retrieved, {} duplicates, {} cache hits, {} enriched ({} fallbacks), {} cache failures, {} store failures",
            matches.len(),
            profile.email,
            now.elapsed().as_millis(),
            stats.retrieved,
            stats.duplicates,
            stats.cache_hits,
            stats.cache_misses,
            stats.fallbacks,
            stats.cache_failures,
            stats.store_failures
        );

        Ok(MatchReport { matches, stats })
    }

    /// The cached enrichment of `job_id` for the current version of `profile`.
    pub fn cached_job(
        &self,
        profile: &Profile,
        job_id: &str,
    ) -> Result<Option<EnrichedJob>, crate::cache::CacheError> {
        let key = CacheKey::derive(profile, job_id);
        let Some(raw) = self.cache.get(key.as_str())? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                log::warn!("Ignoring malformed cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    fn embed_profile(&self, profile: &Profile) -> Result<Vec<f32>, EmbeddingError> {
        let text = profile.profile_text();

        let Some(timeout) = self.embed_timeout else {
            return self.embedder.embed(&text);
        };

        let embedder = self.embedder.clone();
        run_with_timeout(timeout, move || embedder.embed(&text))
    }

    fn indexed_posting(candidate: Candidate) -> JobPosting {
        let mut posting = candidate.fields;
        posting.id = candidate.job_id;
        posting
    }

    /// A cache miss for every failure, so the caller recomputes.
    fn read_cached(&self, key: &CacheKey, stats: &mut MatchStats) -> Option<EnrichedJob> {
        let raw = match self.cache.get(key.as_str()) {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("Failed to read cache entry {}: {}", key, e);
                stats.cache_failures += 1;
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(job) => Some(job),
            Err(e) => {
                log::warn!("Failed to load cached job for {}: {}", key, e);
                None
            }
        }
    }

    fn enrich_and_store(
        &self,
        profile: &Profile,
        candidate: Candidate,
        key: &CacheKey,
        stats: &mut MatchStats,
    ) -> MatchedJob {
        let posting = Self::indexed_posting(candidate);

        log::debug!("Enriching job {} for {}", posting.id, profile.email);
        let enrichment = self.enricher.enrich(profile, &posting);
        if enrichment.is_fallback() {
            stats.fallbacks += 1;
        }

        let job = EnrichedJob::new(posting, enrichment.result);
        self.persist(&job, stats);

        match serde_json::to_string(&job) {
            Ok(payload) => {
                if let Err(e) = self.cache.set(key.as_str(), &payload) {
                    log::error!("Failed to cache job {} for {}: {}", job.id(), profile.email, e);
                    stats.cache_failures += 1;
                }
            }
            Err(e) => {
                log::error!("Failed to serialize job {}: {}", job.id(), e);
                stats.cache_failures += 1;
            }
        }

        MatchedJob {
            job,
            source: MatchSource::Enriched(enrichment.outcome),
        }
    }

    fn persist(&self, job: &EnrichedJob, stats: &mut MatchStats) {
        if let Err(e) = self.jobs.upsert(job) {
            log::error!("Failed to store job {}: {:#}", job.id(), e);
            stats.store_failures += 1;
        }
    }
}
