//! Embeds job postings into the vector index.
//!
//! Each job is embedded from [`JobPosting::embedding_text`]. The fingerprint
//! of that text is stored next to the vector, so re-running the indexer only
//! embeds jobs whose title, description or tags changed. Unchanged jobs still
//! get their stored fields refreshed.

use std::sync::Arc;

use crate::{
    fingerprint::fingerprint,
    jobs::JobPosting,
    semantic::{embeddings::Embedder, index::JobIndex},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub embedded: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Index entries dropped because their job no longer exists
    pub removed: usize,
}

pub struct JobIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn JobIndex>,
}

impl JobIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn JobIndex>) -> Self {
        Self { embedder, index }
    }

    /// Index every job, logging and counting the ones that fail.
    pub fn index_jobs<'a>(&self, jobs: impl IntoIterator<Item = &'a JobPosting>) -> IndexReport {
        let mut report = IndexReport::default();

        for job in jobs {
            match self.index_job(job) {
                Ok(true) => report.embedded += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => {
                    log::warn!("Failed to index job {}: {}", job.id, e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Indexed jobs: {} embedded, {} unchanged, {} failed",
            report.embedded,
            report.unchanged,
            report.failed
        );

        report
    }

    /// Returns `Ok(false)` when the stored vector is already current. The
    /// stored fields are replaced either way.
    pub fn index_job(&self, job: &JobPosting) -> anyhow::Result<bool> {
        let text = job.embedding_text();
        let hash = fingerprint(&text);

        if self.index.content_hash(&job.id)?.as_deref() == Some(hash.as_str()) {
            self.index.update_fields(&job.id, job.clone())?;
            return Ok(false);
        }

        let embedding = self.embedder.embed(&text)?;
        self.index.upsert(&job.id, embedding, job.clone(), &hash)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::tests::posting;
    use crate::semantic::{HashEmbedder, VectorIndex};

    fn indexer() -> (JobIndexer, Arc<VectorIndex>) {
        let embedder = Arc::new(HashEmbedder::new(64));
        let index = Arc::new(VectorIndex::new(64));
        (JobIndexer::new(embedder, index.clone()), index)
    }

    #[test]
    fn test_index_and_skip_unchanged() {
        let (indexer, index) = indexer();
        let jobs = vec![
            posting("1", "Engineer", "Acme", "Remote"),
            posting("2", "Designer", "Globex", "Berlin"),
        ];

        let first = indexer.index_jobs(&jobs);
        assert_eq!(first.embedded, 2);
        assert_eq!(first.unchanged, 0);
        assert_eq!(index.len(), 2);

        let second = indexer.index_jobs(&jobs);
        assert_eq!(second.embedded, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.failed, 0);
    }

    #[test]
    fn test_changed_content_is_reembedded() {
        let (indexer, index) = indexer();
        let mut job = posting("1", "Engineer", "Acme", "Remote");
        indexer.index_jobs([&job]);
        let before = index.get("1").unwrap().unwrap();

        job.tags.push("Kubernetes".to_string());
        assert_eq!(indexer.index_jobs([&job]).embedded, 1);

        let after = index.get("1").unwrap().unwrap();
        assert_ne!(before.content_hash, after.content_hash);
        assert_eq!(after.fields.tags.len(), 3);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_fields_outside_embedding_text_are_refreshed_without_reembedding() {
        let (indexer, index) = indexer();
        let mut job = posting("1", "Engineer", "Acme", "Remote");
        indexer.index_jobs([&job]);
        let before = index.get("1").unwrap().unwrap();

        job.salary = "$200k".to_string();
        job.location = "Berlin".to_string();
        assert_eq!(indexer.index_jobs([&job]).unchanged, 1);

        let after = index.get("1").unwrap().unwrap();
        assert_eq!(after.embedding, before.embedding);
        assert_eq!(after.fields.salary, "$200k");
        assert_eq!(after.fields.location, "Berlin");

        let query = index.query(&after.embedding, 1).unwrap();
        assert_eq!(query[0].fields.location, "Berlin");
    }

    #[test]
    fn test_empty_text_fails() {
        let (indexer, index) = indexer();
        let job = JobPosting {
            id: "blank".to_string(),
            ..Default::default()
        };

        let report = indexer.index_jobs([&job]);
        assert_eq!(report.failed, 1);
        assert!(index.is_empty());
    }
}
