use std::collections::HashSet;

use crate::{fingerprint::fingerprint, jobs::JobPosting, semantic::Candidate};

/// Key under which two postings count as the same job: trimmed, lower-cased
/// title, company and location.
pub fn dedup_key(job: &JobPosting) -> String {
    let raw = format!(
        "{}_{}_{}",
        job.title.trim().to_lowercase(),
        job.company.trim().to_lowercase(),
        job.location.trim().to_lowercase()
    );
    fingerprint(&raw)
}

/// Drop candidates whose dedup key was already seen. First occurrence wins
/// and the surviving order is unchanged.
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(dedup_key(&candidate.fields)))
        .collect()
}
