use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Instant,
};

/// A job posting as produced by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(rename = "type", default)]
    pub employment_type: String,
    #[serde(default)]
    pub posted: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub salary: String,
    #[serde(default)]
    pub benefits: Vec<String>,
}

impl JobPosting {
    /// Text the job is embedded from. Changing any part of it requires a
    /// fresh embedding.
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.description,
            self.tags.join(", ")
        )
    }
}

/// Outcome of AI enrichment for one (profile, job) pair. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnrichmentResult {
    #[serde(default)]
    pub match_score: u8,
    #[serde(default)]
    pub matched_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

/// Job fields merged with enrichment fields.
///
/// Serialises flat, so the cache payload and the durable record share one
/// field set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnrichedJob {
    #[serde(flatten)]
    pub posting: JobPosting,
    #[serde(flatten)]
    pub enrichment: EnrichmentResult,
}

impl EnrichedJob {
    pub fn new(posting: JobPosting, enrichment: EnrichmentResult) -> Self {
        Self {
            posting,
            enrichment,
        }
    }

    pub fn id(&self) -> &str {
        &self.posting.id
    }
}

/// A durable job row: the posting plus the most recent enrichment, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobRecord {
    pub posting: JobPosting,
    pub enrichment: Option<EnrichmentResult>,
}

/// Durable job storage. Upserts replace by id.
pub trait JobStore: Send + Sync {
    /// Write an enriched job, replacing any row with the same id.
    fn upsert(&self, job: &EnrichedJob) -> anyhow::Result<()>;
    /// Write a posting from ingestion. Keeps the row's enrichment when the id exists.
    fn upsert_posting(&self, posting: &JobPosting) -> anyhow::Result<()>;
    fn get(&self, id: &str) -> anyhow::Result<Option<JobRecord>>;
    fn list(&self) -> anyhow::Result<Vec<JobRecord>>;
}

const CSV_HEADERS: [&str; 14] = [
    "id",
    "title",
    "company",
    "location",
    "type",
    "posted",
    "description",
    "tags",
    "salary",
    "benefits",
    "matched_skills",
    "missing_skills",
    "match_score",
    "explanation",
];

/// One CSV row. List columns hold JSON arrays; enrichment columns are
/// blank until the job has been enriched.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CsvRow {
    id: String,
    title: String,
    company: String,
    location: String,
    #[serde(rename = "type")]
    employment_type: String,
    posted: String,
    description: String,
    tags: String,
    salary: String,
    benefits: String,
    matched_skills: String,
    missing_skills: String,
    match_score: String,
    explanation: String,
}

fn parse_list(column: &str, value: &str) -> anyhow::Result<Vec<String>> {
    if value.trim().is_empty() {
        return Ok(vec![]);
    }
    serde_json::from_str(value).with_context(|| format!("invalid {column} column: {value}"))
}

fn format_list(values: &[String]) -> anyhow::Result<String> {
    Ok(serde_json::to_string(values)?)
}

impl TryFrom<CsvRow> for JobRecord {
    type Error = anyhow::Error;

    fn try_from(row: CsvRow) -> anyhow::Result<Self> {
        let posting = JobPosting {
            tags: parse_list("tags", &row.tags)?,
            benefits: parse_list("benefits", &row.benefits)?,
            id: row.id,
            title: row.title,
            company: row.company,
            location: row.location,
            employment_type: row.employment_type,
            posted: row.posted,
            description: row.description,
            salary: row.salary,
        };

        let enrichment = if row.match_score.trim().is_empty() {
            None
        } else {
            Some(EnrichmentResult {
                match_score: row
                    .match_score
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid match_score for job {}", posting.id))?,
                matched_skills: parse_list("matched_skills", &row.matched_skills)?,
                missing_skills: parse_list("missing_skills", &row.missing_skills)?,
                explanation: row.explanation,
            })
        };

        Ok(JobRecord {
            posting,
            enrichment,
        })
    }
}

impl TryFrom<&JobRecord> for CsvRow {
    type Error = anyhow::Error;

    fn try_from(record: &JobRecord) -> anyhow::Result<Self> {
        let posting = &record.posting;
        let mut row = CsvRow {
            id: posting.id.clone(),
            title: posting.title.clone(),
            company: posting.company.clone(),
            location: posting.location.clone(),
            employment_type: posting.employment_type.clone(),
            posted: posting.posted.clone(),
            description: posting.description.clone(),
            tags: format_list(&posting.tags)?,
            salary: posting.salary.clone(),
            benefits: format_list(&posting.benefits)?,
            ..Default::default()
        };

        if let Some(enrichment) = &record.enrichment {
            row.matched_skills = format_list(&enrichment.matched_skills)?;
            row.missing_skills = format_list(&enrichment.missing_skills)?;
            row.match_score = enrichment.match_score.to_string();
            row.explanation = enrichment.explanation.clone();
        }

        Ok(row)
    }
}

/// Job store backed by a single CSV file, rewritten atomically on each change.
#[derive(Debug, Clone)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<JobRecord>>>,
    path: PathBuf,
}

impl BackendCsv {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new job database at {}", path.display());
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut records = vec![];
        for row in csv_reader.deserialize::<CsvRow>() {
            records.push(JobRecord::try_from(row?)?);
        }

        log::debug!(
            "took {}ms to read {} jobs",
            now.elapsed().as_micros() as f64 / 1000.0,
            records.len()
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(records)),
            path: path.to_path_buf(),
        })
    }

    fn save(&self, records: &[JobRecord]) -> anyhow::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = tempfile::NamedTempFile::new_in(dir)?;

        {
            let mut csv_wrt = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(temp.as_file());
            csv_wrt.write_record(CSV_HEADERS)?;
            for record in records {
                csv_wrt.serialize(CsvRow::try_from(record)?)?;
            }
            csv_wrt.flush()?;
        }

        temp.persist(&self.path)?;
        Ok(())
    }

    fn write_with<F>(&self, id: &str, apply: F) -> anyhow::Result<()>
    where
        F: FnOnce(Option<&mut JobRecord>) -> Option<JobRecord>,
    {
        let mut records = self
            .list
            .write()
            .map_err(|e| anyhow!("job store lock poisoned: {e}"))?;

        // memory only changes once the file does
        let mut updated = records.clone();
        let existing = updated.iter_mut().find(|r| r.posting.id == id);
        if let Some(new_record) = apply(existing) {
            updated.push(new_record);
        }

        self.save(&updated)?;
        *records = updated;
        Ok(())
    }
}

impl JobStore for BackendCsv {
    fn upsert(&self, job: &EnrichedJob) -> anyhow::Result<()> {
        let record = JobRecord {
            posting: job.posting.clone(),
            enrichment: Some(job.enrichment.clone()),
        };

        self.write_with(job.id(), |existing| match existing {
            Some(row) => {
                *row = record;
                None
            }
            None => Some(record),
        })
    }

    fn upsert_posting(&self, posting: &JobPosting) -> anyhow::Result<()> {
        self.write_with(&posting.id, |existing| match existing {
            Some(row) => {
                row.posting = posting.clone();
                None
            }
            None => Some(JobRecord {
                posting: posting.clone(),
                enrichment: None,
            }),
        })
    }

    fn get(&self, id: &str) -> anyhow::Result<Option<JobRecord>> {
        let records = self
            .list
            .read()
            .map_err(|e| anyhow!("job store lock poisoned: {e}"))?;
        Ok(records.iter().find(|r| r.posting.id == id).cloned())
    }

    fn list(&self) -> anyhow::Result<Vec<JobRecord>> {
        let records = self
            .list
            .read()
            .map_err(|e| anyhow!("job store lock poisoned: {e}"))?;
        Ok(records.clone())
    }
}
