use std::sync::Arc;

use crate::{
    ai::{client::TextGenerator, parse::parse_ai_response},
    jobs::{EnrichmentResult, JobPosting},
    profiles::Profile,
};

/// Why an enrichment had to fall back to the zero result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    AiCallFailed(String),
    EmptyResponse,
    Unparseable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Genuine,
    Fallback(FallbackReason),
}

/// An enrichment result tagged with how it was produced. A fallback still
/// carries a complete, storable result; the tag only lets callers tell it
/// apart from a genuine score of 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub result: EnrichmentResult,
    pub outcome: EnrichmentOutcome,
}

impl Enrichment {
    pub fn genuine(result: EnrichmentResult) -> Self {
        Self {
            result,
            outcome: EnrichmentOutcome::Genuine,
        }
    }

    pub fn fallback(explanation: String, reason: FallbackReason) -> Self {
        Self {
            result: EnrichmentResult {
                match_score: 0,
                matched_skills: vec![],
                missing_skills: vec![],
                explanation,
            },
            outcome: EnrichmentOutcome::Fallback(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, EnrichmentOutcome::Fallback(_))
    }
}

pub fn build_prompt(profile: &Profile, job: &JobPosting) -> String {
    format!(
        "Analyze this job match and respond in this exact format:
match_score: [number between 0-100]
matched_skills: [skill1, skill2, ...]
missing_skills: [skill1, skill2, ...]
explanation: [detailed explanation]

User Profile:
Name: {}
Email: {}
Role: {}
Skills: {}
Experience: {}

Job Details:
Title: {}
Company: {}
Description: {}
Required Skills: {}
",
        profile.name,
        profile.email,
        profile.role,
        profile.skills.join(", "),
        profile.experience,
        job.title,
        job.company,
        job.description,
        job.tags.join(", "),
    )
}

/// Scores a (profile, job) pair with the text generator.
#[derive(Clone)]
pub struct EnrichmentClient {
    generator: Arc<dyn TextGenerator>,
}

impl EnrichmentClient {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Never fails: every error is folded into a fallback result.
    pub fn enrich(&self, profile: &Profile, job: &JobPosting) -> Enrichment {
        let prompt = build_prompt(profile, job);

        let text = match self.generator.generate(&prompt) {
            Ok(text) => text,
            Err(err) => {
                log::error!("AI enrichment failed for job {}: {:#}", job.id, err);
                let reason = format!("{:#}", err);
                return Enrichment::fallback(
                    format!("AI enrichment failed: {}", reason),
                    FallbackReason::AiCallFailed(reason),
                );
            }
        };

        if text.trim().is_empty() {
            log::error!("AI enrichment failed for job {}: empty response", job.id);
            return Enrichment::fallback(
                "AI enrichment failed: Empty response from AI".to_string(),
                FallbackReason::EmptyResponse,
            );
        }

        parse_ai_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::parse::PARSE_FAILURE_EXPLANATION;
    use crate::jobs::tests::posting;
    use crate::profiles::tests::profile;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Replies with a fixed answer and records every prompt.
    struct ScriptedGenerator {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(vec![]),
            })
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    #[test]
    fn test_prompt_contains_profile_and_job() {
        let prompt = build_prompt(&profile(), &posting("1", "Engineer", "Acme", "Remote"));

        assert!(prompt.starts_with("Analyze this job match"));
        assert!(prompt.contains("Email: jane@example.com"));
        assert!(prompt.contains("Skills: Python, SQL"));
        assert!(prompt.contains("Experience: 3-5 years"));
        assert!(prompt.contains("Title: Engineer"));
        assert!(prompt.contains("Company: Acme"));
        assert!(prompt.contains("Required Skills: Python, SQL"));
    }

    #[test]
    fn test_genuine_enrichment() {
        let generator = ScriptedGenerator::new(Ok(
            "match_score: 85\nmatched_skills: [Python, SQL]\nmissing_skills: [Go]\nexplanation: Good fit",
        ));
        let client = EnrichmentClient::new(generator.clone());

        let enrichment = client.enrich(&profile(), &posting("1", "Engineer", "Acme", "Remote"));

        assert_eq!(enrichment.outcome, EnrichmentOutcome::Genuine);
        assert_eq!(enrichment.result.match_score, 85);
        assert_eq!(enrichment.result.missing_skills, vec!["Go".to_string()]);
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_call_failure_falls_back() {
        let client = EnrichmentClient::new(ScriptedGenerator::new(Err("quota exceeded")));

        let enrichment = client.enrich(&profile(), &posting("1", "Engineer", "Acme", "Remote"));

        assert_eq!(
            enrichment.outcome,
            EnrichmentOutcome::Fallback(FallbackReason::AiCallFailed("quota exceeded".to_string()))
        );
        assert_eq!(enrichment.result.match_score, 0);
        assert!(enrichment.result.matched_skills.is_empty());
        assert_eq!(enrichment.result.explanation, "AI enrichment failed: quota exceeded");
    }

    #[test]
    fn test_empty_reply_falls_back() {
        let client = EnrichmentClient::new(ScriptedGenerator::new(Ok("  \n")));

        let enrichment = client.enrich(&profile(), &posting("1", "Engineer", "Acme", "Remote"));

        assert_eq!(
            enrichment.outcome,
            EnrichmentOutcome::Fallback(FallbackReason::EmptyResponse)
        );
        assert!(enrichment.result.explanation.starts_with("AI enrichment failed:"));
    }

    #[test]
    fn test_unparseable_reply_falls_back() {
        let client = EnrichmentClient::new(ScriptedGenerator::new(Ok("I think it's a great match!")));

        let enrichment = client.enrich(&profile(), &posting("1", "Engineer", "Acme", "Remote"));

        assert!(enrichment.is_fallback());
        assert_eq!(enrichment.result.explanation, PARSE_FAILURE_EXPLANATION);
    }

    #[test]
    fn test_genuine_zero_is_not_a_fallback() {
        let client = EnrichmentClient::new(ScriptedGenerator::new(Ok(
            "match_score: 0\nexplanation: Nothing in common",
        )));

        let enrichment = client.enrich(&profile(), &posting("1", "Engineer", "Acme", "Remote"));

        assert_eq!(enrichment.result.match_score, 0);
        assert!(!enrichment.is_fallback());
    }
}
