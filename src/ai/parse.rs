//! Grammar for the enrichment reply.
//!
//! The model is asked for four labelled sections:
//!
//! ```text
//! match_score: <integer>
//! matched_skills: [a, b, ...]
//! missing_skills: [c, ...]
//! explanation: <free text>
//! ```
//!
//! Markers are case-insensitive, may appear in any order and anywhere in
//! the text (optionally wrapped in markdown bold). A section runs from its
//! marker's colon to the next marker or the end of the reply. Only a
//! missing score is fatal; every other gap has a documented default.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::ai::enrich::{Enrichment, FallbackReason};
use crate::jobs::EnrichmentResult;

pub const NO_EXPLANATION: &str = "No explanation provided";
pub const PARSE_FAILURE_EXPLANATION: &str = "Failed to parse AI response";

static MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(match_score|matched_skills|missing_skills|explanation)\**\s*:")
        .expect("Failed to compile marker regex")
});

static INTEGER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+").expect("Failed to compile integer regex"));

static LIST_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]").expect("Failed to compile list regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    MatchScore,
    MatchedSkills,
    MissingSkills,
    Explanation,
}

impl Marker {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "match_score" => Some(Marker::MatchScore),
            "matched_skills" => Some(Marker::MatchedSkills),
            "missing_skills" => Some(Marker::MissingSkills),
            "explanation" => Some(Marker::Explanation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("could not find match_score")]
    MissingMatchScore,
}

/// Text of each section, keyed by the first occurrence of its marker.
#[derive(Debug, Default)]
struct Sections<'a> {
    match_score: Option<&'a str>,
    matched_skills: Option<&'a str>,
    missing_skills: Option<&'a str>,
    explanation: Option<&'a str>,
}

impl<'a> Sections<'a> {
    fn split(text: &'a str) -> Self {
        let markers: Vec<(Marker, usize, usize)> = MARKER_REGEX
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let marker = Marker::from_label(caps.get(1)?.as_str())?;
                Some((marker, whole.start(), whole.end()))
            })
            .collect();

        let mut sections = Sections::default();
        for (i, &(marker, _, body_start)) in markers.iter().enumerate() {
            let body_end = markers
                .get(i + 1)
                .map(|&(_, next_start, _)| next_start)
                .unwrap_or(text.len());
            let body = &text[body_start..body_end];

            let slot = match marker {
                Marker::MatchScore => &mut sections.match_score,
                Marker::MatchedSkills => &mut sections.matched_skills,
                Marker::MissingSkills => &mut sections.missing_skills,
                Marker::Explanation => &mut sections.explanation,
            };
            if slot.is_none() {
                *slot = Some(body);
            }
        }

        sections
    }
}

/// First integer in the section, clamped into `[0, 100]`.
fn parse_score(section: &str) -> Option<u8> {
    let digits = INTEGER_REGEX.find(section)?.as_str();
    // the regex only admits digits, so a parse failure means overflow
    let value = digits.parse::<i64>().unwrap_or(if digits.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    });
    Some(value.clamp(0, 100) as u8)
}

/// Elements of the first `[...]` in the section: trimmed, unquoted,
/// without empties or repeats.
fn parse_skills(section: Option<&str>) -> Vec<String> {
    let Some(inner) = section
        .and_then(|s| LIST_REGEX.captures(s))
        .and_then(|caps| caps.get(1))
    else {
        return vec![];
    };

    let mut seen = HashSet::new();
    inner
        .as_str()
        .split(',')
        .map(|item| item.trim().trim_matches(|c: char| c == '"' || c == '\'').trim())
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.to_string()))
        .map(str::to_string)
        .collect()
}

fn parse_explanation(section: Option<&str>) -> String {
    section
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_EXPLANATION)
        .to_string()
}

/// Parse a reply strictly. Fails only when no score can be found.
pub fn try_parse_ai_response(text: &str) -> Result<EnrichmentResult, ParseError> {
    let sections = Sections::split(text);

    let match_score = sections
        .match_score
        .and_then(parse_score)
        .ok_or(ParseError::MissingMatchScore)?;

    Ok(EnrichmentResult {
        match_score,
        matched_skills: parse_skills(sections.matched_skills),
        missing_skills: parse_skills(sections.missing_skills),
        explanation: parse_explanation(sections.explanation),
    })
}

/// Parse a reply, substituting the fallback result on failure. Never fails.
pub fn parse_ai_response(text: &str) -> Enrichment {
    match try_parse_ai_response(text) {
        Ok(result) => Enrichment::genuine(result),
        Err(err) => {
            log::error!("Error parsing AI response: {}", err);
            Enrichment::fallback(
                PARSE_FAILURE_EXPLANATION.to_string(),
                FallbackReason::Unparseable(err.to_string()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::enrich::EnrichmentOutcome;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonical_response() {
        let text = "match_score: 85\nmatched_skills: [Python, SQL]\nmissing_skills: [Go]\nexplanation: Good fit overall";

        let result = try_parse_ai_response(text).unwrap();
        assert_eq!(
            result,
            EnrichmentResult {
                match_score: 85,
                matched_skills: strings(&["Python", "SQL"]),
                missing_skills: strings(&["Go"]),
                explanation: "Good fit overall".to_string(),
            }
        );

        let enrichment = parse_ai_response(text);
        assert_eq!(enrichment.outcome, EnrichmentOutcome::Genuine);
        assert_eq!(enrichment.result, result);
    }

    #[test]
    fn test_missing_score_falls_back() {
        let text = "matched_skills: [Python]\nexplanation: looks fine";

        assert_eq!(try_parse_ai_response(text), Err(ParseError::MissingMatchScore));

        let enrichment = parse_ai_response(text);
        assert_eq!(enrichment.result.match_score, 0);
        assert!(enrichment.result.matched_skills.is_empty());
        assert!(enrichment.result.missing_skills.is_empty());
        assert_eq!(enrichment.result.explanation, PARSE_FAILURE_EXPLANATION);
        assert!(enrichment.is_fallback());
    }

    #[test]
    fn test_marker_without_number_falls_back() {
        let enrichment = parse_ai_response("match_score: high\nexplanation: x");
        assert!(matches!(
            enrichment.outcome,
            EnrichmentOutcome::Fallback(FallbackReason::Unparseable(_))
        ));
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(try_parse_ai_response("match_score: 150").unwrap().match_score, 100);
        assert_eq!(try_parse_ai_response("match_score: -5").unwrap().match_score, 0);
        assert_eq!(
            try_parse_ai_response("match_score: 99999999999999999999999").unwrap().match_score,
            100
        );
        assert_eq!(
            try_parse_ai_response("match_score: -99999999999999999999999").unwrap().match_score,
            0
        );
    }

    #[test]
    fn test_markers_are_case_insensitive_and_unordered() {
        let text = "Here is my analysis.\nEXPLANATION: Strong backend overlap.\nMissing_Skills: [Kubernetes]\nMatch_Score: 72\nMATCHED_SKILLS: [Rust, Postgres]";

        let result = try_parse_ai_response(text).unwrap();
        assert_eq!(result.match_score, 72);
        assert_eq!(result.matched_skills, strings(&["Rust", "Postgres"]));
        assert_eq!(result.missing_skills, strings(&["Kubernetes"]));
        assert_eq!(result.explanation, "Strong backend overlap.");
    }

    #[test]
    fn test_score_with_brackets_and_suffix() {
        assert_eq!(try_parse_ai_response("match_score: [64]").unwrap().match_score, 64);
        assert_eq!(try_parse_ai_response("match_score: 64/100").unwrap().match_score, 64);
        assert_eq!(try_parse_ai_response("**match_score**: 64").unwrap().match_score, 64);
    }

    #[test]
    fn test_missing_lists_are_empty() {
        let result = try_parse_ai_response("match_score: 40\nexplanation: meh").unwrap();
        assert!(result.matched_skills.is_empty());
        assert!(result.missing_skills.is_empty());
    }

    #[test]
    fn test_list_marker_without_brackets_is_empty() {
        let result = try_parse_ai_response("match_score: 40\nmatched_skills: Python, SQL").unwrap();
        assert!(result.matched_skills.is_empty());
    }

    #[test]
    fn test_skill_elements_are_trimmed_and_unique() {
        let text = "match_score: 10\nmatched_skills: [ \"Python\" ,SQL,, 'SQL' ,  Docker  ]";
        let result = try_parse_ai_response(text).unwrap();
        assert_eq!(result.matched_skills, strings(&["Python", "SQL", "Docker"]));
    }

    #[test]
    fn test_empty_brackets() {
        let result = try_parse_ai_response("match_score: 10\nmissing_skills: []").unwrap();
        assert!(result.missing_skills.is_empty());
    }

    #[test]
    fn test_missing_explanation_uses_placeholder() {
        assert_eq!(
            try_parse_ai_response("match_score: 50").unwrap().explanation,
            NO_EXPLANATION
        );
        assert_eq!(
            try_parse_ai_response("match_score: 50\nexplanation:   \n").unwrap().explanation,
            NO_EXPLANATION
        );
    }

    #[test]
    fn test_multiline_explanation_stops_at_next_marker() {
        let text = "match_score: 90\nexplanation: First line.\nSecond line.\n\nmatched_skills: [Go]";
        let result = try_parse_ai_response(text).unwrap();
        assert_eq!(result.explanation, "First line.\nSecond line.");
        assert_eq!(result.matched_skills, strings(&["Go"]));
    }

    #[test]
    fn test_first_marker_occurrence_wins() {
        let text = "match_score: 30\nexplanation: fine\nmatch_score: 95";
        assert_eq!(try_parse_ai_response(text).unwrap().match_score, 30);
    }

    #[test]
    fn test_score_section_does_not_leak_into_next_section() {
        // the only number after the score marker belongs to the explanation
        let text = "match_score: n/a\nexplanation: 3 years short";
        assert_eq!(try_parse_ai_response(text), Err(ParseError::MissingMatchScore));
    }

    #[test]
    fn test_empty_text() {
        assert!(parse_ai_response("").is_fallback());
    }
}
