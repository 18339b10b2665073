//! Text-generation collaborators: the HTTP client, enrichment with its
//! reply grammar, and the chat assistant.

pub mod chat;
pub mod client;
pub mod enrich;
pub mod parse;

pub use chat::{ChatAssistant, ChatError, ProfileSummary};
pub use client::{GeminiClient, TextGenerator};
pub use enrich::{Enrichment, EnrichmentClient, EnrichmentOutcome, FallbackReason};
