use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ai::client::TextGenerator, profiles::Profile};

pub const CHAT_FAILURE_REPLY: &str = "I'm sorry, I couldn't process that question right now.";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
}

/// Whatever the caller knows about the user. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub experience: Option<String>,
}

impl From<&Profile> for ProfileSummary {
    fn from(profile: &Profile) -> Self {
        fn non_empty(value: &str) -> Option<String> {
            Some(value.to_string()).filter(|v| !v.trim().is_empty())
        }

        Self {
            name: non_empty(&profile.name),
            role: non_empty(&profile.role),
            skills: Some(profile.skills.clone()),
            experience: non_empty(&profile.experience),
        }
    }
}

pub fn build_chat_prompt(message: &str, profile: &ProfileSummary) -> String {
    format!(
        "You are an AI career assistant. The user has this profile:
- Name: {}
- Role: {}
- Skills: {}
- Experience: {}

User asked: \"{}\"

Respond in a helpful, structured way.
",
        profile.name.as_deref().unwrap_or("Anonymous"),
        profile.role.as_deref().unwrap_or("Developer"),
        profile.skills.as_deref().unwrap_or_default().join(", "),
        profile.experience.as_deref().unwrap_or("Not specified"),
        message
    )
}

/// Free-form career questions. No retrieval and no caching.
#[derive(Clone)]
pub struct ChatAssistant {
    generator: Arc<dyn TextGenerator>,
}

impl ChatAssistant {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn reply(&self, message: &str, profile: &ProfileSummary) -> Result<String, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        match self.generator.generate(&build_chat_prompt(message, profile)) {
            Ok(text) => Ok(text.trim().to_string()),
            Err(err) => {
                log::error!("Error generating AI chat response: {:#}", err);
                Ok(CHAT_FAILURE_REPLY.to_string())
            }
        }
    }
}
