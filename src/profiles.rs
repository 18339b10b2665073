use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io::ErrorKind, path::Path};

/// A candidate profile. Owned by profile storage; the matcher only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: String,
}

impl Profile {
    /// Text embedded for matching and hashed into the cache key.
    ///
    /// Any change to name, role, skills (or their order) or experience
    /// changes this string and so starts a new profile version.
    pub fn profile_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.name,
            self.role,
            self.skills.join(" "),
            self.experience
        )
    }
}

pub trait ProfileStore: Send + Sync {
    fn get(&self, id: &str) -> anyhow::Result<Option<Profile>>;
    fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Profile>>;
}

/// Read-only profile store loaded from a JSON array file.
#[derive(Debug, Clone, Default)]
pub struct BackendJson {
    profiles: HashMap<String, Profile>,
}

impl BackendJson {
    /// Load profiles from `path`. A missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!("No profile database at {}", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let list: Vec<Profile> = serde_json::from_str(&raw)
            .with_context(|| format!("profile database {} is malformed", path.display()))?;

        Ok(Self::from_profiles(list))
    }

    pub fn from_profiles(list: Vec<Profile>) -> Self {
        Self {
            profiles: list.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

impl ProfileStore for BackendJson {
    fn get(&self, id: &str) -> anyhow::Result<Option<Profile>> {
        Ok(self.profiles.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Profile>> {
        Ok(self
            .profiles
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}
