//! Sled-backed settings store: provider profiles, language preference and
//! prompt templates, each kept as one JSON value under its own key.

use crate::profile::{normalize_endpoint, Profile, MAX_TEMPERATURE, MIN_TEMPERATURE};
use crate::prompt::Prompt;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const PROFILES_KEY: &str = "profiles";
const LANGUAGE_KEY: &str = "language";
const PROMPTS_KEY: &str = "prompts";

pub const DEFAULT_LANGUAGE: &str = "en";

/// Errors that can occur in the settings store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("no profile at index {0}")]
    ProfileNotFound(usize),
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),
}

/// Profiles, language and prompts persisted in sled.
#[derive(Clone)]
pub struct SettingsStore {
    db: sled::Db,
}

impl SettingsStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_vec(value)?;
        self.db.insert(key, value)?;
        self.db.flush()?;
        Ok(())
    }

    /// Profiles in priority order; the first is the default.
    pub fn profiles(&self) -> Result<Vec<Profile>, StorageError> {
        Ok(self.read(PROFILES_KEY)?.unwrap_or_default())
    }

    /// Replace the profile list, renumbering `index` to list position.
    pub fn save_profiles(&self, mut profiles: Vec<Profile>) -> Result<(), StorageError> {
        for (index, profile) in profiles.iter_mut().enumerate() {
            profile.index = index;
        }
        debug!(count = profiles.len(), "saving profiles");
        self.write(PROFILES_KEY, &profiles)
    }

    /// Validate, normalise and append a profile. Returns it as stored.
    pub fn add_profile(&self, mut profile: Profile) -> Result<Profile, StorageError> {
        validate_profile(&profile)?;
        profile.api_endpoint = normalize_endpoint(&profile.api_endpoint);

        let mut profiles = self.profiles()?;
        profile.index = profiles.len();
        profiles.push(profile.clone());
        self.save_profiles(profiles)?;
        Ok(profile)
    }

    /// Remove the profile at `index` and reindex the rest.
    pub fn remove_profile(&self, index: usize) -> Result<Profile, StorageError> {
        let mut profiles = self.profiles()?;
        if index >= profiles.len() {
            return Err(StorageError::ProfileNotFound(index));
        }
        let removed = profiles.remove(index);
        self.save_profiles(profiles)?;
        Ok(removed)
    }

    /// Make the profile at `index` the default.
    pub fn move_to_top(&self, index: usize) -> Result<(), StorageError> {
        let mut profiles = self.profiles()?;
        if index >= profiles.len() {
            return Err(StorageError::ProfileNotFound(index));
        }
        let profile = profiles.remove(index);
        profiles.insert(0, profile);
        self.save_profiles(profiles)
    }

    /// Summary language code; `en` until one is set.
    pub fn language(&self) -> Result<String, StorageError> {
        Ok(self
            .read(LANGUAGE_KEY)?
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()))
    }

    pub fn set_language(&self, code: &str) -> Result<(), StorageError> {
        self.write(LANGUAGE_KEY, &code)
    }

    /// Stored prompts, or the built-in `/summarize` prompt when none exist.
    pub fn prompts(&self) -> Result<Vec<Prompt>, StorageError> {
        match self.read::<Vec<Prompt>>(PROMPTS_KEY)? {
            Some(prompts) if !prompts.is_empty() => Ok(prompts),
            _ => Ok(vec![Prompt::default_summarize()]),
        }
    }

    /// Add a prompt, or update the content of an existing one with the same command.
    pub fn add_prompt(&self, command: &str, content: &str) -> Result<Prompt, StorageError> {
        let command = command.trim();
        if !command.starts_with('/') || command.len() < 2 {
            return Err(StorageError::InvalidPrompt(format!(
                "command '{command}' must start with '/'"
            )));
        }
        if content.trim().is_empty() {
            return Err(StorageError::InvalidPrompt("content is empty".to_string()));
        }

        let mut prompts = self.prompts()?;
        let prompt = match prompts.iter_mut().find(|p| p.command == command) {
            Some(existing) => {
                existing.content = content.to_string();
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let prompt = Prompt::new(command, content);
                prompts.push(prompt.clone());
                prompt
            }
        };
        self.write(PROMPTS_KEY, &prompts)?;
        Ok(prompt)
    }

    pub fn find_prompt(&self, command: &str) -> Result<Option<Prompt>, StorageError> {
        Ok(self.prompts()?.into_iter().find(|p| p.command == command))
    }
}

fn validate_profile(profile: &Profile) -> Result<(), StorageError> {
    let invalid = |msg: &str| Err(StorageError::InvalidProfile(msg.to_string()));
    if profile.profile_name.trim().is_empty() {
        return invalid("profile name is required");
    }
    if profile.api_endpoint.trim().is_empty() {
        return invalid("API endpoint is required");
    }
    if profile.api_key.trim().is_empty() {
        return invalid("API key is required");
    }
    if profile.model_name.trim().is_empty() {
        return invalid("model name is required");
    }
    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&profile.temperature) {
        return Err(StorageError::InvalidProfile(format!(
            "temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}"
        )));
    }
    Ok(())
}
