//! LLM provider profiles and per-call API settings.
//!
//! Profiles are stored as an ordered list; the first one is the default and
//! is the only one a summarisation call ever reads.

use crate::summary::SummaryError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_TEMPERATURE: f32 = 0.1;
pub const MAX_TEMPERATURE: f32 = 1.5;
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

const CHAT_COMPLETIONS_SUFFIX: &str = "/chat/completions";

/// Provider families a profile can point at. Only the OpenAI-shaped ones
/// have working endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OaiCompatible,
    OpenAi,
    Anthropic,
    Gemini,
    LmStudio,
}

impl ProviderType {
    pub const ALL: [ProviderType; 5] = [
        ProviderType::OaiCompatible,
        ProviderType::OpenAi,
        ProviderType::Anthropic,
        ProviderType::Gemini,
        ProviderType::LmStudio,
    ];

    /// Stored form, as written in the `provider_type` field.
    pub fn key(self) -> &'static str {
        match self {
            ProviderType::OaiCompatible => "oai_compatible",
            ProviderType::OpenAi => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::LmStudio => "lmstudio",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderType::OaiCompatible => "OpenAI Compatible",
            ProviderType::OpenAi => "OpenAI",
            ProviderType::Anthropic => "Anthropic",
            ProviderType::Gemini => "Gemini",
            ProviderType::LmStudio => "LM Studio",
        }
    }

    /// Endpoint pre-filled for new profiles of this type, empty when the
    /// user must supply one.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            ProviderType::OaiCompatible => "",
            ProviderType::OpenAi => "https://api.openai.com/v1",
            ProviderType::Anthropic => "https://api.anthropic.com",
            ProviderType::Gemini => "https://generativelanguage.googleapis.com",
            ProviderType::LmStudio => "http://127.0.0.1:1234/v1",
        }
    }

    pub fn from_key(key: &str) -> Option<ProviderType> {
        ProviderType::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// One saved provider configuration.
///
/// `provider_type` stays a string so profiles written by newer versions
/// with unknown provider kinds still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub profile_name: String,
    #[serde(default)]
    pub provider_type: String,
    #[serde(default)]
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Profile {
    /// The known provider for this profile, if the type is recognised.
    pub fn provider(&self) -> Option<ProviderType> {
        ProviderType::from_key(&self.provider_type)
    }

    /// Names of the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("provider_type", &self.provider_type),
            ("api_endpoint", &self.api_endpoint),
            ("api_key", &self.api_key),
            ("model_name", &self.model_name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Strip trailing slashes and a trailing `/chat/completions`, leaving the
/// base URL the request path is appended to.
pub fn normalize_endpoint(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(CHAT_COMPLETIONS_SUFFIX)
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

/// Settings resolved for a single summarisation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    /// Display name of the provider.
    pub provider: String,
    pub api_key: String,
    pub api_endpoint: String,
    pub model: String,
    pub language: String,
    pub temperature: f32,
}

impl ApiSettings {
    pub fn chat_completions_url(&self) -> String {
        format!("{}{}", self.api_endpoint, CHAT_COMPLETIONS_SUFFIX)
    }
}

/// Resolve the API settings from the first (default) profile.
pub fn resolve(profiles: &[Profile], language: &str) -> Result<ApiSettings, SummaryError> {
    let profile = profiles.first().ok_or(SummaryError::NoProfileConfigured)?;
    let missing = profile.missing_fields();
    if !missing.is_empty() {
        return Err(SummaryError::IncompleteProfile(format!(
            "profile '{}' is missing {}",
            profile.profile_name,
            missing.join(", ")
        )));
    }

    let provider = profile
        .provider()
        .map(|p| p.display_name().to_string())
        .unwrap_or_else(|| profile.provider_type.clone());

    Ok(ApiSettings {
        provider,
        api_key: profile.api_key.clone(),
        api_endpoint: normalize_endpoint(&profile.api_endpoint),
        model: profile.model_name.clone(),
        language: language.to_string(),
        temperature: profile.temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE),
    })
}
