//! Survey configuration, loaded from TOML.
//!
//! Everything has a default so a minimal file only needs the interaction
//! table. `BACKEND_API_URL` and `SURVEY_ASSIST_API_TOKEN` override the
//! `[api]` section after parsing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::Flavour;
use crate::error::ConfigError;

pub const ENV_API_URL: &str = "BACKEND_API_URL";
pub const ENV_API_TOKEN: &str = "SURVEY_ASSIST_API_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub survey: SurveySection,
    #[serde(default)]
    pub survey_assist: AssistConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl SurveyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        info!(
            path = %path.display(),
            interactions = config.survey_assist.interactions.len(),
            base_url = %config.api.base_url,
            "loaded survey config"
        );
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides for the API endpoint and token.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_API_TOKEN).ok(),
        );
    }

    fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            debug!(base_url = %url, "API base URL overridden from environment");
            self.api.base_url = url;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api.token = Some(token);
        }
    }

    /// The interaction triggered after answering `question_id`, if any.
    pub fn interaction_after(&self, question_id: &str) -> Option<(usize, &InteractionConfig)> {
        self.survey_assist
            .interactions
            .iter()
            .enumerate()
            .find(|(_, i)| i.after_question_id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveySection {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_wave_id")]
    pub wave_id: String,
    #[serde(default = "default_true")]
    pub summary_enabled: bool,
}

impl Default for SurveySection {
    fn default() -> Self {
        Self {
            title: default_title(),
            wave_id: default_wave_id(),
            summary_enabled: true,
        }
    }
}

fn default_title() -> String {
    "Survey Assist Prototype".into()
}

fn default_wave_id() -> String {
    "wave_001".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Appended to follow-up question text on the summary page.
    #[serde(default = "default_assist_label")]
    pub question_assist_label: String,
    /// `open`, `closed` or `both`. Anything else is a configuration error at
    /// the point a follow-up is popped.
    #[serde(default = "default_follow_up_mode")]
    pub follow_up_mode: String,
    #[serde(default)]
    pub randomise_options: bool,
    #[serde(default)]
    pub consent: ConsentConfig,
    #[serde(default)]
    pub interactions: Vec<InteractionConfig>,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            question_assist_label: default_assist_label(),
            follow_up_mode: default_follow_up_mode(),
            randomise_options: false,
            consent: ConsentConfig::default(),
            interactions: Vec::new(),
        }
    }
}

fn default_assist_label() -> String {
    "<br><strong>(Asked by Survey Assist)</strong>".into()
}

fn default_follow_up_mode() -> String {
    "both".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentConfig {
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default = "default_consent_id")]
    pub question_id: String,
    #[serde(default = "default_consent_name")]
    pub question_name: String,
    #[serde(default = "default_consent_title")]
    pub title: String,
    #[serde(default = "default_consent_text")]
    pub question_text: String,
    #[serde(default = "default_consent_response_name")]
    pub response_name: String,
    #[serde(default = "default_justification")]
    pub justification_text: String,
    #[serde(default = "default_reason")]
    pub placeholder_reason: String,
    #[serde(default = "default_max_followup")]
    pub max_followup: u32,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            required: true,
            question_id: default_consent_id(),
            question_name: default_consent_name(),
            title: default_consent_title(),
            question_text: default_consent_text(),
            response_name: default_consent_response_name(),
            justification_text: default_justification(),
            placeholder_reason: default_reason(),
            max_followup: default_max_followup(),
        }
    }
}

fn default_consent_id() -> String {
    "c1".into()
}

fn default_consent_name() -> String {
    "survey_assist_consent".into()
}

fn default_consent_title() -> String {
    "Survey Assist Consent".into()
}

fn default_consent_text() -> String {
    "Can Survey Assist ask PLACEHOLDER_FOLLOWUP to better understand PLACEHOLDER_REASON?".into()
}

fn default_consent_response_name() -> String {
    "survey-assist-consent".into()
}

fn default_justification() -> String {
    "Survey Assist uses AI to suggest questions that help classify your answers.".into()
}

fn default_reason() -> String {
    "your organisation's main activity".into()
}

fn default_max_followup() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_allowed_routes")]
    pub allowed_routes: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            allowed_routes: default_allowed_routes(),
        }
    }
}

fn default_allowed_routes() -> Vec<String> {
    vec!["summary".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm")]
    pub llm: String,
    #[serde(default)]
    pub max_codes: Option<usize>,
    #[serde(default)]
    pub max_divisions: Option<usize>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            llm: default_llm(),
            max_codes: None,
            max_divisions: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".into()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_llm() -> String {
    "gemini".into()
}

/// One assist interaction, triggered after a catalog question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    pub after_question_id: String,
    /// `lookup_classification` tries a lookup before classifying;
    /// `classification` classifies directly.
    #[serde(rename = "type", default = "default_interaction_type")]
    pub kind: String,
    #[serde(default = "default_param")]
    pub param: Flavour,
    #[serde(default)]
    pub inputs: InteractionInputs,
}

impl InteractionConfig {
    pub fn uses_lookup(&self) -> bool {
        self.kind == "lookup_classification"
    }

    pub fn is_known_kind(&self) -> bool {
        matches!(self.kind.as_str(), "lookup_classification" | "classification")
    }
}

fn default_interaction_type() -> String {
    "lookup_classification".into()
}

fn default_param() -> Flavour {
    Flavour::Sic
}

/// Response-map keys the classification inputs are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionInputs {
    #[serde(default = "default_job_title")]
    pub job_title: String,
    #[serde(default = "default_job_description")]
    pub job_description: String,
    #[serde(default = "default_org_description")]
    pub org_description: String,
}

impl Default for InteractionInputs {
    fn default() -> Self {
        Self {
            job_title: default_job_title(),
            job_description: default_job_description(),
            org_description: default_org_description(),
        }
    }
}

fn default_job_title() -> String {
    "job_title".into()
}

fn default_job_description() -> String {
    "job_description".into()
}

fn default_org_description() -> String {
    "organisation_activity".into()
}
