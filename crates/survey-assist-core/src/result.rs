//! The nested result document submitted at the end of a survey.
//!
//! survey → responses (one per person) → interactions → classification or
//! lookup payload → follow-up questions. Timestamps serialise as UTC
//! ISO 8601.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Candidate, ClassificationResult, Flavour, LookupResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub field: String,
    pub value: String,
}

impl InputField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A follow-up question attached to a classify interaction, with the
/// respondent's answer once given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub id: String,
    pub text: String,
    /// `text` or `select`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub select_options: Vec<String>,
    #[serde(default)]
    pub response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub questions: Vec<FollowUpQuestion>,
}

/// A classification result as stored in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    #[serde(rename = "type")]
    pub flavour: Flavour,
    pub classified: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
}

impl From<&ClassificationResult> for ClassificationRecord {
    fn from(result: &ClassificationResult) -> Self {
        Self {
            flavour: result.flavour,
            classified: result.classified,
            code: result.code.clone(),
            description: result.description.clone(),
            candidates: result.candidates.clone(),
            reasoning: result.reasoning.clone(),
            follow_up: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Classify,
    Lookup,
}

/// Payload of an interaction: a list of classification results for
/// `classify`, a single lookup result for `lookup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractionResponse {
    Classification(Vec<ClassificationRecord>),
    Lookup(LookupResponse),
}

/// One engagement with the classification or lookup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    pub flavour: Flavour,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub input: Vec<InputField>,
    pub response: InteractionResponse,
}

impl Interaction {
    pub fn classify(
        flavour: Flavour,
        result: &ClassificationResult,
        input: Vec<InputField>,
        time_start: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: InteractionKind::Classify,
            flavour,
            time_start,
            time_end: time_start,
            input,
            response: InteractionResponse::Classification(vec![result.into()]),
        }
    }

    pub fn lookup(
        flavour: Flavour,
        response: LookupResponse,
        input: Vec<InputField>,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: InteractionKind::Lookup,
            flavour,
            time_start,
            time_end,
            input,
            response: InteractionResponse::Lookup(response),
        }
    }

    /// The follow-up block of a classify interaction, created on demand.
    pub fn follow_up_mut(&mut self) -> Option<&mut FollowUp> {
        match &mut self.response {
            InteractionResponse::Classification(records) => records
                .first_mut()
                .map(|record| record.follow_up.get_or_insert_with(FollowUp::default)),
            InteractionResponse::Lookup(_) => None,
        }
    }

    pub fn follow_up(&self) -> Option<&FollowUp> {
        match &self.response {
            InteractionResponse::Classification(records) => {
                records.first().and_then(|r| r.follow_up.as_ref())
            }
            InteractionResponse::Lookup(_) => None,
        }
    }
}

/// All interactions for one person in the household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonResponse {
    pub person_id: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub survey_assist_interactions: Vec<Interaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub survey_id: String,
    pub wave_id: String,
    /// Household that received the survey.
    pub case_id: String,
    /// Main user that started the survey.
    pub user: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub responses: Vec<PersonResponse>,
}

impl ResultDocument {
    /// Survey ids are the lower-cased title with whitespace runs replaced by `_`.
    pub fn survey_id_from_title(title: &str) -> String {
        title
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Body returned by the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultReceipt {
    pub message: String,
    #[serde(default)]
    pub result_id: Option<String>,
}
