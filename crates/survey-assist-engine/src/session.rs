//! Per-respondent session state.
//!
//! Everything a request needs lives in one [`SessionState`] value that is
//! loaded, mutated and saved back as a unit. Nothing here is shared between
//! respondents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use survey_assist_ai::FollowUpQuestionSpec;
use survey_assist_core::{PersonResponse, ResultDocument};

use crate::accumulator::ResultAccumulator;
use crate::queue::FollowUpQueue;

/// Latest raw answer per response field. Keys are normalised so that
/// `job-title` and `job_title` address the same field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseStore(BTreeMap<String, String>);

impl ResponseStore {
    pub fn normalise(name: &str) -> String {
        name.replace('-', "_")
    }

    pub fn insert(&mut self, response_name: &str, value: impl Into<String>) {
        self.0.insert(Self::normalise(response_name), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(&Self::normalise(field)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyIteration {
    pub time_start: DateTime<Utc>,
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assist_time_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assist_time_end: Option<DateTime<Utc>>,
}

/// What the respondent is currently being asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Question,
    Consent,
    FollowUp,
    Summary,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Household-level identifier; becomes the document's `case_id`.
    pub participant_id: String,
    pub person_id: String,
    pub current_question_index: usize,
    pub response_map: ResponseStore,
    pub follow_up_queue: FollowUpQueue,
    pub survey_iteration: SurveyIteration,
    pub result: ResultAccumulator,
    pub rerouted: bool,
    /// `None` until the consent question has been answered.
    pub consent_given: Option<bool>,
    pub stage: Stage,
    /// Index of the next configured interaction that has not yet run.
    pub interaction_cursor: usize,
    /// The follow-up question currently on screen.
    pub awaiting_follow_up: Option<FollowUpQuestionSpec>,
}

impl SessionState {
    pub fn new(
        participant_id: &str,
        person_id: &str,
        survey_title: &str,
        wave_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let document = ResultDocument {
            survey_id: ResultDocument::survey_id_from_title(survey_title),
            wave_id: wave_id.to_string(),
            case_id: participant_id.to_string(),
            user: person_id.to_string(),
            time_start: now,
            time_end: now,
            responses: vec![PersonResponse {
                person_id: person_id.to_string(),
                time_start: now,
                time_end: now,
                survey_assist_interactions: Vec::new(),
            }],
        };
        Self {
            participant_id: participant_id.to_string(),
            person_id: person_id.to_string(),
            current_question_index: 0,
            response_map: ResponseStore::default(),
            follow_up_queue: FollowUpQueue::default(),
            survey_iteration: SurveyIteration {
                time_start: now,
                time_end: None,
                assist_time_start: None,
                assist_time_end: None,
            },
            result: ResultAccumulator::new(document),
            rerouted: false,
            consent_given: None,
            stage: Stage::Question,
            interaction_cursor: 0,
            awaiting_follow_up: None,
        }
    }

    /// Back to the first question with a fresh result and an empty queue.
    pub fn reset(&mut self, survey_title: &str, wave_id: &str, now: DateTime<Utc>) {
        *self = Self::new(
            &self.participant_id,
            &self.person_id,
            survey_title,
            wave_id,
            now,
        );
    }
}
