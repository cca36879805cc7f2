//! Consent gate shown before the first assist interaction.

use survey_assist_core::{
    ConsentConfig, DEFAULT_BUTTON_TEXT, RenderedOption, RenderedQuestion, ResponseType,
};

use crate::error::EngineError;

const PLACEHOLDER_FOLLOWUP: &str = "PLACEHOLDER_FOLLOWUP";
const PLACEHOLDER_REASON: &str = "PLACEHOLDER_REASON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    Yes,
    No,
}

pub struct ConsentGate<'a> {
    config: &'a ConsentConfig,
}

impl<'a> ConsentGate<'a> {
    pub fn new(config: &'a ConsentConfig) -> Self {
        Self { config }
    }

    pub fn required(&self) -> bool {
        self.config.required
    }

    /// Question text with both placeholders filled in.
    pub fn question_text(&self) -> String {
        let mut text = self.config.question_text.clone();
        if text.contains(PLACEHOLDER_FOLLOWUP) {
            text = text.replace(
                PLACEHOLDER_FOLLOWUP,
                &followup_phrase(self.config.max_followup),
            );
        }
        if text.contains(PLACEHOLDER_REASON) {
            text = text.replace(PLACEHOLDER_REASON, &self.config.placeholder_reason);
        }
        text
    }

    pub fn render(&self) -> RenderedQuestion {
        let option = |label: &str, value: &str, required: bool| RenderedOption {
            id: format!("consent-{value}"),
            label: label.to_string(),
            value: value.to_string(),
            required,
        };
        RenderedQuestion {
            question_id: self.config.question_id.clone(),
            question_name: self.config.question_name.clone(),
            title: self.config.title.clone(),
            question_text: self.question_text(),
            question_description: self.config.justification_text.clone(),
            response_type: ResponseType::Radio,
            response_name: self.config.response_name.clone(),
            response_options: vec![option("Yes", "yes", true), option("No", "no", false)],
            char_limit: None,
            button_text: DEFAULT_BUTTON_TEXT.into(),
            assisted: false,
        }
    }

    pub fn resolve(&self, answer: &str) -> Result<ConsentDecision, EngineError> {
        match answer.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(ConsentDecision::Yes),
            "no" => Ok(ConsentDecision::No),
            other => Err(EngineError::InputValidation(format!(
                "consent answer must be yes or no, got '{other}'"
            ))),
        }
    }
}

fn followup_phrase(max_followup: u32) -> String {
    const WORDS: [&str; 6] = ["one", "two", "three", "four", "five", "six"];
    if max_followup == 1 {
        return "one additional question".into();
    }
    let word = max_followup
        .checked_sub(1)
        .and_then(|i| WORDS.get(i as usize))
        .copied()
        .unwrap_or("unknown");
    format!("a maximum of {word} additional questions")
}
