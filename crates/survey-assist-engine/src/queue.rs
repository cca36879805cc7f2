//! Pending follow-up questions for the current session.

use serde::{Deserialize, Serialize};
use survey_assist_ai::{FollowUpKind, FollowUpQuestionSpec};
use survey_assist_core::{DEFAULT_BUTTON_TEXT, RenderedOption, RenderedQuestion, ResponseType};
use tracing::error;

/// Question name prefix for generated follow-ups; the follow-up id follows it.
pub const FOLLOW_UP_NAME_PREFIX: &str = "survey_assist_followup_";
pub const FOLLOW_UP_RESPONSE_NAME: &str = "resp-survey-assist-followup";

/// Which end of the queue the next question is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpMode {
    Open,
    Closed,
    Both,
}

impl FollowUpMode {
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpQueue(Vec<FollowUpQuestionSpec>);

impl FollowUpQueue {
    /// Queue more questions behind whatever is already waiting.
    pub fn extend(&mut self, specs: impl IntoIterator<Item = FollowUpQuestionSpec>) {
        self.0.extend(specs);
    }

    /// Take the next question. An unrecognised `mode` is logged and yields
    /// nothing.
    pub fn next(&mut self, mode: &str) -> Option<FollowUpQuestionSpec> {
        let Some(mode) = FollowUpMode::parse(mode) else {
            error!(mode, "invalid follow-up mode, no follow-up question taken");
            return None;
        };
        if self.0.is_empty() {
            return None;
        }
        match mode {
            FollowUpMode::Open | FollowUpMode::Both => Some(self.0.remove(0)),
            FollowUpMode::Closed => self.0.pop(),
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FollowUpQuestionSpec> {
        self.0.iter()
    }
}

pub fn follow_up_question_name(id: &str) -> String {
    format!("{FOLLOW_UP_NAME_PREFIX}{id}")
}

/// Present a follow-up in the same shape as a catalog question. Closed
/// questions become a radio group whose first option carries `required`.
pub fn render_follow_up(spec: &FollowUpQuestionSpec) -> RenderedQuestion {
    let (response_type, response_options) = match spec.kind {
        FollowUpKind::Text => (ResponseType::Textarea, Vec::new()),
        FollowUpKind::Select | FollowUpKind::Confirm => {
            let options = spec
                .select_options
                .iter()
                .enumerate()
                .map(|(i, option)| RenderedOption {
                    id: format!("{}-id", option.to_lowercase().replace(' ', "-")),
                    label: option.clone(),
                    value: option.to_lowercase(),
                    required: i == 0,
                })
                .collect();
            (ResponseType::Radio, options)
        }
    };

    RenderedQuestion {
        question_id: spec.id.clone(),
        question_name: follow_up_question_name(&spec.id),
        title: "Survey Assist".into(),
        question_text: spec.question_text.clone(),
        question_description: String::new(),
        response_type,
        response_name: FOLLOW_UP_RESPONSE_NAME.into(),
        response_options,
        char_limit: match spec.kind {
            FollowUpKind::Text => Some(survey_assist_core::sanitise::DEFAULT_MAX_LEN),
            _ => None,
        },
        button_text: DEFAULT_BUTTON_TEXT.into(),
        assisted: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, kind: FollowUpKind, options: &[&str]) -> FollowUpQuestionSpec {
        FollowUpQuestionSpec {
            id: id.into(),
            question_text: format!("question {id}"),
            kind,
            select_options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn queue() -> FollowUpQueue {
        let mut q = FollowUpQueue::default();
        q.extend([
            spec("f1.1", FollowUpKind::Text, &[]),
            spec("f1.2", FollowUpKind::Select, &["A", "None of the above"]),
        ]);
        q
    }

    #[test]
    fn open_and_both_take_from_front() {
        let mut q = queue();
        assert_eq!(q.next("open").unwrap().id, "f1.1");
        let mut q = queue();
        assert_eq!(q.next("both").unwrap().id, "f1.1");
        assert_eq!(q.next("both").unwrap().id, "f1.2");
        assert!(q.next("both").is_none());
    }

    #[test]
    fn closed_takes_from_back() {
        let mut q = queue();
        assert_eq!(q.next("closed").unwrap().id, "f1.2");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn unknown_mode_returns_nothing_and_keeps_queue() {
        let mut q = queue();
        assert!(q.next("sideways").is_none());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn extend_appends() {
        let mut q = queue();
        q.extend([spec("f1.1", FollowUpKind::Confirm, &["Yes", "No"])]);
        let ids: Vec<_> = q.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["f1.1", "f1.2", "f1.1"]);
    }

    #[test]
    fn select_renders_as_required_radio() {
        let rendered = render_follow_up(&spec(
            "f1.2",
            FollowUpKind::Select,
            &["Wholesale of grain", "None of the above"],
        ));
        assert_eq!(rendered.response_type, ResponseType::Radio);
        assert_eq!(rendered.question_name, "survey_assist_followup_f1.2");
        assert!(rendered.assisted);

        let first = &rendered.response_options[0];
        assert!(first.required);
        assert_eq!(first.id, "wholesale-of-grain-id");
        assert_eq!(first.value, "wholesale of grain");
        assert_eq!(first.label, "Wholesale of grain");
        assert!(!rendered.response_options[1].required);
    }

    #[test]
    fn text_renders_without_options() {
        let rendered = render_follow_up(&spec("f1.1", FollowUpKind::Text, &[]));
        assert_eq!(rendered.response_type, ResponseType::Textarea);
        assert!(rendered.response_options.is_empty());
    }
}
