//! Follow-up question derivation.
//!
//! A confident classification gets a single confirmation question. An
//! ambiguous one gets up to two: the open question suggested by the service
//! and a closed choice over the candidate descriptions.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use survey_assist_core::{ClassificationResult, Flavour, FollowUpQuestion};
use tracing::{debug, warn};

pub const NONE_OF_THE_ABOVE: &str = "None of the above";

const OPEN_ID: &str = "f1.1";
const CLOSED_ID: &str = "f1.2";
const CONFIRM_ID: &str = "f1.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpKind {
    Text,
    Select,
    Confirm,
}

impl FollowUpKind {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// Label stored in the result document. Confirmations are recorded as
    /// selects.
    pub fn record_label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Select | Self::Confirm => "select",
        }
    }
}

/// A generated question awaiting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpQuestionSpec {
    pub id: String,
    pub question_text: String,
    pub kind: FollowUpKind,
    #[serde(default)]
    pub select_options: Vec<String>,
}

impl FollowUpQuestionSpec {
    /// The document entry for this question, with no answer yet.
    pub fn to_record(&self) -> FollowUpQuestion {
        FollowUpQuestion {
            id: self.id.clone(),
            text: self.question_text.clone(),
            kind: self.kind.record_label().to_string(),
            select_options: self.select_options.clone(),
            response: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FollowUpDeriver {
    pub randomise_options: bool,
}

impl FollowUpDeriver {
    pub fn new(randomise_options: bool) -> Self {
        Self { randomise_options }
    }

    pub fn derive(
        &self,
        result: &ClassificationResult,
        flavour: Flavour,
    ) -> Vec<FollowUpQuestionSpec> {
        self.derive_with_rng(result, flavour, &mut rand::thread_rng())
    }

    pub fn derive_with_rng<R: Rng + ?Sized>(
        &self,
        result: &ClassificationResult,
        flavour: Flavour,
        rng: &mut R,
    ) -> Vec<FollowUpQuestionSpec> {
        if result.classified {
            let Some(spec) = confirm_spec(result, flavour) else {
                warn!(flavour = %flavour, "classified result names no code, nothing to confirm");
                return Vec::new();
            };
            return vec![spec];
        }

        let mut specs = Vec::with_capacity(2);
        if let Some(text) = result.followup_text() {
            specs.push(FollowUpQuestionSpec {
                id: OPEN_ID.into(),
                question_text: text.to_string(),
                kind: FollowUpKind::Text,
                select_options: Vec::new(),
            });
        }

        if !result.candidates.is_empty() {
            let mut options: Vec<String> = result
                .candidates
                .iter()
                .map(|c| c.descriptive.clone())
                .collect();
            if self.randomise_options {
                options.shuffle(rng);
            }
            options.push(NONE_OF_THE_ABOVE.to_string());
            specs.push(FollowUpQuestionSpec {
                id: CLOSED_ID.into(),
                question_text: closed_text(flavour).to_string(),
                kind: FollowUpKind::Select,
                select_options: options,
            });
        }

        debug!(
            flavour = %flavour,
            count = specs.len(),
            candidates = result.candidates.len(),
            "derived follow-up questions"
        );
        specs
    }
}

fn subject(flavour: Flavour) -> &'static str {
    match flavour {
        Flavour::Sic => "your organisation",
        Flavour::Soc => "your main job",
    }
}

fn closed_text(flavour: Flavour) -> &'static str {
    match flavour {
        Flavour::Sic => "Which of these best describes your organisation's activities?",
        Flavour::Soc => "Which of these best describes your main job?",
    }
}

fn confirm_spec(result: &ClassificationResult, flavour: Flavour) -> Option<FollowUpQuestionSpec> {
    let described = result
        .description
        .as_deref()
        .or(result.code.as_deref())
        .filter(|d| !d.trim().is_empty())?;
    Some(FollowUpQuestionSpec {
        id: CONFIRM_ID.into(),
        question_text: format!("Does '{described}' describe {}?", subject(flavour)),
        kind: FollowUpKind::Confirm,
        select_options: vec!["Yes".into(), "No".into()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use survey_assist_core::Candidate;

    fn candidate(code: &str, descriptive: &str) -> Candidate {
        Candidate {
            code: code.into(),
            descriptive: descriptive.into(),
            likelihood: 0.3,
        }
    }

    fn ambiguous() -> ClassificationResult {
        ClassificationResult {
            flavour: Flavour::Sic,
            classified: false,
            followup: Some("Does your farm sell to the public?".into()),
            code: None,
            description: None,
            candidates: vec![
                candidate("01110", "Growing of cereals"),
                candidate("01410", "Raising of dairy cattle"),
                candidate("46210", "Wholesale of grain"),
            ],
            reasoning: String::new(),
        }
    }

    #[test]
    fn classified_without_code_asks_nothing() {
        let result = ClassificationResult {
            classified: true,
            code: None,
            description: None,
            ..ambiguous()
        };
        assert!(FollowUpDeriver::default().derive(&result, Flavour::Sic).is_empty());

        let coded = ClassificationResult {
            code: Some("01410".into()),
            ..result
        };
        let specs = FollowUpDeriver::default().derive(&coded, Flavour::Sic);
        assert_eq!(specs[0].question_text, "Does '01410' describe your organisation?");
    }

    #[test]
    fn classified_yields_single_confirmation() {
        let result = ClassificationResult {
            classified: true,
            code: Some("01410".into()),
            description: Some("Raising of dairy cattle".into()),
            ..ambiguous()
        };
        let specs = FollowUpDeriver::default().derive(&result, Flavour::Sic);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].id, "f1.1");
        assert_eq!(specs[0].kind, FollowUpKind::Confirm);
        assert_eq!(
            specs[0].question_text,
            "Does 'Raising of dairy cattle' describe your organisation?"
        );
        assert_eq!(specs[0].select_options, vec!["Yes", "No"]);
        assert_eq!(specs[0].to_record().kind, "select");
    }

    #[test]
    fn soc_confirmation_mentions_main_job() {
        let result = ClassificationResult {
            flavour: Flavour::Soc,
            classified: true,
            description: Some("Farm workers".into()),
            ..ambiguous()
        };
        let specs = FollowUpDeriver::default().derive(&result, Flavour::Soc);
        assert_eq!(specs[0].question_text, "Does 'Farm workers' describe your main job?");
    }

    #[test]
    fn ambiguous_yields_open_then_closed() {
        let specs = FollowUpDeriver::default().derive(&ambiguous(), Flavour::Sic);
        assert_eq!(specs.len(), 2);

        assert_eq!(specs[0].id, "f1.1");
        assert!(specs[0].kind.is_open());
        assert_eq!(specs[0].question_text, "Does your farm sell to the public?");

        assert_eq!(specs[1].id, "f1.2");
        assert_eq!(
            specs[1].select_options,
            vec![
                "Growing of cereals",
                "Raising of dairy cattle",
                "Wholesale of grain",
                NONE_OF_THE_ABOVE
            ]
        );
    }

    #[test]
    fn blank_followup_skips_open_question() {
        let result = ClassificationResult {
            followup: Some(" ".into()),
            ..ambiguous()
        };
        let specs = FollowUpDeriver::default().derive(&result, Flavour::Sic);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].id, "f1.2");
    }

    #[test]
    fn no_candidates_and_no_followup_yields_nothing() {
        let result = ClassificationResult {
            followup: None,
            candidates: vec![],
            ..ambiguous()
        };
        assert!(FollowUpDeriver::default().derive(&result, Flavour::Sic).is_empty());
    }

    #[test]
    fn randomised_options_keep_none_of_the_above_last() {
        let deriver = FollowUpDeriver::new(true);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let specs = deriver.derive_with_rng(&ambiguous(), Flavour::Sic, &mut rng);
            let options = &specs[1].select_options;
            assert_eq!(options.len(), 4);
            assert_eq!(options.last().map(String::as_str), Some(NONE_OF_THE_ABOVE));

            let mut sorted = options[..3].to_vec();
            sorted.sort();
            assert_eq!(
                sorted,
                vec!["Growing of cereals", "Raising of dairy cattle", "Wholesale of grain"]
            );
        }
    }

    #[test]
    fn spec_serialises_kind_in_snake_case() {
        let specs = FollowUpDeriver::default().derive(&ambiguous(), Flavour::Sic);
        let json = serde_json::to_value(&specs[1]).unwrap();
        assert_eq!(json["kind"], "select");
    }
}
