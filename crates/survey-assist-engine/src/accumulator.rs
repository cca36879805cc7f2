//! Builds the result document as the survey progresses.
//!
//! Besides the nested document, the accumulator keeps the log of asked
//! questions (shown on the summary page) and a flat index from follow-up
//! question id to the interaction that owns it, so answers are written back
//! without scanning the whole document.
//!
//! Every `time_end` update is a max-merge that propagates upward:
//! interaction → person response → survey.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use survey_assist_ai::FollowUpQuestionSpec;
use survey_assist_core::{
    Flavour, Interaction, InteractionKind, RenderedQuestion, ResponseType, ResultDocument,
};
use tracing::debug;

use crate::error::EngineError;

/// One asked question and the answer given, in asking order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_id: String,
    pub question_name: String,
    pub question_text: String,
    pub response_type: ResponseType,
    #[serde(default)]
    pub response_options: Vec<String>,
    pub response_name: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub used_for_classifications: Vec<Flavour>,
    /// Generated by a classification rather than taken from the catalog.
    #[serde(default)]
    pub assisted: bool,
}

impl QuestionRecord {
    pub fn from_rendered(
        question: &RenderedQuestion,
        used_for_classifications: Vec<Flavour>,
        response: Option<String>,
    ) -> Self {
        Self {
            question_id: question.question_id.clone(),
            question_name: question.question_name.clone(),
            question_text: question.question_text.clone(),
            response_type: question.response_type,
            response_options: question
                .response_options
                .iter()
                .map(|o| o.value.clone())
                .collect(),
            response_name: question.response_name.clone(),
            response,
            used_for_classifications,
            assisted: question.assisted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FollowUpSlot {
    person_id: String,
    response: usize,
    interaction: usize,
    question_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultAccumulator {
    document: ResultDocument,
    #[serde(default)]
    questions: Vec<QuestionRecord>,
    #[serde(default)]
    follow_up_index: Vec<FollowUpSlot>,
}

impl ResultAccumulator {
    pub fn new(document: ResultDocument) -> Self {
        Self {
            document,
            questions: Vec::new(),
            follow_up_index: Vec::new(),
        }
    }

    pub fn document(&self) -> &ResultDocument {
        &self.document
    }

    pub fn questions(&self) -> &[QuestionRecord] {
        &self.questions
    }

    // ── Question log ──

    pub fn record_question(&mut self, record: QuestionRecord) {
        self.questions.push(record);
    }

    /// Most recent logged question with this id and origin.
    pub fn find_question(&self, question_id: &str, assisted: bool) -> Option<&QuestionRecord> {
        self.questions
            .iter()
            .rev()
            .find(|q| q.question_id == question_id && q.assisted == assisted)
    }

    /// Overwrite the answer of the most recent matching question. Returns
    /// false when no such question was logged.
    pub fn update_question_answer(&mut self, question_id: &str, assisted: bool, value: &str) -> bool {
        match self
            .questions
            .iter_mut()
            .rev()
            .find(|q| q.question_id == question_id && q.assisted == assisted)
        {
            Some(record) => {
                record.response = Some(value.to_string());
                true
            }
            None => false,
        }
    }

    // ── Interactions ──

    fn person_index(&self, person_id: &str) -> Result<usize, EngineError> {
        self.document
            .responses
            .iter()
            .position(|r| r.person_id == person_id)
            .ok_or_else(|| {
                EngineError::SessionInvariant(format!("no response entry for person {person_id}"))
            })
    }

    pub fn append_interaction(
        &mut self,
        person_id: &str,
        interaction: Interaction,
    ) -> Result<(), EngineError> {
        let idx = self.person_index(person_id)?;
        let end = interaction.time_end;
        debug!(
            person_id,
            kind = ?interaction.kind,
            flavour = %interaction.flavour,
            "interaction appended"
        );
        self.document.responses[idx]
            .survey_assist_interactions
            .push(interaction);
        self.merge_up(idx, end);
        Ok(())
    }

    fn latest_classify(&self, response: usize, flavour: Flavour) -> Option<usize> {
        self.document.responses[response]
            .survey_assist_interactions
            .iter()
            .rposition(|i| i.kind == InteractionKind::Classify && i.flavour == flavour)
    }

    /// Attach follow-up questions to the most recent classify interaction of
    /// `flavour` for this person.
    pub fn attach_follow_up_specs(
        &mut self,
        person_id: &str,
        flavour: Flavour,
        specs: &[FollowUpQuestionSpec],
    ) -> Result<(), EngineError> {
        let response = self.person_index(person_id)?;
        let interaction = self.latest_classify(response, flavour).ok_or_else(|| {
            EngineError::SessionInvariant(format!(
                "no {flavour} classify interaction for person {person_id}"
            ))
        })?;

        let target = &mut self.document.responses[response].survey_assist_interactions[interaction];
        let follow_up = target.follow_up_mut().ok_or_else(|| {
            EngineError::SessionInvariant("classify interaction has no classification payload".into())
        })?;
        follow_up
            .questions
            .extend(specs.iter().map(FollowUpQuestionSpec::to_record));

        self.follow_up_index
            .extend(specs.iter().map(|spec| FollowUpSlot {
                person_id: person_id.to_string(),
                response,
                interaction,
                question_id: spec.id.clone(),
            }));
        Ok(())
    }

    /// Store the answer to a follow-up question. When the same id was
    /// attached more than once, the most recent attachment is updated.
    pub fn record_follow_up_answer(
        &mut self,
        person_id: &str,
        question_id: &str,
        value: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let (response, interaction) = self
            .follow_up_index
            .iter()
            .rev()
            .find(|slot| slot.person_id == person_id && slot.question_id == question_id)
            .map(|slot| (slot.response, slot.interaction))
            .ok_or_else(|| {
                EngineError::SessionInvariant(format!(
                    "no follow-up question {question_id} for person {person_id}"
                ))
            })?;

        let target = &mut self.document.responses[response].survey_assist_interactions[interaction];
        let question = target
            .follow_up_mut()
            .and_then(|f| f.questions.iter_mut().rev().find(|q| q.id == question_id))
            .ok_or_else(|| {
                EngineError::SessionInvariant(format!(
                    "indexed follow-up question {question_id} missing from its interaction"
                ))
            })?;
        question.response = value.to_string();
        target.time_end = target.time_end.max(at);
        self.merge_up(response, at);
        Ok(())
    }

    /// Refresh `time_end` of the latest classify interaction of `flavour`.
    pub fn touch_latest_classify(
        &mut self,
        person_id: &str,
        flavour: Flavour,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let response = self.person_index(person_id)?;
        let interaction = self.latest_classify(response, flavour).ok_or_else(|| {
            EngineError::SessionInvariant(format!(
                "no {flavour} classify interaction for person {person_id}"
            ))
        })?;
        let target = &mut self.document.responses[response].survey_assist_interactions[interaction];
        target.time_end = target.time_end.max(at);
        self.merge_up(response, at);
        Ok(())
    }

    /// Survey-level end time; never moves backwards.
    pub fn merge_time_end(&mut self, at: DateTime<Utc>) {
        self.document.time_end = self.document.time_end.max(at);
    }

    fn merge_up(&mut self, response: usize, at: DateTime<Utc>) {
        let person = &mut self.document.responses[response];
        person.time_end = person.time_end.max(at);
        self.merge_time_end(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use survey_assist_ai::FollowUpKind;
    use survey_assist_core::{
        ClassificationResult, InputField, InteractionResponse, LookupResponse, PersonResponse,
    };

    fn t(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 5, 8, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn accumulator() -> ResultAccumulator {
        ResultAccumulator::new(ResultDocument {
            survey_id: "s".into(),
            wave_id: "w".into(),
            case_id: "case".into(),
            user: "p1".into(),
            time_start: t(0),
            time_end: t(0),
            responses: vec![PersonResponse {
                person_id: "p1".into(),
                time_start: t(0),
                time_end: t(0),
                survey_assist_interactions: vec![],
            }],
        })
    }

    fn result(flavour: Flavour) -> ClassificationResult {
        ClassificationResult {
            flavour,
            classified: false,
            followup: Some("Tell us more".into()),
            code: None,
            description: None,
            candidates: vec![],
            reasoning: String::new(),
        }
    }

    fn spec(id: &str) -> FollowUpQuestionSpec {
        FollowUpQuestionSpec {
            id: id.into(),
            question_text: format!("q {id}"),
            kind: FollowUpKind::Text,
            select_options: vec![],
        }
    }

    fn classify(acc: &mut ResultAccumulator, flavour: Flavour, at: DateTime<Utc>) {
        let interaction = Interaction::classify(
            flavour,
            &result(flavour),
            vec![InputField::new("job_title", "x")],
            at,
        );
        acc.append_interaction("p1", interaction).unwrap();
    }

    fn follow_up_responses(acc: &ResultAccumulator, interaction: usize) -> Vec<String> {
        acc.document().responses[0].survey_assist_interactions[interaction]
            .follow_up()
            .unwrap()
            .questions
            .iter()
            .map(|q| q.response.clone())
            .collect()
    }

    #[test]
    fn append_for_unknown_person_is_invariant_error() {
        let mut acc = accumulator();
        let interaction = Interaction::classify(Flavour::Sic, &result(Flavour::Sic), vec![], t(1));
        let err = acc.append_interaction("nobody", interaction).unwrap_err();
        assert!(matches!(err, EngineError::SessionInvariant(_)));
    }

    #[test]
    fn attach_without_classify_is_invariant_error() {
        let mut acc = accumulator();
        let err = acc
            .attach_follow_up_specs("p1", Flavour::Sic, &[spec("f1.1")])
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionInvariant(_)));
    }

    #[test]
    fn attach_targets_latest_classify_of_flavour() {
        let mut acc = accumulator();
        classify(&mut acc, Flavour::Sic, t(1));
        classify(&mut acc, Flavour::Soc, t(2));
        acc.attach_follow_up_specs("p1", Flavour::Sic, &[spec("f1.1")]).unwrap();

        let interactions = &acc.document().responses[0].survey_assist_interactions;
        assert_eq!(interactions[0].follow_up().unwrap().questions.len(), 1);
        assert!(interactions[1].follow_up().is_none());
    }

    #[test]
    fn answer_is_idempotent_by_id() {
        let mut acc = accumulator();
        classify(&mut acc, Flavour::Sic, t(1));
        acc.attach_follow_up_specs("p1", Flavour::Sic, &[spec("f1.1"), spec("f1.2")])
            .unwrap();

        acc.record_follow_up_answer("p1", "f1.1", "first", t(2)).unwrap();
        acc.record_follow_up_answer("p1", "f1.1", "second", t(3)).unwrap();

        assert_eq!(follow_up_responses(&acc, 0), vec!["second", ""]);
    }

    #[test]
    fn answer_for_unknown_id_is_invariant_error() {
        let mut acc = accumulator();
        classify(&mut acc, Flavour::Sic, t(1));
        let err = acc.record_follow_up_answer("p1", "f9", "x", t(2)).unwrap_err();
        assert!(matches!(err, EngineError::SessionInvariant(_)));
    }

    #[test]
    fn repeated_ids_update_most_recent_interaction() {
        let mut acc = accumulator();
        classify(&mut acc, Flavour::Sic, t(1));
        acc.attach_follow_up_specs("p1", Flavour::Sic, &[spec("f1.1")]).unwrap();
        acc.record_follow_up_answer("p1", "f1.1", "old", t(2)).unwrap();

        classify(&mut acc, Flavour::Sic, t(3));
        acc.attach_follow_up_specs("p1", Flavour::Sic, &[spec("f1.1")]).unwrap();
        acc.record_follow_up_answer("p1", "f1.1", "new", t(4)).unwrap();

        assert_eq!(follow_up_responses(&acc, 0), vec!["old"]);
        assert_eq!(follow_up_responses(&acc, 1), vec!["new"]);
    }

    #[test]
    fn time_end_is_max_of_applied_times_in_any_order() {
        let mut acc = accumulator();
        classify(&mut acc, Flavour::Sic, t(1));
        acc.attach_follow_up_specs("p1", Flavour::Sic, &[spec("f1.1")]).unwrap();

        for minute in [7, 3, 9, 2] {
            acc.record_follow_up_answer("p1", "f1.1", "x", t(minute)).unwrap();
        }
        acc.merge_time_end(t(5));

        let doc = acc.document();
        assert_eq!(doc.time_end, t(9));
        assert_eq!(doc.responses[0].time_end, t(9));
        assert_eq!(doc.responses[0].survey_assist_interactions[0].time_end, t(9));
    }

    #[test]
    fn lookup_interactions_are_not_follow_up_targets() {
        let mut acc = accumulator();
        let lookup = Interaction::lookup(
            Flavour::Sic,
            LookupResponse {
                found: true,
                code: Some("56302".into()),
                code_division: None,
                potential_codes_count: 0,
                potential_divisions: vec![],
                potential_codes: vec![],
            },
            vec![],
            t(1),
            t(2),
        );
        acc.append_interaction("p1", lookup).unwrap();
        assert!(matches!(
            acc.document().responses[0].survey_assist_interactions[0].response,
            InteractionResponse::Lookup(_)
        ));
        assert!(acc.touch_latest_classify("p1", Flavour::Sic, t(3)).is_err());
        assert_eq!(acc.document().time_end, t(2));
    }

    #[test]
    fn question_log_updates_latest_match() {
        let mut acc = accumulator();
        let mut record = QuestionRecord {
            question_id: "q1".into(),
            question_name: "job_title".into(),
            question_text: "What is your job title?".into(),
            response_type: ResponseType::Text,
            response_options: vec![],
            response_name: "job-title".into(),
            response: Some("Farmer".into()),
            used_for_classifications: vec![Flavour::Sic],
            assisted: false,
        };
        acc.record_question(record.clone());
        record.assisted = true;
        acc.record_question(record);

        assert!(acc.update_question_answer("q1", false, "Shepherd"));
        assert!(!acc.update_question_answer("q2", false, "x"));
        assert_eq!(
            acc.find_question("q1", false).unwrap().response.as_deref(),
            Some("Shepherd")
        );
        assert_eq!(
            acc.find_question("q1", true).unwrap().response.as_deref(),
            Some("Farmer")
        );
    }
}
