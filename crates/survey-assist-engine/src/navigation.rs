//! Survey navigation state machine.
//!
//! Every request carries one `(question_name, value)` pair. The controller
//! resolves the name to an [`Action`], records the answer, then decides what
//! comes next: an early-exit route, the consent question, a generated
//! follow-up, or the next catalog question. All per-respondent state lives in
//! the [`SessionState`] passed in; the controller itself only holds
//! process-wide, read-only collaborators.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use survey_assist_ai::{FollowUpDeriver, map_lookup};
use survey_assist_core::sanitise::{
    DEFAULT_MAX_LEN, detect_injection, replace_if_no_letters, sanitise,
};
use survey_assist_core::{
    ClassificationGateway, ClassifyRequest, GatewayError, InputField, Interaction,
    InteractionConfig, PLACEHOLDER_TEXT, QuestionCatalog, QuestionDefinition, RenderedQuestion,
    ResponseType, ResultDocument, ResultSubmitter, SurveyConfig,
};
use tracing::{debug, error, info, warn};

use crate::accumulator::QuestionRecord;
use crate::clock::{Clock, SystemClock};
use crate::consent::{ConsentDecision, ConsentGate};
use crate::error::EngineError;
use crate::queue::{FOLLOW_UP_NAME_PREFIX, render_follow_up};
use crate::session::{ResponseStore, SessionState, Stage};

/// What a submitted `question_name` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Catalog question at this position.
    Catalog(usize),
    Consent,
    /// Generated follow-up with this spec id.
    FollowUp(String),
}

/// Pages outside the question flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Summary,
    ThankYou,
}

impl Route {
    pub fn parse(route: &str) -> Option<Self> {
        match route {
            "summary" => Some(Self::Summary),
            "thank_you" => Some(Self::ThankYou),
            _ => None,
        }
    }
}

/// Outcome of a navigation step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Render(RenderedQuestion),
    Redirect(Route),
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryView {
    pub questions: Vec<QuestionRecord>,
    /// False when the summary page is switched off and the caller should
    /// go straight to completion.
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub rerouted: bool,
    pub result_id: Option<String>,
    pub document: ResultDocument,
}

pub struct NavigationController {
    catalog: Arc<QuestionCatalog>,
    config: Arc<SurveyConfig>,
    gateway: Arc<dyn ClassificationGateway>,
    submitter: Arc<dyn ResultSubmitter>,
    clock: Arc<dyn Clock>,
    deriver: FollowUpDeriver,
    timeout: Duration,
}

impl NavigationController {
    pub fn new(
        catalog: Arc<QuestionCatalog>,
        config: Arc<SurveyConfig>,
        gateway: Arc<dyn ClassificationGateway>,
        submitter: Arc<dyn ResultSubmitter>,
    ) -> Self {
        let deriver = FollowUpDeriver::new(config.survey_assist.randomise_options);
        let timeout = Duration::from_secs(config.api.timeout_secs);
        Self {
            catalog,
            config,
            gateway,
            submitter,
            clock: Arc::new(SystemClock),
            deriver,
            timeout,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound on each gateway call, on top of any transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &QuestionCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Session lifecycle ──

    pub fn start_session(&self, participant_id: &str, person_id: &str) -> SessionState {
        info!(participant_id, person_id, "survey session started");
        SessionState::new(
            participant_id,
            person_id,
            &self.config.survey.title,
            &self.config.survey.wave_id,
            self.now(),
        )
    }

    /// Return to the first question with a fresh result.
    pub fn reset(&self, state: &mut SessionState) -> Result<Step, EngineError> {
        info!(person_id = %state.person_id, "survey session reset");
        state.reset(
            &self.config.survey.title,
            &self.config.survey.wave_id,
            self.now(),
        );
        self.current(state)
    }

    pub fn resolve_action(&self, question_name: &str) -> Result<Action, EngineError> {
        if let Some(index) = self.catalog.position_by_name(question_name) {
            return Ok(Action::Catalog(index));
        }
        if question_name == self.config.survey_assist.consent.question_name {
            return Ok(Action::Consent);
        }
        if let Some(id) = question_name.strip_prefix(FOLLOW_UP_NAME_PREFIX)
            && !id.is_empty()
        {
            return Ok(Action::FollowUp(id.to_string()));
        }
        Err(EngineError::InputValidation(format!(
            "unknown question name '{question_name}'"
        )))
    }

    /// What the respondent should be looking at right now.
    pub fn current(&self, state: &SessionState) -> Result<Step, EngineError> {
        match state.stage {
            Stage::Question => {
                let def = self.catalog.get(state.current_question_index).ok_or(
                    EngineError::IndexOutOfBounds {
                        index: state.current_question_index,
                        len: self.catalog.len(),
                    },
                )?;
                Ok(Step::Render(
                    def.render(question_text(def, &state.response_map)?),
                ))
            }
            Stage::Consent => Ok(Step::Render(
                ConsentGate::new(&self.config.survey_assist.consent).render(),
            )),
            Stage::FollowUp => state
                .awaiting_follow_up
                .as_ref()
                .map(|spec| Step::Render(render_follow_up(spec)))
                .ok_or_else(|| {
                    EngineError::SessionInvariant("follow-up stage with no pending question".into())
                }),
            Stage::Summary => Ok(Step::Redirect(Route::Summary)),
            Stage::Complete => Ok(Step::Redirect(Route::ThankYou)),
        }
    }

    pub async fn save_response(
        &self,
        state: &mut SessionState,
        question_name: &str,
        value: &str,
    ) -> Result<Step, EngineError> {
        let action = self.resolve_action(question_name)?;
        self.advance(state, action, value).await
    }

    pub async fn advance(
        &self,
        state: &mut SessionState,
        action: Action,
        value: &str,
    ) -> Result<Step, EngineError> {
        match action {
            Action::Catalog(index) => self.answer_catalog(state, index, value).await,
            Action::Consent => self.answer_consent(state, value).await,
            Action::FollowUp(id) => self.answer_follow_up(state, &id, value).await,
        }
    }

    // ── Catalog questions ──

    async fn answer_catalog(
        &self,
        state: &mut SessionState,
        index: usize,
        value: &str,
    ) -> Result<Step, EngineError> {
        let def = self.catalog.get(index).ok_or(EngineError::IndexOutOfBounds {
            index,
            len: self.catalog.len(),
        })?;
        let options: Vec<&str> = def.response_options.iter().map(|o| o.value.as_str()).collect();
        let value = clean_answer(
            &def.question_id,
            def.response_type,
            &options,
            def.char_limit(),
            value,
        )?;

        if state.result.find_question(&def.question_id, false).is_some() {
            state.response_map.insert(&def.response_name, value.clone());
            state
                .result
                .update_question_answer(&def.question_id, false, &value);
            debug!(
                person_id = %state.person_id,
                question = %def.question_id,
                "repeated answer updated in place"
            );
            return self.current(state);
        }

        if state.stage != Stage::Question || index != state.current_question_index {
            return Err(EngineError::InputValidation(format!(
                "question '{}' has not been reached",
                def.question_name
            )));
        }

        let rendered = def.render(question_text(def, &state.response_map)?);
        state.response_map.insert(&def.response_name, value.clone());
        state.result.record_question(QuestionRecord::from_rendered(
            &rendered,
            def.used_for_classifications.clone(),
            Some(value.clone()),
        ));
        debug!(person_id = %state.person_id, question = %def.question_id, "answer recorded");

        if let Some(route) = self.routing_target(def, &value) {
            info!(
                person_id = %state.person_id,
                question = %def.question_id,
                ?route,
                "routing rule matched, skipping remaining questions"
            );
            state.rerouted = true;
            state.stage = Stage::Summary;
            return Ok(Step::Redirect(route));
        }

        if self.config.survey_assist.enabled
            && let Some(interaction) = self.pending_interaction(state)
            && interaction.after_question_id == def.question_id
        {
            return self.start_interaction(state).await;
        }

        self.next_catalog(state)
    }

    /// First rule whose value matches the answer, provided it is well formed.
    fn routing_target(&self, def: &QuestionDefinition, value: &str) -> Option<Route> {
        let rule = def
            .routing_rules
            .iter()
            .find(|r| r.value.eq_ignore_ascii_case(value))?;

        let allowed = self
            .config
            .routing
            .allowed_routes
            .iter()
            .any(|r| r == &rule.route);
        let route = Route::parse(&rule.route);
        if !def.has_option_value(&rule.value) || !allowed || route.is_none() {
            let err = EngineError::Configuration(format!(
                "routing rule {} -> {} on question {} is malformed",
                rule.value, rule.route, def.question_id
            ));
            error!(error = %err, "ignoring routing rule");
            return None;
        }
        route
    }

    fn next_catalog(&self, state: &mut SessionState) -> Result<Step, EngineError> {
        state.stage = Stage::Question;
        state.current_question_index += 1;
        if state.current_question_index >= self.catalog.len() {
            state.stage = Stage::Summary;
            return Ok(Step::Redirect(Route::Summary));
        }
        self.current(state)
    }

    // ── Consent ──

    fn pending_interaction(&self, state: &SessionState) -> Option<&InteractionConfig> {
        self.config
            .survey_assist
            .interactions
            .get(state.interaction_cursor)
    }

    async fn start_interaction(&self, state: &mut SessionState) -> Result<Step, EngineError> {
        let Some(interaction) = self.pending_interaction(state) else {
            return self.next_catalog(state);
        };
        if !interaction.is_known_kind() {
            let err = EngineError::Configuration(format!(
                "unknown interaction type '{}'",
                interaction.kind
            ));
            error!(error = %err, after = %interaction.after_question_id, "skipping interaction");
            state.interaction_cursor += 1;
            return self.next_catalog(state);
        }

        let gate = ConsentGate::new(&self.config.survey_assist.consent);
        if gate.required() {
            match state.consent_given {
                None => {
                    state.stage = Stage::Consent;
                    return Ok(Step::Render(gate.render()));
                }
                Some(false) => {
                    debug!(person_id = %state.person_id, "consent declined earlier, skipping interaction");
                    state.interaction_cursor += 1;
                    return self.next_catalog(state);
                }
                Some(true) => {}
            }
        }

        if state.survey_iteration.assist_time_start.is_none() {
            state.survey_iteration.assist_time_start = Some(self.now());
        }
        self.run_interaction(state).await
    }

    async fn answer_consent(
        &self,
        state: &mut SessionState,
        value: &str,
    ) -> Result<Step, EngineError> {
        let gate = ConsentGate::new(&self.config.survey_assist.consent);
        let decision = gate.resolve(value)?;
        let answer = match decision {
            ConsentDecision::Yes => "yes",
            ConsentDecision::No => "no",
        };

        if state.stage != Stage::Consent {
            // The first decision stands; a replay never touches the session.
            if let Some(given) = state.consent_given {
                if given == matches!(decision, ConsentDecision::Yes) {
                    debug!(person_id = %state.person_id, "repeated consent answer ignored");
                } else {
                    warn!(
                        person_id = %state.person_id,
                        answer,
                        "consent already decided, conflicting answer ignored"
                    );
                }
                return self.current(state);
            }
            return Err(EngineError::InputValidation(
                "consent has not been requested".into(),
            ));
        }

        let rendered = gate.render();
        state.response_map.insert(&rendered.response_name, answer);
        state
            .result
            .record_question(QuestionRecord::from_rendered(&rendered, vec![], Some(answer.into())));

        let now = self.now();
        state.survey_iteration.assist_time_start = Some(now);
        match decision {
            ConsentDecision::Yes => {
                info!(person_id = %state.person_id, "consent given");
                state.consent_given = Some(true);
                self.run_interaction(state).await
            }
            ConsentDecision::No => {
                info!(person_id = %state.person_id, "consent declined");
                state.consent_given = Some(false);
                state.survey_iteration.assist_time_end = Some(now);
                state.interaction_cursor += 1;
                self.next_catalog(state)
            }
        }
    }

    // ── Classification path ──

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(GatewayError::Timeout(self.timeout).into()),
        }
    }

    async fn run_interaction(&self, state: &mut SessionState) -> Result<Step, EngineError> {
        let Some(interaction) = self.pending_interaction(state) else {
            return self.next_catalog(state);
        };
        let flavour = interaction.param;
        let input = |field: &str| replace_if_no_letters(state.response_map.get(field).unwrap_or(""));
        let job_title = input(&interaction.inputs.job_title);
        let job_description = input(&interaction.inputs.job_description);
        let org_description = input(&interaction.inputs.org_description);
        let person_id = state.person_id.clone();

        if interaction.uses_lookup() {
            let started = self.now();
            match self.call(self.gateway.lookup(flavour, &org_description)).await {
                Ok(payload) => {
                    let api = &self.config.api;
                    let response = map_lookup(payload, api.max_codes, api.max_divisions);
                    let found = response.found;
                    let code = response.code.clone();
                    state.result.append_interaction(
                        &person_id,
                        Interaction::lookup(
                            flavour,
                            response,
                            vec![InputField::new("org_description", org_description.clone())],
                            started,
                            self.now(),
                        ),
                    )?;
                    if found {
                        info!(%person_id, %flavour, code = ?code, "lookup matched, classification not needed");
                        return self.finish_interaction(state);
                    }
                }
                Err(err) => {
                    warn!(%person_id, %flavour, error = %err, "lookup failed, falling back to classification");
                }
            }
        }

        let started = self.now();
        let request = ClassifyRequest {
            flavour,
            job_title: &job_title,
            job_description: &job_description,
            org_description: &org_description,
        };
        let response = match self.call(self.gateway.classify(request)).await {
            Ok(response) => response,
            Err(err) => {
                error!(%person_id, %flavour, error = %err, "classification failed, continuing survey");
                return self.finish_interaction(state);
            }
        };
        if let Err(reason) = response.validate() {
            error!(%person_id, %flavour, %reason, "unusable classification response, continuing survey");
            return self.finish_interaction(state);
        }
        let Some(result) = response.result_for(flavour) else {
            return self.finish_interaction(state);
        };

        state.result.append_interaction(
            &person_id,
            Interaction::classify(
                flavour,
                result,
                vec![
                    InputField::new("job_title", job_title.clone()),
                    InputField::new("job_description", job_description.clone()),
                    InputField::new("org_description", org_description.clone()),
                ],
                started,
            ),
        )?;
        info!(
            %person_id,
            %flavour,
            classified = result.classified,
            candidates = result.candidates.len(),
            "classification recorded"
        );

        let specs = self.deriver.derive(result, flavour);
        if specs.is_empty() {
            state
                .result
                .touch_latest_classify(&person_id, flavour, self.now())?;
            return self.finish_interaction(state);
        }
        state
            .result
            .attach_follow_up_specs(&person_id, flavour, &specs)?;
        state.follow_up_queue.extend(specs);
        self.next_follow_up(state)
    }

    fn finish_interaction(&self, state: &mut SessionState) -> Result<Step, EngineError> {
        state.survey_iteration.assist_time_end = Some(self.now());
        state.interaction_cursor += 1;
        state.awaiting_follow_up = None;
        self.next_catalog(state)
    }

    // ── Follow-up questions ──

    fn next_follow_up(&self, state: &mut SessionState) -> Result<Step, EngineError> {
        let mode = &self.config.survey_assist.follow_up_mode;
        match state.follow_up_queue.next(mode) {
            Some(spec) => {
                let rendered = render_follow_up(&spec);
                let flavours = self
                    .pending_interaction(state)
                    .map(|i| vec![i.param])
                    .unwrap_or_default();
                state
                    .result
                    .record_question(QuestionRecord::from_rendered(&rendered, flavours, None));
                state.awaiting_follow_up = Some(spec);
                state.stage = Stage::FollowUp;
                Ok(Step::Render(rendered))
            }
            None => {
                if !state.follow_up_queue.is_empty() {
                    warn!(
                        person_id = %state.person_id,
                        dropped = state.follow_up_queue.len(),
                        "follow-up questions discarded"
                    );
                    state.follow_up_queue.clear();
                }
                self.finish_interaction(state)
            }
        }
    }

    async fn answer_follow_up(
        &self,
        state: &mut SessionState,
        id: &str,
        value: &str,
    ) -> Result<Step, EngineError> {
        let person_id = state.person_id.clone();

        if state.stage == Stage::FollowUp
            && let Some(spec) = state.awaiting_follow_up.as_ref().filter(|s| s.id == id)
        {
            let rendered = render_follow_up(spec);
            let options: Vec<&str> = rendered
                .response_options
                .iter()
                .map(|o| o.value.as_str())
                .collect();
            let value = clean_answer(
                id,
                rendered.response_type,
                &options,
                rendered.char_limit,
                value,
            )?;
            state
                .result
                .record_follow_up_answer(&person_id, id, &value, self.now())?;
            state.result.update_question_answer(id, true, &value);
            state.awaiting_follow_up = None;
            debug!(%person_id, question = id, "follow-up answered");
            return self.next_follow_up(state);
        }

        let Some(record) = state
            .result
            .find_question(id, true)
            .filter(|q| q.response.is_some())
        else {
            return Err(EngineError::InputValidation(format!(
                "follow-up question '{id}' is not awaiting an answer"
            )));
        };
        let options: Vec<&str> = record.response_options.iter().map(String::as_str).collect();
        let limit = record.response_type.is_free_text().then_some(DEFAULT_MAX_LEN);
        let value = clean_answer(id, record.response_type, &options, limit, value)?;
        state
            .result
            .record_follow_up_answer(&person_id, id, &value, self.now())?;
        state.result.update_question_answer(id, true, &value);
        debug!(%person_id, question = id, "repeated follow-up answer updated in place");
        self.current(state)
    }

    // ── Summary and completion ──

    pub fn summary(&self, state: &mut SessionState) -> Result<SummaryView, EngineError> {
        if !matches!(state.stage, Stage::Summary | Stage::Complete) {
            return Err(EngineError::InputValidation(
                "survey has unanswered questions".into(),
            ));
        }
        state.survey_iteration.time_end = Some(self.now());

        let label = &self.config.survey_assist.question_assist_label;
        let questions = state
            .result
            .questions()
            .iter()
            .cloned()
            .map(|mut q| {
                if q.assisted {
                    q.question_text.push_str(label);
                }
                q
            })
            .collect();
        Ok(SummaryView {
            questions,
            enabled: self.config.survey.summary_enabled,
        })
    }

    /// Close the survey and hand the document to the result store. A failed
    /// submission is logged and does not fail completion.
    pub async fn complete(&self, state: &mut SessionState) -> Result<Completion, EngineError> {
        self.close(state)?;
        Ok(self.submit(state).await)
    }

    /// Move a summarised session to `Complete` and stamp its end time.
    /// Callers that persist sessions commit this before [`Self::submit`], so
    /// only one request can ever send the document.
    pub fn close(&self, state: &mut SessionState) -> Result<(), EngineError> {
        match state.stage {
            Stage::Summary => {}
            Stage::Complete => {
                return Err(EngineError::InputValidation("survey already completed".into()));
            }
            _ => {
                return Err(EngineError::InputValidation(
                    "survey has unanswered questions".into(),
                ));
            }
        }

        let now = self.now();
        state.survey_iteration.time_end.get_or_insert(now);
        state.result.merge_time_end(now);
        state.stage = Stage::Complete;
        Ok(())
    }

    /// Send a closed session's document to the result store.
    pub async fn submit(&self, state: &SessionState) -> Completion {
        let document = state.result.document().clone();
        let result_id = match tokio::time::timeout(self.timeout, self.submitter.submit(&document)).await
        {
            Ok(Ok(receipt)) => {
                info!(
                    person_id = %state.person_id,
                    result_id = ?receipt.result_id,
                    "survey result submitted"
                );
                receipt.result_id
            }
            Ok(Err(err)) => {
                error!(person_id = %state.person_id, error = %err, "survey result submission failed");
                None
            }
            Err(_) => {
                error!(person_id = %state.person_id, timeout = ?self.timeout, "survey result submission timed out");
                None
            }
        };

        if state.rerouted {
            info!(person_id = %state.person_id, "respondent was rerouted, feedback skipped");
        }
        Completion {
            rerouted: state.rerouted,
            result_id,
            document,
        }
    }
}

/// Resolve `PLACEHOLDER_TEXT` from an earlier answer.
fn question_text(def: &QuestionDefinition, responses: &ResponseStore) -> Result<String, EngineError> {
    if !def.has_placeholder() {
        return Ok(def.question_text.clone());
    }
    let missing = |field: &str| EngineError::MissingPlaceholder {
        question_id: def.question_id.clone(),
        field: field.to_string(),
    };
    let field = def.placeholder_field().ok_or_else(|| missing(""))?;
    let value = responses.get(field).ok_or_else(|| missing(field))?;
    Ok(def.question_text.replace(PLACEHOLDER_TEXT, value))
}

/// Closed answers must name a declared option (the declared spelling is
/// kept); free text is sanitised and capped.
fn clean_answer(
    question_id: &str,
    response_type: ResponseType,
    options: &[&str],
    char_limit: Option<usize>,
    value: &str,
) -> Result<String, EngineError> {
    if response_type.is_closed() {
        let value = value.trim();
        return options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(value))
            .map(|o| o.to_string())
            .ok_or_else(|| {
                EngineError::InputValidation(format!(
                    "'{value}' is not an option of question {question_id}"
                ))
            });
    }

    if let Some(reason) = detect_injection(value) {
        warn!(question = question_id, %reason, "suspicious free-text answer");
    }
    let mut cleaned = sanitise(value, DEFAULT_MAX_LEN);
    if let Some(limit) = char_limit
        && cleaned.chars().count() > limit
    {
        cleaned = cleaned.chars().take(limit).collect();
    }
    Ok(cleaned)
}
