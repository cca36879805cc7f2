//! In-process fakes shared by the engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use survey_assist_core::{
    Candidate, ClassificationGateway, ClassificationResponse, ClassificationResult,
    ClassifyRequest, Flavour, GatewayError, InteractionConfig, InteractionInputs, LookupPayload,
    QuestionCatalog, QuestionDefinition, ResponseOption, ResponseType, ResultDocument,
    ResultReceipt, ResultSubmitter, RoutingRule, SurveyConfig,
};

use crate::clock::Clock;
use crate::navigation::NavigationController;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 5, 8, 0, 0).unwrap()
}

pub fn text_question(id: &str, name: &str, response_name: &str) -> QuestionDefinition {
    QuestionDefinition {
        question_id: id.into(),
        question_name: name.into(),
        title: name.into(),
        question_text: format!("Question {id}"),
        question_description: String::new(),
        response_type: ResponseType::Text,
        response_name: response_name.into(),
        response_options: vec![],
        routing_rules: vec![],
        placeholder_field: None,
        used_for_classifications: vec![Flavour::Sic],
        char_limit: None,
    }
}

pub fn radio_question(id: &str, name: &str, options: &[&str], rules: &[(&str, &str)]) -> QuestionDefinition {
    QuestionDefinition {
        response_type: ResponseType::Radio,
        response_options: options
            .iter()
            .map(|o| ResponseOption {
                id: format!("{}-id", o.to_lowercase()),
                label: survey_assist_core::OptionLabel { text: o.to_string() },
                value: o.to_string(),
            })
            .collect(),
        routing_rules: rules
            .iter()
            .map(|(value, route)| RoutingRule {
                value: value.to_string(),
                route: route.to_string(),
            })
            .collect(),
        used_for_classifications: vec![],
        ..text_question(id, name, &name.replace('_', "-"))
    }
}

/// job title, job description, organisation activity.
pub fn job_catalog() -> QuestionCatalog {
    QuestionCatalog::new(vec![
        text_question("q1", "job_title", "job-title"),
        text_question("q2", "job_description", "job-description"),
        text_question("q3", "organisation_activity", "organisation-activity"),
    ])
    .unwrap()
}

pub fn config_with_interaction(after: &str, kind: &str, consent_required: bool) -> SurveyConfig {
    let mut config = SurveyConfig::default();
    config.survey.title = "Shape Tomorrow".into();
    config.survey_assist.consent.required = consent_required;
    config.survey_assist.interactions = vec![InteractionConfig {
        after_question_id: after.into(),
        kind: kind.into(),
        param: Flavour::Sic,
        inputs: InteractionInputs::default(),
    }];
    config
}

pub fn ambiguous_result() -> ClassificationResult {
    ClassificationResult {
        flavour: Flavour::Sic,
        classified: false,
        followup: Some("Does your farm sell grain?".into()),
        code: None,
        description: None,
        candidates: vec![
            Candidate {
                code: "46210".into(),
                descriptive: "Wholesale of grain, unmanufactured tobacco, seeds and animal feeds"
                    .into(),
                likelihood: 0.6,
            },
            Candidate {
                code: "46390".into(),
                descriptive: "Non-specialised wholesale of food, beverages and tobacco".into(),
                likelihood: 0.4,
            },
        ],
        reasoning: "Farm selling grain could be wholesale.".into(),
    }
}

pub fn classified_result() -> ClassificationResult {
    ClassificationResult {
        flavour: Flavour::Sic,
        classified: true,
        followup: None,
        code: Some("62012".into()),
        description: Some("Business and domestic software development".into()),
        candidates: vec![],
        reasoning: "Clear match.".into(),
    }
}

#[derive(Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail,
    Hang,
}

pub struct FakeGateway {
    pub lookup_reply: Mutex<Reply<LookupPayload>>,
    pub classify_reply: Mutex<Reply<ClassificationResult>>,
    pub lookups: Mutex<Vec<String>>,
    pub classifications: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new(lookup: Reply<LookupPayload>, classify: Reply<ClassificationResult>) -> Self {
        Self {
            lookup_reply: Mutex::new(lookup),
            classify_reply: Mutex::new(classify),
            lookups: Mutex::new(Vec::new()),
            classifications: Mutex::new(Vec::new()),
        }
    }

    pub fn not_found_then(classify: ClassificationResult) -> Self {
        Self::new(Reply::Ok(LookupPayload::default()), Reply::Ok(classify))
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    pub fn classify_calls(&self) -> usize {
        self.classifications.lock().unwrap().len()
    }
}

#[async_trait]
impl ClassificationGateway for FakeGateway {
    async fn lookup(
        &self,
        _flavour: Flavour,
        description: &str,
    ) -> Result<LookupPayload, GatewayError> {
        self.lookups.lock().unwrap().push(description.to_string());
        let reply = self.lookup_reply.lock().unwrap().clone();
        match reply {
            Reply::Ok(payload) => Ok(payload),
            Reply::Fail => Err(GatewayError::Transport("connection refused".into())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(GatewayError::Transport("unreachable".into()))
            }
        }
    }

    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<ClassificationResponse, GatewayError> {
        self.classifications
            .lock()
            .unwrap()
            .push(request.org_description.to_string());
        let reply = self.classify_reply.lock().unwrap().clone();
        match reply {
            Reply::Ok(result) => Ok(ClassificationResponse {
                requested_type: request.flavour.to_string(),
                results: vec![result],
                meta: None,
            }),
            Reply::Fail => Err(GatewayError::Server {
                status: 500,
                body: "internal error".into(),
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(GatewayError::Transport("unreachable".into()))
            }
        }
    }
}

#[derive(Default)]
pub struct FakeSubmitter {
    pub submitted: Mutex<Vec<ResultDocument>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

#[async_trait]
impl ResultSubmitter for FakeSubmitter {
    async fn submit(&self, document: &ResultDocument) -> Result<ResultReceipt, GatewayError> {
        if self.fail {
            return Err(GatewayError::Transport("result store down".into()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.submitted.lock().unwrap().push(document.clone());
        Ok(ResultReceipt {
            message: "stored".into(),
            result_id: Some("result-123".into()),
        })
    }
}

pub struct Harness {
    pub controller: NavigationController,
    pub gateway: Arc<FakeGateway>,
    pub submitter: Arc<FakeSubmitter>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(catalog: QuestionCatalog, config: SurveyConfig, gateway: FakeGateway) -> Harness {
    harness_with_submitter(catalog, config, gateway, FakeSubmitter::default())
}

pub fn harness_with_submitter(
    catalog: QuestionCatalog,
    config: SurveyConfig,
    gateway: FakeGateway,
    submitter: FakeSubmitter,
) -> Harness {
    let gateway = Arc::new(gateway);
    let submitter = Arc::new(submitter);
    let clock = Arc::new(ManualClock::new(start_time()));
    let controller = NavigationController::new(
        Arc::new(catalog),
        Arc::new(config),
        gateway.clone(),
        submitter.clone(),
    )
    .with_clock(clock.clone())
    .with_timeout(Duration::from_millis(50));
    Harness {
        controller,
        gateway,
        submitter,
        clock,
    }
}
