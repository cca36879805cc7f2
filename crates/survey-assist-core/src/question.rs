//! Static question catalog.
//!
//! The catalog is loaded once at start-up and shared read-only by every
//! session. Questions are addressed by position (navigation), by
//! `question_name` (form submissions) and by `question_id` (interaction
//! triggers and routing).

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::classify::Flavour;

/// Token replaced at render time with an earlier answer.
pub const PLACEHOLDER_TEXT: &str = "PLACEHOLDER_TEXT";

const DEFAULT_TEXTAREA_LIMIT: usize = 150;
pub const DEFAULT_BUTTON_TEXT: &str = "Save and continue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Text,
    Textarea,
    Radio,
    Select,
    Confirm,
}

impl ResponseType {
    /// Closed questions only accept one of their declared option values.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Radio | Self::Select | Self::Confirm)
    }

    pub fn is_free_text(&self) -> bool {
        matches!(self, Self::Text | Self::Textarea)
    }

    /// Select and confirm questions are presented as a single-select radio group.
    pub fn rendered(&self) -> Self {
        match self {
            Self::Select | Self::Confirm => Self::Radio,
            other => *other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Radio => "radio",
            Self::Select => "select",
            Self::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLabel {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseOption {
    pub id: String,
    pub label: OptionLabel,
    pub value: String,
}

/// Early-exit rule: when the answer equals `value`, jump to `route`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub value: String,
    pub route: String,
}

/// A statically configured survey question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDefinition {
    pub question_id: String,
    pub question_name: String,
    #[serde(default)]
    pub title: String,
    pub question_text: String,
    #[serde(default)]
    pub question_description: String,
    pub response_type: ResponseType,
    pub response_name: String,
    #[serde(default)]
    pub response_options: Vec<ResponseOption>,
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,
    /// Normalised response field substituted for [`PLACEHOLDER_TEXT`].
    /// An empty string in the catalog means "none".
    #[serde(default)]
    pub placeholder_field: Option<String>,
    #[serde(default)]
    pub used_for_classifications: Vec<Flavour>,
    #[serde(default)]
    pub char_limit: Option<usize>,
}

impl QuestionDefinition {
    pub fn placeholder_field(&self) -> Option<&str> {
        self.placeholder_field
            .as_deref()
            .filter(|field| !field.is_empty())
    }

    pub fn has_placeholder(&self) -> bool {
        self.question_text.contains(PLACEHOLDER_TEXT)
    }

    /// Case-insensitive match against the declared option values.
    pub fn has_option_value(&self, value: &str) -> bool {
        self.response_options
            .iter()
            .any(|opt| opt.value.eq_ignore_ascii_case(value))
    }

    /// Character limit applied to free-text answers.
    pub fn char_limit(&self) -> Option<usize> {
        match self.response_type {
            ResponseType::Textarea => Some(self.char_limit.unwrap_or(DEFAULT_TEXTAREA_LIMIT)),
            ResponseType::Text => self.char_limit,
            _ => None,
        }
    }

    /// Build the renderable shape using already-resolved question text.
    pub fn render(&self, question_text: String) -> RenderedQuestion {
        RenderedQuestion {
            question_id: self.question_id.clone(),
            question_name: self.question_name.clone(),
            title: self.title.clone(),
            question_text,
            question_description: self.question_description.clone(),
            response_type: self.response_type.rendered(),
            response_name: self.response_name.clone(),
            response_options: self
                .response_options
                .iter()
                .map(|opt| RenderedOption {
                    id: opt.id.clone(),
                    label: opt.label.text.clone(),
                    value: opt.value.clone(),
                    required: false,
                })
                .collect(),
            char_limit: self.char_limit(),
            button_text: DEFAULT_BUTTON_TEXT.to_string(),
            assisted: false,
        }
    }
}

/// One option of a rendered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedOption {
    pub id: String,
    pub label: String,
    pub value: String,
    /// Marks the option group as mandatory (set on the first option only).
    #[serde(default)]
    pub required: bool,
}

/// The shape handed to the page renderer for catalog, consent and follow-up
/// questions alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedQuestion {
    pub question_id: String,
    pub question_name: String,
    pub title: String,
    pub question_text: String,
    pub question_description: String,
    pub response_type: ResponseType,
    pub response_name: String,
    pub response_options: Vec<RenderedOption>,
    pub char_limit: Option<usize>,
    pub button_text: String,
    /// True for questions generated from a classification result.
    pub assisted: bool,
}

impl RenderedQuestion {
    /// Case-insensitive match against the rendered option values.
    pub fn has_option_value(&self, value: &str) -> bool {
        self.response_options
            .iter()
            .any(|opt| opt.value.eq_ignore_ascii_case(value))
    }
}

/// Ordered, immutable list of catalog questions.
#[derive(Debug, Clone)]
pub struct QuestionCatalog {
    questions: Vec<QuestionDefinition>,
}

impl QuestionCatalog {
    /// Build a catalog, rejecting empty catalogs and duplicate ids or names.
    pub fn new(questions: Vec<QuestionDefinition>) -> Result<Self, ConfigError> {
        if questions.is_empty() {
            return Err(ConfigError::Catalog("catalog has no questions".into()));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for q in &questions {
            if !ids.insert(q.question_id.as_str()) {
                return Err(ConfigError::Catalog(format!(
                    "duplicate question_id '{}'",
                    q.question_id
                )));
            }
            if !names.insert(q.question_name.as_str()) {
                return Err(ConfigError::Catalog(format!(
                    "duplicate question_name '{}'",
                    q.question_name
                )));
            }
        }

        Ok(Self { questions })
    }

    /// Parse a JSON array of question definitions.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let questions: Vec<QuestionDefinition> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), count = catalog.len(), "loaded question catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QuestionDefinition> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionDefinition> {
        self.questions.iter()
    }

    /// Position of the question submitted under `question_name`.
    pub fn position_by_name(&self, question_name: &str) -> Option<usize> {
        self.questions
            .iter()
            .position(|q| q.question_name == question_name)
    }

    pub fn by_id(&self, question_id: &str) -> Option<&QuestionDefinition> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    /// Describe every routing rule that would be rejected at runtime.
    ///
    /// A rule is malformed when its `value` is not a declared option of the
    /// question or its `route` is not in `allowed_routes`.
    pub fn routing_problems(&self, allowed_routes: &[String]) -> Vec<String> {
        let mut problems = Vec::new();
        for q in &self.questions {
            for rule in &q.routing_rules {
                if !q.has_option_value(&rule.value) {
                    problems.push(format!(
                        "{}: routing value '{}' is not a declared option",
                        q.question_id, rule.value
                    ));
                }
                if !allowed_routes.iter().any(|r| r == &rule.route) {
                    problems.push(format!(
                        "{}: route '{}' is not allow-listed",
                        q.question_id, rule.route
                    ));
                }
            }
        }
        problems
    }
}
