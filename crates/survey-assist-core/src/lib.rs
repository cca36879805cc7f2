//! Core types for Survey Assist: the static question catalog, classification
//! wire types, the nested result document, and TOML configuration.

pub mod classify;
pub mod config;
mod error;
pub mod gateway;
pub mod question;
pub mod result;
pub mod sanitise;

pub use classify::{
    Candidate, ClassificationResponse, ClassificationResult, DivisionMatch, DivisionMeta, Flavour,
    LookupPayload, LookupResponse, PotentialCode, PotentialDivision, PotentialMatches,
};
pub use config::{
    ApiConfig, AssistConfig, ConsentConfig, InteractionConfig, InteractionInputs, RoutingConfig,
    SurveyConfig, SurveySection,
};
pub use error::ConfigError;
pub use gateway::{ClassificationGateway, ClassifyRequest, GatewayError, ResultSubmitter};
pub use question::{
    OptionLabel, QuestionCatalog, QuestionDefinition, RenderedOption, RenderedQuestion,
    ResponseOption, ResponseType, RoutingRule, DEFAULT_BUTTON_TEXT, PLACEHOLDER_TEXT,
};
pub use result::{
    ClassificationRecord, FollowUp, FollowUpQuestion, InputField, Interaction, InteractionKind,
    InteractionResponse, PersonResponse, ResultDocument, ResultReceipt,
};
