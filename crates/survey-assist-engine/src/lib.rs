//! Survey Assist questionnaire engine.
//!
//! Drives one respondent through the static catalog, interleaving consent
//! and classification-generated follow-up questions, and accumulates the
//! result document submitted at the end.

pub mod accumulator;
pub mod clock;
pub mod consent;
mod error;
pub mod navigation;
pub mod queue;
pub mod service;
pub mod session;

#[cfg(test)]
mod testing;

pub use accumulator::{QuestionRecord, ResultAccumulator};
pub use clock::{Clock, SystemClock};
pub use consent::{ConsentDecision, ConsentGate};
pub use error::EngineError;
pub use navigation::{Action, Completion, NavigationController, Route, Step, SummaryView};
pub use queue::{FollowUpMode, FollowUpQueue, render_follow_up};
pub use service::SurveyService;
pub use session::{ResponseStore, SessionState, Stage, SurveyIteration};
