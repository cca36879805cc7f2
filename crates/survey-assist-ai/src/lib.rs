//! Turns classification and lookup responses into what the survey needs next:
//! follow-up question specs and bounded lookup results.

pub mod followup;
pub mod lookup;

pub use followup::{FollowUpDeriver, FollowUpKind, FollowUpQuestionSpec, NONE_OF_THE_ABOVE};
pub use lookup::map_lookup;
