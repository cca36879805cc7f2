//! Session-backed front door to the navigation controller.
//!
//! Each call loads the session for a token, runs one navigation step on it
//! and writes it back with a version check, so a request either commits in
//! full or not at all.

use survey_assist_store::{SessionStore, StoreError, Versioned};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::navigation::{Completion, NavigationController, Step, SummaryView};
use crate::session::{SessionState, Stage};

pub struct SurveyService<St> {
    controller: NavigationController,
    store: St,
}

impl<St> SurveyService<St>
where
    St: SessionStore<SessionState>,
{
    pub fn new(controller: NavigationController, store: St) -> Self {
        Self { controller, store }
    }

    pub fn controller(&self) -> &NavigationController {
        &self.controller
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Open a new session and return its token with the first question.
    pub async fn start(&self, participant_id: &str) -> Result<(String, Step), EngineError> {
        let token = Uuid::new_v4().to_string();
        let person_id = Uuid::new_v4().to_string();
        let state = self.controller.start_session(participant_id, &person_id);
        let step = self.controller.current(&state)?;
        self.store.save(&token, None, &state).await?;
        Ok((token, step))
    }

    pub async fn current(&self, token: &str) -> Result<Step, EngineError> {
        let Versioned { state, .. } = self.load(token).await?;
        self.controller.current(&state)
    }

    pub async fn session(&self, token: &str) -> Result<SessionState, EngineError> {
        Ok(self.load(token).await?.state)
    }

    /// Apply one submitted answer. A write that loses a version race is
    /// replayed once against the fresh state; answers are idempotent, so the
    /// replay cannot double-record.
    pub async fn save_response(
        &self,
        token: &str,
        question_name: &str,
        value: &str,
    ) -> Result<Step, EngineError> {
        let mut replayed = false;
        loop {
            let Versioned { version, mut state } = self.load(token).await?;
            let step = self
                .controller
                .save_response(&mut state, question_name, value)
                .await?;
            match self.store.save(token, Some(version), &state).await {
                Ok(_) => return Ok(step),
                Err(err) if err.is_conflict() && !replayed => {
                    warn!(token, question = question_name, "session changed underneath request, replaying");
                    replayed = true;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn summary(&self, token: &str) -> Result<SummaryView, EngineError> {
        let Versioned { version, mut state } = self.load(token).await?;
        let view = self.controller.summary(&mut state)?;
        self.store.save(token, Some(version), &state).await?;
        Ok(view)
    }

    /// Submit the result and tear the session down. The session is marked
    /// complete with a version check before anything is sent, so of two
    /// overlapping requests only one submits.
    pub async fn complete(&self, token: &str) -> Result<Completion, EngineError> {
        let Versioned { version, mut state } = self.load(token).await?;
        self.controller.close(&mut state)?;
        match self.store.save(token, Some(version), &state).await {
            Ok(_) => {}
            Err(err) if err.is_conflict() => return Err(self.completion_conflict(token, err).await),
            Err(err) => return Err(err.into()),
        }

        let completion = self.controller.submit(&state).await;
        if let Err(err) = self.store.remove(token).await {
            warn!(token, error = %err, "failed to remove completed session");
        }
        info!(token, rerouted = completion.rerouted, "session completed");
        Ok(completion)
    }

    // Lost the race to close the session: report a finished survey as such.
    async fn completion_conflict(&self, token: &str, err: StoreError) -> EngineError {
        match self.store.load(token).await {
            Ok(None) => EngineError::InputValidation("survey already completed".into()),
            Ok(Some(current)) if current.state.stage == Stage::Complete => {
                EngineError::InputValidation("survey already completed".into())
            }
            _ => err.into(),
        }
    }

    pub async fn reset(&self, token: &str) -> Result<Step, EngineError> {
        let Versioned { version, mut state } = self.load(token).await?;
        let step = self.controller.reset(&mut state)?;
        self.store.save(token, Some(version), &state).await?;
        Ok(step)
    }

    // A failed read is retried once before giving up.
    async fn load(&self, token: &str) -> Result<Versioned<SessionState>, EngineError> {
        let loaded = match self.store.load(token).await {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(token, error = %err, "session load failed, retrying");
                self.store.load(token).await?
            }
        };
        loaded.ok_or_else(|| EngineError::UnknownSession(token.to_string()))
    }
}
