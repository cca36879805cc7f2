//! Seams to the external classification service and result store.
//!
//! The engine only sees these traits; `survey-assist-sync` provides the HTTP
//! implementation and tests supply in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::classify::{ClassificationResponse, Flavour, LookupPayload};
use crate::result::{ResultDocument, ResultReceipt};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Schema(String),
}

/// Inputs forwarded to `/classify`.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRequest<'a> {
    pub flavour: Flavour,
    pub job_title: &'a str,
    pub job_description: &'a str,
    pub org_description: &'a str,
}

#[async_trait]
pub trait ClassificationGateway: Send + Sync {
    /// Look `description` up in the curated index for `flavour`. The raw
    /// payload is returned; result limits are applied by the caller.
    async fn lookup(
        &self,
        flavour: Flavour,
        description: &str,
    ) -> Result<LookupPayload, GatewayError>;

    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<ClassificationResponse, GatewayError>;
}

#[async_trait]
pub trait ResultSubmitter: Send + Sync {
    async fn submit(&self, document: &ResultDocument) -> Result<ResultReceipt, GatewayError>;
}
