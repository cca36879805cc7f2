//! reqwest client for the Survey Assist API: lookup, classify, result
//! submission and the service config endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use survey_assist_core::{
    ApiConfig, ClassificationGateway, ClassificationResponse, ClassifyRequest, Flavour,
    GatewayError, LookupPayload, ResultDocument, ResultReceipt, ResultSubmitter,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    Invalid(String),
}

/// Authenticated client for the Survey Assist API.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    llm: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ClassifyBody<'a> {
    llm: &'a str,
    #[serde(rename = "type")]
    flavour: Flavour,
    job_title: &'a str,
    job_description: &'a str,
    org_description: &'a str,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:5000`, trailing
    /// slash optional). Every request is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            llm: "gemini".into(),
            timeout,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut client = Self::new(
            &config.base_url,
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        client.llm = config.llm.clone();
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the service's own configuration (`GET /survey-assist/config`).
    pub async fn service_config(&self) -> Result<serde_json::Value, ApiError> {
        self.get_json("/survey-assist/config", &[]).await
    }

    pub async fn lookup_raw(
        &self,
        flavour: Flavour,
        description: &str,
    ) -> Result<LookupPayload, ApiError> {
        let path = format!("/survey-assist/{flavour}-lookup");
        let payload: LookupPayload = self
            .get_json(&path, &[("description", description), ("similarity", "true")])
            .await?;
        info!(
            flavour = %flavour,
            found = payload.code.is_some(),
            "lookup complete"
        );
        Ok(payload)
    }

    pub async fn classify_raw(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<ClassificationResponse, ApiError> {
        let body = ClassifyBody {
            llm: &self.llm,
            flavour: request.flavour,
            job_title: request.job_title,
            job_description: request.job_description,
            org_description: request.org_description,
        };
        let response: ClassificationResponse =
            self.post_json("/survey-assist/classify", &body).await?;
        response.validate().map_err(ApiError::Invalid)?;

        if let Some(first) = response.results.first() {
            if first.classified {
                info!(code = ?first.code, "classified unambiguously");
            } else {
                info!(followup = ?first.followup, "not classified");
            }
        }
        Ok(response)
    }

    pub async fn submit_raw(&self, document: &ResultDocument) -> Result<ResultReceipt, ApiError> {
        let receipt: ResultReceipt = self.post_json("/survey-assist/result", document).await?;
        match &receipt.result_id {
            Some(id) => info!(result_id = %id, "survey result saved"),
            None => warn!("result response did not include a result_id"),
        }
        Ok(receipt)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        let mut req = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Self::read_json(req.send().await?).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        let mut req = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Self::read_json(req.send().await?).await
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    fn to_gateway(&self, err: ApiError) -> GatewayError {
        match err {
            ApiError::Http(e) if e.is_timeout() => GatewayError::Timeout(self.timeout),
            ApiError::Http(e) => GatewayError::Transport(e.to_string()),
            ApiError::Server { status, body } => GatewayError::Server { status, body },
            ApiError::Json(e) => GatewayError::Schema(e.to_string()),
            ApiError::Invalid(msg) => GatewayError::Schema(msg),
        }
    }
}

#[async_trait]
impl ClassificationGateway for ApiClient {
    async fn lookup(
        &self,
        flavour: Flavour,
        description: &str,
    ) -> Result<LookupPayload, GatewayError> {
        self.lookup_raw(flavour, description)
            .await
            .map_err(|e| self.to_gateway(e))
    }

    async fn classify(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<ClassificationResponse, GatewayError> {
        self.classify_raw(request)
            .await
            .map_err(|e| self.to_gateway(e))
    }
}

#[async_trait]
impl ResultSubmitter for ApiClient {
    async fn submit(&self, document: &ResultDocument) -> Result<ResultReceipt, GatewayError> {
        self.submit_raw(document)
            .await
            .map_err(|e| self.to_gateway(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, None, Duration::from_secs(20)).unwrap()
    }

    #[test]
    fn trims_trailing_slash() {
        assert_eq!(client("http://127.0.0.1:5000/").base_url(), "http://127.0.0.1:5000");
    }

    #[test]
    fn from_config_takes_llm_and_timeout() {
        let config = ApiConfig {
            llm: "chat-gpt".into(),
            timeout_secs: 5,
            ..ApiConfig::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        assert_eq!(client.llm, "chat-gpt");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn classify_body_shape() {
        let body = ClassifyBody {
            llm: "gemini",
            flavour: Flavour::Sic,
            job_title: "Farm Hand",
            job_description: "Milking cows",
            org_description: "Dairy farm",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "sic");
        assert_eq!(json["llm"], "gemini");
        assert_eq!(json["org_description"], "Dairy farm");
    }

    #[test]
    fn error_mapping() {
        let c = client("http://localhost");
        let err = c.to_gateway(ApiError::Server {
            status: 503,
            body: "unavailable".into(),
        });
        assert!(matches!(err, GatewayError::Server { status: 503, .. }));

        let json_err = serde_json::from_str::<ResultReceipt>("{").unwrap_err();
        assert!(matches!(c.to_gateway(json_err.into()), GatewayError::Schema(_)));
    }

    #[test]
    fn result_document_serialises_for_submission() {
        let t = Utc.with_ymd_and_hms(2025, 9, 5, 8, 0, 0).unwrap();
        let doc = ResultDocument {
            survey_id: "shape_tomorrow_prototype".into(),
            wave_id: "wave_001".into(),
            case_id: "case-1".into(),
            user: "participant-1".into(),
            time_start: t,
            time_end: t,
            responses: vec![],
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["time_start"], "2025-09-05T08:00:00Z");
        assert!(json["responses"].as_array().unwrap().is_empty());
    }

    #[test]
    fn receipt_without_result_id() {
        let receipt: ResultReceipt =
            serde_json::from_str(r#"{"message": "stored"}"#).unwrap();
        assert!(receipt.result_id.is_none());
    }
}
