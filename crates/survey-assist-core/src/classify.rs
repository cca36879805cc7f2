//! Wire types exchanged with the Survey Assist classification service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which code system a classification resolves.
///
/// `Sic` is the industrial activity code of the organisation, `Soc` the
/// occupational code of the respondent's main job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavour {
    Sic,
    Soc,
}

impl Flavour {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sic => "sic",
            Self::Soc => "soc",
        }
    }
}

impl fmt::Display for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flavour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sic" => Ok(Self::Sic),
            "soc" => Ok(Self::Soc),
            other => Err(format!("unknown classification flavour '{other}'")),
        }
    }
}

/// A potential code returned alongside a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub descriptive: String,
    pub likelihood: f64,
}

/// One classification result as returned by `/classify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(rename = "type")]
    pub flavour: Flavour,
    pub classified: bool,
    /// Open question the service suggests asking when not classified.
    #[serde(default)]
    pub followup: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub reasoning: String,
}

impl ClassificationResult {
    pub fn followup_text(&self) -> Option<&str> {
        self.followup
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Body of a `/classify` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub requested_type: String,
    pub results: Vec<ClassificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ClassificationResponse {
    /// Reject payloads that deserialise but violate the documented ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.results.is_empty() {
            return Err("classification response has no results".into());
        }
        for result in &self.results {
            for c in &result.candidates {
                if !(0.0..=1.0).contains(&c.likelihood) {
                    return Err(format!(
                        "candidate {} likelihood {} outside [0, 1]",
                        c.code, c.likelihood
                    ));
                }
            }
        }
        Ok(())
    }

    /// The result for `flavour`, falling back to the first result.
    pub fn result_for(&self, flavour: Flavour) -> Option<&ClassificationResult> {
        if let Some(result) = self.results.iter().find(|r| r.flavour == flavour) {
            return Some(result);
        }
        let fallback = self.results.first()?;
        warn!(
            requested = %flavour,
            returned = %fallback.flavour,
            "no result of the requested flavour, using the first result"
        );
        Some(fallback)
    }
}

/// Raw body of a `/{flavour}-lookup` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub code_division: Option<String>,
    #[serde(default)]
    pub potential_matches: Option<PotentialMatches>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PotentialMatches {
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub codes_count: usize,
    #[serde(default)]
    pub divisions: Vec<DivisionMatch>,
    #[serde(default)]
    pub divisions_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionMatch {
    pub code: String,
    #[serde(default)]
    pub meta: DivisionMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DivisionMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialCode {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialDivision {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Lookup result as recorded in the result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub found: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub code_division: Option<String>,
    pub potential_codes_count: usize,
    pub potential_divisions: Vec<PotentialDivision>,
    pub potential_codes: Vec<PotentialCode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_json(likelihood: f64) -> String {
        format!(
            r#"{{
                "requested_type": "sic",
                "results": [{{
                    "type": "sic",
                    "classified": false,
                    "followup": "Does your farm sell grain?",
                    "code": null,
                    "description": null,
                    "candidates": [
                        {{"code": "46210", "descriptive": "Wholesale of grain", "likelihood": {likelihood}}}
                    ],
                    "reasoning": "Ambiguous."
                }}]
            }}"#
        )
    }

    #[test]
    fn parses_classification_response() {
        let resp: ClassificationResponse = serde_json::from_str(&response_json(0.6)).unwrap();
        assert!(resp.validate().is_ok());
        assert!(resp.meta.is_none());

        let result = resp.result_for(Flavour::Sic).unwrap();
        assert!(!result.classified);
        assert_eq!(result.followup_text(), Some("Does your farm sell grain?"));
        assert_eq!(result.candidates[0].code, "46210");
    }

    #[test]
    fn likelihood_out_of_range_fails_validation() {
        let resp: ClassificationResponse = serde_json::from_str(&response_json(1.4)).unwrap();
        let err = resp.validate().unwrap_err();
        assert!(err.contains("46210"));
    }

    #[test]
    fn result_for_falls_back_to_first() {
        let resp: ClassificationResponse = serde_json::from_str(&response_json(0.5)).unwrap();
        assert_eq!(resp.result_for(Flavour::Soc).unwrap().flavour, Flavour::Sic);
    }

    #[test]
    fn blank_followup_is_none() {
        let mut resp: ClassificationResponse = serde_json::from_str(&response_json(0.5)).unwrap();
        resp.results[0].followup = Some("   ".into());
        assert_eq!(resp.results[0].followup_text(), None);
    }

    #[test]
    fn flavour_parses_case_insensitively() {
        assert_eq!("SIC".parse::<Flavour>().unwrap(), Flavour::Sic);
        assert!("sic_soc".parse::<Flavour>().is_err());
        assert_eq!(Flavour::Soc.to_string(), "soc");
    }

    #[test]
    fn lookup_payload_tolerates_missing_matches() {
        let payload: LookupPayload = serde_json::from_str(r#"{"code": "56302"}"#).unwrap();
        assert_eq!(payload.code.as_deref(), Some("56302"));
        assert!(payload.potential_matches.is_none());
    }
}
