//! Maps the raw lookup payload onto the shape stored in the result document.

use survey_assist_core::{LookupPayload, LookupResponse, PotentialCode, PotentialDivision};
use tracing::info;

/// Build a [`LookupResponse`], keeping at most `max_codes` potential codes and
/// `max_divisions` potential divisions.
///
/// `found` is true exactly when the service returned a code.
/// `potential_codes_count` is the count the service reported, before any
/// limit. Potential codes carry no description; the lookup index only returns
/// the code itself.
pub fn map_lookup(
    payload: LookupPayload,
    max_codes: Option<usize>,
    max_divisions: Option<usize>,
) -> LookupResponse {
    let matches = payload.potential_matches.unwrap_or_default();

    let mut codes = matches.codes;
    let codes_count = matches.codes_count.max(codes.len());
    if let Some(max) = max_codes
        && codes_count > max
    {
        info!(limit = max, received = codes_count, "limiting potential lookup codes");
        codes.truncate(max);
    }

    let mut divisions = matches.divisions;
    let divisions_count = matches.divisions_count.max(divisions.len());
    if let Some(max) = max_divisions
        && divisions_count > max
    {
        info!(limit = max, received = divisions_count, "limiting potential lookup divisions");
        divisions.truncate(max);
    }

    let potential_codes: Vec<PotentialCode> = codes
        .into_iter()
        .map(|code| PotentialCode {
            code,
            description: String::new(),
        })
        .collect();

    let potential_divisions = divisions
        .into_iter()
        .map(|div| PotentialDivision {
            code: div.code,
            title: div.meta.title,
            detail: div.meta.detail,
        })
        .collect();

    LookupResponse {
        found: payload.code.is_some(),
        code: payload.code,
        code_division: payload.code_division,
        potential_codes_count: codes_count,
        potential_codes,
        potential_divisions,
    }
}
