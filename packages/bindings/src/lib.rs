use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use loan_appraisal_core::lending::amortization;
use loan_appraisal_core::lending::appraisal::{self, LoanAppraisalInput};
use loan_appraisal_core::lending::{extraction, narrative};
use loan_appraisal_core::AppraisalConfig;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Schedules and appraisal
// ---------------------------------------------------------------------------

#[napi]
pub fn repayment_schedule(input_json: String) -> NapiResult<String> {
    let input: LoanAppraisalInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let policy = input.policy.unwrap_or_default();
    let output =
        amortization::repayment_schedule(&input.terms(), policy).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn loan_appraisal(input_json: String, config_json: Option<String>) -> NapiResult<String> {
    let input: LoanAppraisalInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let config = match config_json {
        Some(json) => AppraisalConfig::from_json(&json).map_err(to_napi_error)?,
        None => AppraisalConfig::default(),
    };
    let output = appraisal::appraise_loan_with_config(&input, &config).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Documents and narrative
// ---------------------------------------------------------------------------

#[napi]
pub fn extract_loan_application(text: String) -> NapiResult<String> {
    let output = extraction::extract_loan_application(&text).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct PromptRequest {
    #[serde(flatten)]
    input: LoanAppraisalInput,
    #[serde(default)]
    customer_name: Option<String>,
}

/// Render the metrics-analysis prompt for an appraisal input; the host
/// application sends it to whichever model provider it uses.
#[napi]
pub fn metrics_analysis_prompt(input_json: String) -> NapiResult<String> {
    let request: PromptRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = appraisal::appraise_loan(&request.input).map_err(to_napi_error)?;
    let appraisal = output.result.ok_or_else(|| {
        to_napi_error(
            output
                .warnings
                .first()
                .map(String::as_str)
                .unwrap_or("Insufficient input"),
        )
    })?;
    let summary = narrative::render_metrics_summary(&appraisal, request.customer_name.as_deref());
    Ok(narrative::metrics_analysis_prompt(&summary))
}
