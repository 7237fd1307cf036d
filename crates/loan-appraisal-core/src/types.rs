use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Principal, balances, instalments, income and collateral values.
/// Always Decimal, so schedules reproduce to the last digit.
pub type Money = Decimal;

/// Periodic rate as a fraction (0.01 = 1% per month). Annual inputs stay
/// in percent as `annual_rate_pct` until converted by `monthly_rate`.
pub type Rate = Decimal;

/// Ratios and percentages reported back to the caller (e.g. DSCR 1.4x, DSR 35%)
pub type Ratio = Decimal;

/// Envelope returned by schedule, appraisal and extraction calls.
///
/// `result` is `None` for schedules and appraisals when the loan terms are
/// incomplete; `warnings` then says why, and also carries clamped-balance
/// and missing-field notices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Crate version, timing and numeric precision of one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Wrap a result with its methodology label, the inputs it assumed and
/// any warnings.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
