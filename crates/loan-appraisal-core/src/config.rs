//! Appraisal settings shared by the CLI and the bindings.
//!
//! Every field has a default, so a partial TOML or JSON document only needs
//! to name what it overrides:
//!
//! ```toml
//! default_policy = "equal_instalment"
//!
//! [thresholds]
//! min_dscr = "1.3"
//!
//! [retry]
//! max_attempts = 5
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LoanAppraisalError;
use crate::lending::amortization::AmortisationPolicy;
use crate::types::Ratio;
use crate::LoanAppraisalResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppraisalConfig {
    /// Policy used when an input does not name one.
    pub default_policy: AmortisationPolicy,
    pub thresholds: AppraisalThresholds,
    pub retry: RetryPolicy,
}

/// Lending limits an application is assessed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppraisalThresholds {
    /// DSCR at or above this is considered healthy.
    pub min_dscr: Ratio,
    /// Maximum first-month payment as a percentage of monthly income.
    pub max_debt_service_ratio_pct: Ratio,
    /// Maximum loan-to-value, percent.
    pub max_ltv_pct: Ratio,
}

impl Default for AppraisalThresholds {
    fn default() -> Self {
        Self {
            min_dscr: dec!(1.25),
            max_debt_service_ratio_pct: dec!(70),
            max_ltv_pct: dec!(70),
        }
    }
}

/// Exponential backoff for calls to a narrative-analysis provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1,
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt);
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

impl AppraisalConfig {
    pub fn validate(&self) -> LoanAppraisalResult<()> {
        let t = &self.thresholds;
        if t.min_dscr < Decimal::ZERO {
            return Err(invalid("thresholds.min_dscr", "must not be negative"));
        }
        if t.max_debt_service_ratio_pct <= Decimal::ZERO {
            return Err(invalid(
                "thresholds.max_debt_service_ratio_pct",
                "must be positive",
            ));
        }
        if t.max_ltv_pct <= Decimal::ZERO {
            return Err(invalid("thresholds.max_ltv_pct", "must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.backoff_multiplier == 0 {
            return Err(invalid("retry.backoff_multiplier", "must be at least 1"));
        }
        Ok(())
    }

    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> LoanAppraisalResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LoanAppraisalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: &str) -> LoanAppraisalError {
    LoanAppraisalError::Config(format!("{key} {reason}"))
}
