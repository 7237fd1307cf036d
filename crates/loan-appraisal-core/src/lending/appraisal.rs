use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::amortization::{self, AmortisationPolicy, LoanTerms, RepaymentSchedule};
use crate::config::{AppraisalConfig, AppraisalThresholds};
use crate::error::LoanAppraisalError;
use crate::types::*;
use crate::LoanAppraisalResult;

const PERCENT: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlowProfile {
    #[serde(default)]
    pub monthly_income: Money,
    #[serde(default)]
    pub monthly_expense: Money,
}

impl CashFlowProfile {
    /// Income less expense; `None` if the difference leaves decimal range.
    pub fn net_income(&self) -> Option<Money> {
        self.monthly_income.checked_sub(self.monthly_expense)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditMetrics {
    pub monthly_principal: Money,
    pub first_month_interest: Money,
    pub first_month_payment: Money,
    pub total_interest: Money,
    pub total_payment: Money,
    pub net_income: Money,
    /// First-month payment as a percentage of monthly income
    pub debt_service_ratio: Ratio,
    pub surplus: Money,
    pub dscr: Ratio,
}

/// Everything needed to appraise one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAppraisalInput {
    pub principal: Money,
    pub annual_rate_pct: Decimal,
    pub term_months: u32,
    #[serde(default)]
    pub monthly_income: Money,
    #[serde(default)]
    pub monthly_expense: Money,
    /// Falls back to the configured default policy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<AmortisationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disbursement_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collateral_value: Option<Money>,
    /// Total capital the project needs (loan plus own contribution)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_need: Option<Money>,
    /// Applicant's own contribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity: Option<Money>,
}

impl LoanAppraisalInput {
    pub fn terms(&self) -> LoanTerms {
        LoanTerms {
            principal: self.principal,
            annual_rate_pct: self.annual_rate_pct,
            term_months: self.term_months,
            disbursement_date: self.disbursement_date,
        }
    }

    pub fn cash_flow(&self) -> CashFlowProfile {
        CashFlowProfile {
            monthly_income: self.monthly_income,
            monthly_expense: self.monthly_expense,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub dscr_healthy: bool,
    pub debt_service_ratio_within_limit: bool,
    /// None when no collateral value was supplied
    pub ltv_within_limit: Option<bool>,
    pub positive_surplus: bool,
    pub concerns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAppraisal {
    pub policy: AmortisationPolicy,
    pub terms: LoanTerms,
    pub cash_flow: CashFlowProfile,
    pub schedule: RepaymentSchedule,
    pub metrics: CreditMetrics,
    pub ltv_pct: Option<Ratio>,
    pub equity_ratio_pct: Option<Ratio>,
    pub assessment: Assessment,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Derive credit metrics from the first row of `schedule`.
///
/// Ratios whose denominator is zero evaluate to zero rather than failing.
/// Returns `Ok(None)` for an empty schedule and `NumericInstability` when a
/// figure leaves decimal range.
pub fn calculate_credit_metrics(
    terms: &LoanTerms,
    cash_flow: &CashFlowProfile,
    schedule: &RepaymentSchedule,
) -> LoanAppraisalResult<Option<CreditMetrics>> {
    let Some(first) = schedule.first() else {
        return Ok(None);
    };

    let total_interest = schedule.total_interest();
    let net_income = cash_flow.net_income().ok_or_else(|| out_of_range("net income"))?;
    let payment = first.payment;

    let debt_service_ratio = if cash_flow.monthly_income > Decimal::ZERO {
        percent_of(payment, cash_flow.monthly_income).ok_or_else(|| out_of_range("debt-service ratio"))?
    } else {
        Decimal::ZERO
    };
    let dscr = if payment > Decimal::ZERO {
        net_income
            .checked_div(payment)
            .ok_or_else(|| out_of_range("DSCR"))?
    } else {
        Decimal::ZERO
    };

    Ok(Some(CreditMetrics {
        monthly_principal: first.principal,
        first_month_interest: first.interest,
        first_month_payment: payment,
        total_interest,
        total_payment: terms
            .principal
            .checked_add(total_interest)
            .ok_or_else(|| out_of_range("total payment"))?,
        net_income,
        debt_service_ratio,
        surplus: net_income
            .checked_sub(payment)
            .ok_or_else(|| out_of_range("surplus"))?,
        dscr,
    }))
}

/// Loan-to-value as a percentage; `None` without a positive collateral value.
pub fn loan_to_value(
    principal: Money,
    collateral_value: Option<Money>,
) -> LoanAppraisalResult<Option<Ratio>> {
    collateral_value
        .filter(|v| *v > Decimal::ZERO)
        .map(|v| percent_of(principal, v).ok_or_else(|| out_of_range("loan-to-value")))
        .transpose()
}

/// Own contribution as a percentage of the total capital need.
pub fn equity_ratio(
    equity: Option<Money>,
    total_need: Option<Money>,
) -> LoanAppraisalResult<Option<Ratio>> {
    match (equity, total_need) {
        (Some(e), Some(n)) if e >= Decimal::ZERO && n > Decimal::ZERO => percent_of(e, n)
            .map(Some)
            .ok_or_else(|| out_of_range("equity ratio")),
        _ => Ok(None),
    }
}

fn percent_of(part: Decimal, whole: Decimal) -> Option<Ratio> {
    part.checked_div(whole)?.checked_mul(PERCENT)
}

fn out_of_range(figure: &str) -> LoanAppraisalError {
    LoanAppraisalError::NumericInstability(format!("{figure} exceeds decimal range"))
}

pub fn assess(
    metrics: &CreditMetrics,
    cash_flow: &CashFlowProfile,
    ltv_pct: Option<Ratio>,
    thresholds: &AppraisalThresholds,
) -> Assessment {
    let mut concerns = Vec::new();

    let dscr_healthy = metrics.dscr >= thresholds.min_dscr;
    if !dscr_healthy {
        concerns.push(format!(
            "DSCR {:.2} is below the minimum of {}",
            metrics.dscr, thresholds.min_dscr
        ));
    }

    let has_income = cash_flow.monthly_income > Decimal::ZERO;
    let debt_service_ratio_within_limit =
        has_income && metrics.debt_service_ratio <= thresholds.max_debt_service_ratio_pct;
    if !has_income {
        concerns.push("No monthly income reported".to_string());
    } else if !debt_service_ratio_within_limit {
        concerns.push(format!(
            "Debt-service ratio {:.2}% exceeds the limit of {}%",
            metrics.debt_service_ratio, thresholds.max_debt_service_ratio_pct
        ));
    }

    let ltv_within_limit = ltv_pct.map(|ltv| ltv <= thresholds.max_ltv_pct);
    if ltv_within_limit == Some(false) {
        if let Some(ltv) = ltv_pct {
            concerns.push(format!(
                "LTV {:.2}% exceeds the limit of {}%",
                ltv, thresholds.max_ltv_pct
            ));
        }
    }

    let positive_surplus = metrics.surplus > Decimal::ZERO;
    if !positive_surplus {
        concerns.push(format!(
            "Net income does not cover the first payment (surplus {:.0})",
            metrics.surplus
        ));
    }

    Assessment {
        dscr_healthy,
        debt_service_ratio_within_limit,
        ltv_within_limit,
        positive_surplus,
        concerns,
    }
}

// ---------------------------------------------------------------------------
// Full appraisal
// ---------------------------------------------------------------------------

/// Appraise with default settings.
pub fn appraise_loan(
    input: &LoanAppraisalInput,
) -> LoanAppraisalResult<ComputationOutput<Option<LoanAppraisal>>> {
    appraise_loan_with_config(input, &AppraisalConfig::default())
}

/// Build the schedule, metrics and assessment for one application.
///
/// A non-positive principal or zero term yields a `None` result with a
/// warning; nothing is defaulted.
pub fn appraise_loan_with_config(
    input: &LoanAppraisalInput,
    config: &AppraisalConfig,
) -> LoanAppraisalResult<ComputationOutput<Option<LoanAppraisal>>> {
    let start = Instant::now();
    validate_input(input)?;

    let policy = input.policy.unwrap_or(config.default_policy);
    let terms = input.terms();
    let cash_flow = input.cash_flow();
    let mut warnings = Vec::new();

    let appraisal = match amortization::build_schedule(&terms, policy)? {
        None => {
            warnings.push(amortization::insufficient_input_warning(&terms));
            None
        }
        Some(built) => {
            warnings.extend(built.warnings);
            let schedule = built.schedule;
            let metrics = calculate_credit_metrics(&terms, &cash_flow, &schedule)?.ok_or_else(|| {
                LoanAppraisalError::NumericInstability("schedule has no rows".into())
            })?;
            let ltv_pct = loan_to_value(terms.principal, input.collateral_value)?;
            let equity_ratio_pct = equity_ratio(input.equity, input.total_need)?;
            let assessment = assess(&metrics, &cash_flow, ltv_pct, &config.thresholds);

            tracing::debug!(
                policy = %policy,
                dscr = %metrics.dscr,
                debt_service_ratio = %metrics.debt_service_ratio,
                concerns = assessment.concerns.len(),
                "loan appraised"
            );

            Some(LoanAppraisal {
                policy,
                terms,
                cash_flow,
                schedule,
                metrics,
                ltv_pct,
                equity_ratio_pct,
                assessment,
            })
        }
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        &format!("Loan appraisal: {}", amortization::methodology(policy)),
        &serde_json::json!({
            "principal": input.principal.to_string(),
            "annual_rate_pct": input.annual_rate_pct.to_string(),
            "term_months": input.term_months,
            "policy": policy,
            "min_dscr": config.thresholds.min_dscr.to_string(),
            "max_debt_service_ratio_pct": config.thresholds.max_debt_service_ratio_pct.to_string(),
            "max_ltv_pct": config.thresholds.max_ltv_pct.to_string(),
        }),
        warnings,
        elapsed,
        appraisal,
    ))
}

fn validate_input(input: &LoanAppraisalInput) -> LoanAppraisalResult<()> {
    let non_negative = [
        ("monthly_income", Some(input.monthly_income)),
        ("monthly_expense", Some(input.monthly_expense)),
        ("collateral_value", input.collateral_value),
        ("total_need", input.total_need),
        ("equity", input.equity),
    ];
    for (field, value) in non_negative {
        if value.is_some_and(|v| v < Decimal::ZERO) {
            return Err(LoanAppraisalError::InvalidInput {
                field: field.into(),
                reason: "Must not be negative".into(),
            });
        }
    }
    Ok(())
}
