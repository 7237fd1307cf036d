use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LoanAppraisalError;
use crate::time_value::annuity_payment;
use crate::types::*;
use crate::LoanAppraisalResult;

/// Negative drift below this is reported as a data-quality concern before
/// the balance is clamped to zero.
pub const BALANCE_TOLERANCE: Decimal = dec!(0.000001);

const MONTHS_PER_YEAR: Decimal = dec!(12);
const PERCENT: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// How principal is spread across the term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmortisationPolicy {
    /// Constant principal each month; total payment declines (straight-line).
    #[default]
    #[serde(alias = "A", alias = "straight_line")]
    EqualPrincipal,
    /// Constant total payment each month (annuity).
    #[serde(alias = "B", alias = "annuity")]
    EqualInstalment,
}

impl std::fmt::Display for AmortisationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EqualPrincipal => write!(f, "equal_principal"),
            Self::EqualInstalment => write!(f, "equal_instalment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    /// Nominal annual rate as a percentage (8.5 = 8.5% p.a.)
    pub annual_rate_pct: Decimal,
    pub term_months: u32,
    /// When set, each row carries the due date `disbursement_date + month`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disbursement_date: Option<NaiveDate>,
}

impl LoanTerms {
    pub fn new(principal: Money, annual_rate_pct: Decimal, term_months: u32) -> Self {
        Self {
            principal,
            annual_rate_pct,
            term_months,
            disbursement_date: None,
        }
    }

    /// False when there is not enough data to build a schedule.
    pub fn is_complete(&self) -> bool {
        self.principal > Decimal::ZERO && self.term_months > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentRow {
    pub month: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub opening_balance: Money,
    pub principal: Money,
    pub interest: Money,
    pub payment: Money,
    pub closing_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentSchedule {
    pub policy: AmortisationPolicy,
    pub rows: Vec<RepaymentRow>,
}

impl RepaymentSchedule {
    pub fn first(&self) -> Option<&RepaymentRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&RepaymentRow> {
        self.rows.last()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_interest(&self) -> Money {
        self.rows.iter().map(|r| r.interest).sum()
    }

    pub fn total_principal(&self) -> Money {
        self.rows.iter().map(|r| r.principal).sum()
    }

    pub fn total_payment(&self) -> Money {
        self.rows.iter().map(|r| r.payment).sum()
    }
}

/// Schedule plus the drift warnings raised while building it.
#[derive(Debug, Clone)]
pub(crate) struct BuiltSchedule {
    pub schedule: RepaymentSchedule,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Monthly periodic rate from a nominal annual percentage.
pub fn monthly_rate(annual_rate_pct: Decimal) -> Rate {
    annual_rate_pct / PERCENT / MONTHS_PER_YEAR
}

/// Build the month-by-month repayment schedule.
///
/// Returns `Ok(None)` when principal is non-positive or the term is zero:
/// there is nothing to schedule, and callers must check before display or
/// export.
pub fn build_repayment_schedule(
    terms: &LoanTerms,
    policy: AmortisationPolicy,
) -> LoanAppraisalResult<Option<RepaymentSchedule>> {
    Ok(build_schedule(terms, policy)?.map(|b| b.schedule))
}

/// Same as [`build_repayment_schedule`], wrapped in the standard output
/// envelope. An incomplete input produces a `None` result and a warning.
pub fn repayment_schedule(
    terms: &LoanTerms,
    policy: AmortisationPolicy,
) -> LoanAppraisalResult<ComputationOutput<Option<RepaymentSchedule>>> {
    let start = Instant::now();

    let (schedule, warnings) = match build_schedule(terms, policy)? {
        Some(built) => (Some(built.schedule), built.warnings),
        None => (None, vec![insufficient_input_warning(terms)]),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology(policy),
        &serde_json::json!({
            "principal": terms.principal.to_string(),
            "annual_rate_pct": terms.annual_rate_pct.to_string(),
            "monthly_rate": monthly_rate(terms.annual_rate_pct).to_string(),
            "term_months": terms.term_months,
            "policy": policy,
        }),
        warnings,
        elapsed,
        schedule,
    ))
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

pub(crate) fn methodology(policy: AmortisationPolicy) -> &'static str {
    match policy {
        AmortisationPolicy::EqualPrincipal => "Equal-principal (straight-line) amortisation",
        AmortisationPolicy::EqualInstalment => "Equal-instalment (annuity) amortisation",
    }
}

pub(crate) fn insufficient_input_warning(terms: &LoanTerms) -> String {
    format!(
        "Insufficient input: principal {} and term {} months must both be positive; no schedule produced",
        terms.principal, terms.term_months
    )
}

pub(crate) fn build_schedule(
    terms: &LoanTerms,
    policy: AmortisationPolicy,
) -> LoanAppraisalResult<Option<BuiltSchedule>> {
    if terms.annual_rate_pct < Decimal::ZERO {
        return Err(LoanAppraisalError::InvalidInput {
            field: "annual_rate_pct".into(),
            reason: "Interest rate cannot be negative".into(),
        });
    }
    if !terms.is_complete() {
        return Ok(None);
    }

    let rate = monthly_rate(terms.annual_rate_pct);
    let built = match policy {
        AmortisationPolicy::EqualPrincipal => equal_principal(terms, rate)?,
        // A zero-rate annuity is straight-line; reuse it so both policies agree exactly.
        AmortisationPolicy::EqualInstalment if rate.is_zero() => {
            let mut built = equal_principal(terms, rate)?;
            built.schedule.policy = AmortisationPolicy::EqualInstalment;
            built
        }
        AmortisationPolicy::EqualInstalment => equal_instalment(terms, rate)?,
    };
    Ok(Some(built))
}

fn equal_principal(terms: &LoanTerms, rate: Rate) -> LoanAppraisalResult<BuiltSchedule> {
    let monthly_principal = terms.principal / Decimal::from(terms.term_months);
    let mut rows = Vec::with_capacity(terms.term_months as usize);
    let mut warnings = Vec::new();
    let mut balance = terms.principal;
    let mut paid = Decimal::ZERO;

    for month in 1..=terms.term_months {
        let interest = balance.checked_mul(rate).ok_or_else(|| overflow(month))?;
        let payment = monthly_principal
            .checked_add(interest)
            .ok_or_else(|| overflow(month))?;
        paid = paid.checked_add(payment).ok_or_else(|| overflow(month))?;
        balance -= monthly_principal;

        rows.push(RepaymentRow {
            month,
            due_date: due_date(terms, month),
            opening_balance: balance + monthly_principal,
            principal: monthly_principal,
            interest,
            payment,
            closing_balance: clamp_balance(balance, month, &mut warnings),
        });
    }

    Ok(BuiltSchedule {
        schedule: RepaymentSchedule {
            policy: AmortisationPolicy::EqualPrincipal,
            rows,
        },
        warnings,
    })
}

fn equal_instalment(terms: &LoanTerms, rate: Rate) -> LoanAppraisalResult<BuiltSchedule> {
    let instalment = annuity_payment(rate, terms.term_months, terms.principal)?;
    let mut rows = Vec::with_capacity(terms.term_months as usize);
    let mut warnings = Vec::new();
    let mut balance = terms.principal;
    let mut paid = Decimal::ZERO;

    for month in 1..=terms.term_months {
        let interest = balance.checked_mul(rate).ok_or_else(|| overflow(month))?;
        let mut principal = instalment
            .checked_sub(interest)
            .ok_or_else(|| overflow(month))?;
        let mut payment = instalment;

        // Final period: retire whatever is left so no residual survives rounding.
        if month == terms.term_months {
            principal = balance;
            payment = principal
                .checked_add(interest)
                .ok_or_else(|| overflow(month))?;
        }
        paid = paid.checked_add(payment).ok_or_else(|| overflow(month))?;

        let opening = balance;
        balance -= principal;

        rows.push(RepaymentRow {
            month,
            due_date: due_date(terms, month),
            opening_balance: opening,
            principal,
            interest,
            payment,
            closing_balance: clamp_balance(balance, month, &mut warnings),
        });
    }

    Ok(BuiltSchedule {
        schedule: RepaymentSchedule {
            policy: AmortisationPolicy::EqualInstalment,
            rows,
        },
        warnings,
    })
}

/// The running total of payments is checked, so every schedule total fits.
fn overflow(month: u32) -> LoanAppraisalError {
    LoanAppraisalError::NumericInstability(format!(
        "Month {month}: cumulative repayments exceed decimal range"
    ))
}

/// Floor a closing balance at zero. Drift beyond tolerance is logged.
fn clamp_balance(balance: Money, month: u32, warnings: &mut Vec<String>) -> Money {
    if balance >= Decimal::ZERO {
        return balance;
    }
    if balance < -BALANCE_TOLERANCE {
        tracing::warn!(
            month,
            balance = %balance,
            "negative closing balance clamped to zero"
        );
        warnings.push(format!(
            "Month {month}: closing balance {balance} was negative and has been clamped to zero"
        ));
    }
    Decimal::ZERO
}

fn due_date(terms: &LoanTerms, month: u32) -> Option<NaiveDate> {
    terms
        .disbursement_date
        .and_then(|d| d.checked_add_months(Months::new(month)))
}
