use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use loan_appraisal_core::lending::amortization::{self, AmortisationPolicy, LoanTerms};
use loan_appraisal_core::lending::appraisal::{self, LoanAppraisalInput};
use loan_appraisal_core::lending::extraction;
use loan_appraisal_core::lending::narrative;
use loan_appraisal_core::AppraisalConfig;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Constant principal, declining payment (A)
    #[value(alias = "a", alias = "straight-line")]
    EqualPrincipal,
    /// Constant payment (B)
    #[value(alias = "b", alias = "annuity")]
    EqualInstalment,
}

impl From<PolicyArg> for AmortisationPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::EqualPrincipal => AmortisationPolicy::EqualPrincipal,
            PolicyArg::EqualInstalment => AmortisationPolicy::EqualInstalment,
        }
    }
}

/// Arguments for building a repayment schedule
#[derive(Args)]
pub struct ScheduleArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Loan principal
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Nominal annual interest rate in percent (8.5 = 8.5%)
    #[arg(long, alias = "rate")]
    pub annual_rate_pct: Option<Decimal>,

    /// Term in months
    #[arg(long, alias = "term")]
    pub term_months: Option<u32>,

    /// Amortisation policy (defaults to the configured policy)
    #[arg(long)]
    pub policy: Option<PolicyArg>,

    /// Disbursement date (YYYY-MM-DD); adds due dates to each row
    #[arg(long)]
    pub disbursement_date: Option<NaiveDate>,
}

/// Arguments for a full loan appraisal
#[derive(Args)]
pub struct AppraiseArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Loan principal
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Nominal annual interest rate in percent
    #[arg(long, alias = "rate")]
    pub annual_rate_pct: Option<Decimal>,

    /// Term in months
    #[arg(long, alias = "term")]
    pub term_months: Option<u32>,

    /// Monthly income
    #[arg(long, alias = "income")]
    pub monthly_income: Option<Decimal>,

    /// Monthly expense
    #[arg(long, alias = "expense")]
    pub monthly_expense: Option<Decimal>,

    /// Amortisation policy (defaults to the configured policy)
    #[arg(long)]
    pub policy: Option<PolicyArg>,

    /// Disbursement date (YYYY-MM-DD)
    #[arg(long)]
    pub disbursement_date: Option<NaiveDate>,

    /// Collateral market value
    #[arg(long, alias = "collateral")]
    pub collateral_value: Option<Decimal>,

    /// Total capital need of the project
    #[arg(long)]
    pub total_need: Option<Decimal>,

    /// Applicant's own contribution
    #[arg(long)]
    pub equity: Option<Decimal>,
}

/// Arguments for extracting fields from a loan application document
#[derive(Args)]
pub struct ExtractArgs {
    /// Path to the plain-text application (reads stdin when omitted)
    #[arg(long)]
    pub file: Option<String>,

    /// Appraise the extracted figures instead of printing them
    #[arg(long)]
    pub appraise: bool,

    /// Amortisation policy used with --appraise
    #[arg(long)]
    pub policy: Option<PolicyArg>,
}

/// Arguments for rendering a narrative-analysis prompt
#[derive(Args)]
pub struct PromptArgs {
    /// Path to an appraisal JSON input; the prompt covers its metrics
    #[arg(long, conflicts_with = "document")]
    pub input: Option<String>,

    /// Path to a plain-text application; the prompt covers the document
    #[arg(long)]
    pub document: Option<String>,

    /// Customer name to include in the metrics summary
    #[arg(long)]
    pub customer_name: Option<String>,
}

pub fn run_schedule(args: ScheduleArgs, config: &AppraisalConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let (terms, policy): (LoanTerms, Option<AmortisationPolicy>) = if let Some(ref path) = args.input {
        let appraisal_input: LoanAppraisalInput = input::file::read_json(path)?;
        (appraisal_input.terms(), appraisal_input.policy)
    } else if let Some(data) = input::stdin::read_stdin()? {
        let appraisal_input: LoanAppraisalInput = serde_json::from_value(data)?;
        (appraisal_input.terms(), appraisal_input.policy)
    } else {
        let terms = LoanTerms {
            principal: args.principal
                .ok_or("--principal is required (or provide --input)")?,
            annual_rate_pct: args.annual_rate_pct
                .ok_or("--annual-rate-pct is required (or provide --input)")?,
            term_months: args.term_months
                .ok_or("--term-months is required (or provide --input)")?,
            disbursement_date: args.disbursement_date,
        };
        (terms, args.policy.map(Into::into))
    };

    let policy = policy.unwrap_or(config.default_policy);
    let result = amortization::repayment_schedule(&terms, policy)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_appraise(args: AppraiseArgs, config: &AppraisalConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let appraisal_input: LoanAppraisalInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        LoanAppraisalInput {
            principal: args.principal
                .ok_or("--principal is required (or provide --input)")?,
            annual_rate_pct: args.annual_rate_pct
                .ok_or("--annual-rate-pct is required (or provide --input)")?,
            term_months: args.term_months
                .ok_or("--term-months is required (or provide --input)")?,
            monthly_income: args.monthly_income
                .ok_or("--monthly-income is required (or provide --input)")?,
            monthly_expense: args.monthly_expense.unwrap_or(Decimal::ZERO),
            policy: args.policy.map(Into::into),
            disbursement_date: args.disbursement_date,
            collateral_value: args.collateral_value,
            total_need: args.total_need,
            equity: args.equity,
        }
    };

    let result = appraisal::appraise_loan_with_config(&appraisal_input, config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_extract(args: ExtractArgs, config: &AppraisalConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let text = read_document(args.file.as_deref())?;
    let extracted = extraction::extract_loan_application(&text)?;

    if !args.appraise {
        return Ok(serde_json::to_value(extracted)?);
    }

    let appraisal_input = extracted
        .result
        .to_appraisal_input(args.policy.map(Into::into));
    let mut result = appraisal::appraise_loan_with_config(&appraisal_input, config)?;

    let mut warnings = extracted.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(serde_json::to_value(result)?)
}

pub fn run_analysis_prompt(args: PromptArgs, config: &AppraisalConfig) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(ref path) = args.document {
        let text = input::file::read_text(path)?;
        return Ok(json!({
            "source": "document",
            "prompt": narrative::document_analysis_prompt(&text),
        }));
    }

    let appraisal_input: LoanAppraisalInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input or --document is required (or pipe appraisal JSON on stdin)".into());
    };

    let output = appraisal::appraise_loan_with_config(&appraisal_input, config)?;
    let appraisal = output.result.ok_or_else(|| {
        output
            .warnings
            .first()
            .cloned()
            .unwrap_or_else(|| "Insufficient input".to_string())
    })?;

    let summary = narrative::render_metrics_summary(&appraisal, args.customer_name.as_deref());
    Ok(json!({
        "source": "metrics",
        "prompt": narrative::metrics_analysis_prompt(&summary),
    }))
}

fn read_document(path: Option<&str>) -> Result<String, Box<dyn std::error::Error>> {
    match path {
        Some(p) => input::file::read_text(p),
        None => input::stdin::read_stdin_text()?
            .ok_or_else(|| "--file is required (or pipe the document on stdin)".into()),
    }
}
