//! Narrative credit analysis through an external text-generation service.
//!
//! The service is a capability injected by the caller: anything that
//! implements [`NarrativeGenerator`]. This module renders the prompts,
//! wraps a generator with retry and provider failover, and keeps the
//! in-memory chat history. It never performs I/O itself.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::appraisal::LoanAppraisal;
use crate::config::RetryPolicy;
use crate::types::Money;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum NarrativeError {
    #[error("rate limited by provider")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("invalid or missing API credential")]
    InvalidCredential,

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl NarrativeError {
    /// Rate limits and outages may clear; a bad credential will not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidCredential)
    }
}

/// Opaque text-in, text-out generation.
pub trait NarrativeGenerator {
    fn generate(&self, prompt: &str) -> Result<String, NarrativeError>;
}

impl<F> NarrativeGenerator for F
where
    F: Fn(&str) -> Result<String, NarrativeError>,
{
    fn generate(&self, prompt: &str) -> Result<String, NarrativeError> {
        self(prompt)
    }
}

// ---------------------------------------------------------------------------
// Retry / failover
// ---------------------------------------------------------------------------

/// Retries retryable failures with exponential backoff.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: NarrativeGenerator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> G {
        self.inner
    }

    /// Backoff for the given retry, stretched to any provider-supplied
    /// `retry_after`, and capped at the policy maximum.
    fn delay(&self, error: &NarrativeError, retry: u32) -> std::time::Duration {
        let backoff = self.policy.delay_for_attempt(retry);
        let requested = match error {
            NarrativeError::RateLimited {
                retry_after_ms: Some(ms),
            } => std::time::Duration::from_millis(*ms),
            _ => std::time::Duration::ZERO,
        };
        backoff
            .max(requested)
            .min(std::time::Duration::from_millis(self.policy.max_delay_ms))
    }
}

impl<G: NarrativeGenerator> NarrativeGenerator for RetryingGenerator<G> {
    fn generate(&self, prompt: &str) -> Result<String, NarrativeError> {
        let mut attempt = 0;

        loop {
            match self.inner.generate(prompt) {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        tracing::warn!(
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            error = %e,
                            "narrative generation retries exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.delay(&e, attempt - 1);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying narrative generation"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

/// Tries providers in order; the first success wins.
///
/// When every provider fails, the first retryable error is returned, so a
/// wrapping [`RetryingGenerator`] still retries if any provider may recover.
#[derive(Default)]
pub struct FailoverGenerator {
    providers: Vec<(String, Box<dyn NarrativeGenerator + Send + Sync>)>,
}

impl FailoverGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        generator: impl NarrativeGenerator + Send + Sync + 'static,
    ) -> Self {
        self.providers.push((name.into(), Box::new(generator)));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl NarrativeGenerator for FailoverGenerator {
    fn generate(&self, prompt: &str) -> Result<String, NarrativeError> {
        let mut retryable = None;
        let mut last_error = NarrativeError::Unavailable("no providers configured".into());

        for (name, provider) in &self.providers {
            match provider.generate(prompt) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "provider failed, trying next");
                    if retryable.is_none() && e.is_retryable() {
                        retryable = Some(e);
                    } else {
                        last_error = e;
                    }
                }
            }
        }

        Err(retryable.unwrap_or(last_error))
    }
}

// ---------------------------------------------------------------------------
// Prompt rendering
// ---------------------------------------------------------------------------

/// Whole-unit amount with `.` as the thousands separator (1234567 -> "1.234.567").
pub fn format_amount(amount: Money) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if rounded < Decimal::ZERO {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Plain-text summary of an appraisal, used as prompt data.
pub fn render_metrics_summary(appraisal: &LoanAppraisal, customer_name: Option<&str>) -> String {
    let m = &appraisal.metrics;
    let t = &appraisal.terms;
    let cf = &appraisal.cash_flow;

    let mut out = String::new();
    out.push_str("CUSTOMER:\n");
    out.push_str(&format!("- Name: {}\n", customer_name.unwrap_or("N/A")));
    out.push_str(&format!("- Monthly income: {}\n", format_amount(cf.monthly_income)));
    out.push_str(&format!("- Monthly expense: {}\n", format_amount(cf.monthly_expense)));

    out.push_str("\nLOAN:\n");
    out.push_str(&format!("- Amount: {}\n", format_amount(t.principal)));
    out.push_str(&format!("- Interest rate: {}% p.a.\n", t.annual_rate_pct.normalize()));
    out.push_str(&format!("- Term: {} months\n", t.term_months));
    out.push_str(&format!("- Amortisation: {}\n", appraisal.policy));

    out.push_str("\nCREDIT METRICS:\n");
    out.push_str(&format!("- First monthly payment: {}\n", format_amount(m.first_month_payment)));
    out.push_str(&format!("- Total interest: {}\n", format_amount(m.total_interest)));
    out.push_str(&format!("- DSCR: {:.2}\n", m.dscr));
    out.push_str(&format!("- Debt-service ratio: {:.2}%\n", m.debt_service_ratio));
    out.push_str(&format!("- Surplus after payment: {}\n", format_amount(m.surplus)));
    if let Some(ltv) = appraisal.ltv_pct {
        out.push_str(&format!("- LTV: {ltv:.2}%\n"));
    }
    if let Some(eq) = appraisal.equity_ratio_pct {
        out.push_str(&format!("- Own contribution: {eq:.2}% of total need\n"));
    }
    out
}

const ANALYST_ROLE: &str = "You are a bank credit analyst.";

pub fn metrics_analysis_prompt(summary: &str) -> String {
    format!(
        "{ANALYST_ROLE} Analyse the following financial indicators of a loan application:\n\n\
         {summary}\n\
         Please provide:\n\
         1. An assessment of the key financial indicators\n\
         2. A comparison against common banking standards\n\
         3. An analysis of repayment capacity and cash flow\n\
         4. An assessment of the risk level\n\
         5. A conclusion and recommendation\n"
    )
}

pub fn document_analysis_prompt(document_text: &str) -> String {
    format!(
        "{ANALYST_ROLE} Analyse the following loan application in detail:\n\n\
         {document_text}\n\n\
         Please provide:\n\
         1. An overall assessment of the plan\n\
         2. Its strengths and weaknesses\n\
         3. An assessment of repayment capacity\n\
         4. A risk analysis\n\
         5. A conclusion and recommendation\n"
    )
}

pub fn analyze_metrics(
    generator: &dyn NarrativeGenerator,
    appraisal: &LoanAppraisal,
    customer_name: Option<&str>,
) -> Result<String, NarrativeError> {
    let summary = render_metrics_summary(appraisal, customer_name);
    generator.generate(&metrics_analysis_prompt(&summary))
}

pub fn analyze_document(
    generator: &dyn NarrativeGenerator,
    document_text: &str,
) -> Result<String, NarrativeError> {
    generator.generate(&document_analysis_prompt(document_text))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// In-memory conversation about one application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    context: String,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            history: Vec::new(),
        }
    }

    pub fn for_appraisal(appraisal: &LoanAppraisal, customer_name: Option<&str>) -> Self {
        Self::new(format!(
            "You are a bank lending advisor. Application details:\n\n{}\n\
             Answer briefly and professionally.",
            render_metrics_summary(appraisal, customer_name)
        ))
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Ask a question. A blank question is ignored (`Ok(None)`). On failure
    /// the error is also recorded as an assistant turn so the transcript
    /// shows what happened.
    pub fn ask(
        &mut self,
        generator: &dyn NarrativeGenerator,
        question: &str,
    ) -> Result<Option<String>, NarrativeError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }

        let prompt = self.prompt_for(question);
        self.push(ChatRole::User, question);

        match generator.generate(&prompt) {
            Ok(answer) => {
                self.push(ChatRole::Assistant, &answer);
                Ok(Some(answer))
            }
            Err(e) => {
                self.push(ChatRole::Assistant, &format!("Error: {e}"));
                Err(e)
            }
        }
    }

    fn prompt_for(&self, question: &str) -> String {
        let mut prompt = self.context.clone();
        if !self.history.is_empty() {
            prompt.push_str("\n\nConversation so far:\n");
            for turn in &self.history {
                let who = match turn.role {
                    ChatRole::User => "User",
                    ChatRole::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{who}: {}\n", turn.content));
            }
        }
        prompt.push_str(&format!("\n\nQuestion: {question}"));
        prompt
    }

    fn push(&mut self, role: ChatRole, content: &str) {
        self.history.push(ChatTurn {
            role,
            content: content.to_string(),
        });
    }
}
