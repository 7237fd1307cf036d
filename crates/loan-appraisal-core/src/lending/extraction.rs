//! Best-effort field extraction from the text of a loan application.
//!
//! The patterns follow the Vietnamese loan-plan template ("Họ và tên:",
//! "Vốn vay ... số tiền: 1.000.000.000 đồng", ...) with English
//! alternates. Amounts use `.` for thousands and `,` for decimals. A field
//! whose label is missing or whose value does not parse is left as `None`;
//! nothing is guessed.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use super::amortization::AmortisationPolicy;
use super::appraisal::LoanAppraisalInput;
use crate::error::LoanAppraisalError;
use crate::types::*;
use crate::LoanAppraisalResult;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub national_id: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialInfo {
    pub total_need: Option<Money>,
    pub equity: Option<Money>,
    pub loan_amount: Option<Money>,
    pub annual_rate_pct: Option<Decimal>,
    pub term_months: Option<u32>,
    pub purpose: Option<String>,
    pub monthly_income: Option<Money>,
    pub monthly_expense: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollateralInfo {
    pub kind: Option<String>,
    pub value: Option<Money>,
    pub address: Option<String>,
    pub land_area_sqm: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedApplication {
    pub customer: CustomerInfo,
    pub financials: FinancialInfo,
    pub collateral: CollateralInfo,
}

impl ExtractedApplication {
    /// Convert to an appraisal input. Missing amounts become zero, which the
    /// appraisal reports as insufficient input rather than computing on.
    pub fn to_appraisal_input(&self, policy: Option<AmortisationPolicy>) -> LoanAppraisalInput {
        let f = &self.financials;
        LoanAppraisalInput {
            principal: f.loan_amount.unwrap_or_default(),
            annual_rate_pct: f.annual_rate_pct.unwrap_or_default(),
            term_months: f.term_months.unwrap_or_default(),
            monthly_income: f.monthly_income.unwrap_or_default(),
            monthly_expense: f.monthly_expense.unwrap_or_default(),
            policy,
            disbursement_date: None,
            collateral_value: self.collateral.value,
            total_need: f.total_need,
            equity: f.equity,
        }
    }

    /// Names of the fields an appraisal cannot run without.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let f = &self.financials;
        let mut missing = Vec::new();
        if f.loan_amount.is_none() {
            missing.push("loan_amount");
        }
        if f.annual_rate_pct.is_none() {
            missing.push("annual_rate_pct");
        }
        if f.term_months.is_none() {
            missing.push("term_months");
        }
        if f.monthly_income.is_none() {
            missing.push("monthly_income");
        }
        missing
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

struct Patterns {
    name: Regex,
    national_id: Regex,
    residence: Regex,
    phone: Regex,
    email: Regex,
    total_need: Regex,
    equity: Regex,
    loan_amount: Regex,
    interest_rate: Regex,
    term: Regex,
    purpose: Regex,
    income: [Regex; 3],
    expense: Regex,
    collateral_kind: Regex,
    collateral_value: [Regex; 3],
    collateral_address: Regex,
    land_area: Regex,
}

// Patterns are literals; every one is compiled by the tests below.
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("extraction pattern must compile")
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        name: re(r"(?:Họ và tên|Full name):\s*([^\n\r-]+)"),
        national_id: re(r"(?:(?:CMND/)?CCCD(?:/hộ chiếu)?|National ID):\s*(\d+)"),
        residence: re(r"(?:Nơi cư trú|Residence):\s*([^\n\r]+)"),
        phone: re(r"(?:Số điện thoại|Phone):\s*(\d+)"),
        email: re(r"Email:\s*(\S+)"),
        total_need: re(r"(?:Tổng nhu cầu vốn|Total capital need):\s*([\d.,]+)\s*(?:đồng|VND)"),
        equity: re(r"(?:Vốn đối ứng|Equity contribution)[^:]*:\s*([\d.,]+)\s*(?:đồng|VND)"),
        loan_amount: re(r"(?:Vốn vay[^:]*số tiền|Loan amount):\s*([\d.,]+)\s*(?:đồng|VND)"),
        interest_rate: re(r"(?:Lãi suất|Interest rate):\s*([\d.,]+)\s*%"),
        term: re(r"(?:Thời hạn vay|Loan term):\s*(\d+)\s*(?:tháng|months?)"),
        purpose: re(r"(?:Mục đích vay|Loan purpose):\s*([^\n\r]+)"),
        income: [
            re(r"Tổng thu nhập[^:]*:\s*([\d.,]+)\s*đồng"),
            re(r"Thu nhập[^:]*:\s*([\d.,]+)\s*đồng/tháng"),
            re(r"Monthly income[^:\n]*:\s*([\d.,]+)"),
        ],
        expense: re(r"(?:Tổng chi phí hàng tháng|Total monthly expenses?):\s*([\d.,]+)"),
        collateral_kind: re(r"(?:Tài sản|Asset) \d+:\s*([^\n\r.]+)"),
        collateral_value: [
            re(r"Giá trị:\s*([\d.,]+)\s*đồng"),
            re(r"Giá trị[^:]*:\s*([\d.,]+)\s*đồng"),
            re(r"[Vv]alue[^:\n]*:\s*([\d.,]+)\s*(?:VND|đồng)"),
        ],
        collateral_address: re(r"(?:Địa chỉ|Address):\s*([^\n\r]+?)(?:Diện tích|Giấy|Tỷ lệ|\n|$)"),
        land_area: re(r"(?:Diện tích đất|Land area):\s*([\d.,]+)\s*m"),
    })
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse an amount written with `.` thousands and `,` decimal separators
/// ("1.250.000,5" -> 1250000.5).
pub fn parse_localized_amount(text: &str) -> Option<Decimal> {
    let normalised: String = text
        .trim()
        .trim_end_matches('.')
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&normalised).ok()
}

/// Parse a percentage where `,` or `.` may be the decimal separator.
pub fn parse_rate(text: &str) -> Option<Decimal> {
    Decimal::from_str(&text.trim().replace(',', ".")).ok()
}

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn capture_string(re: &Regex, text: &str) -> Option<String> {
    capture(re, text).map(str::to_string)
}

fn capture_amount(re: &Regex, text: &str) -> Option<Money> {
    capture(re, text).and_then(parse_localized_amount)
}

/// First pattern that both matches and parses wins.
fn first_amount(res: &[Regex], text: &str) -> Option<Money> {
    res.iter().find_map(|re| capture_amount(re, text))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Pull every recognisable field out of `text`.
pub fn extract_fields(text: &str) -> ExtractedApplication {
    let p = patterns();

    let customer = CustomerInfo {
        name: capture_string(&p.name, text),
        national_id: capture_string(&p.national_id, text),
        address: capture_string(&p.residence, text),
        phone: capture_string(&p.phone, text),
        email: capture_string(&p.email, text),
    };

    let financials = FinancialInfo {
        total_need: capture_amount(&p.total_need, text),
        equity: capture_amount(&p.equity, text),
        loan_amount: capture_amount(&p.loan_amount, text),
        annual_rate_pct: capture(&p.interest_rate, text).and_then(parse_rate),
        term_months: capture(&p.term, text).and_then(|s| s.parse().ok()),
        purpose: capture_string(&p.purpose, text),
        monthly_income: first_amount(&p.income, text),
        monthly_expense: capture_amount(&p.expense, text),
    };

    let collateral = CollateralInfo {
        kind: capture_string(&p.collateral_kind, text),
        value: first_amount(&p.collateral_value, text),
        address: capture_string(&p.collateral_address, text),
        land_area_sqm: capture_amount(&p.land_area, text),
    };

    ExtractedApplication {
        customer,
        financials,
        collateral,
    }
}

/// Extract fields and wrap them in the standard output envelope, with a
/// warning for each field an appraisal requires but the text did not yield.
pub fn extract_loan_application(
    text: &str,
) -> LoanAppraisalResult<ComputationOutput<ExtractedApplication>> {
    let start = Instant::now();
    if text.trim().is_empty() {
        return Err(LoanAppraisalError::Extraction("document is empty".into()));
    }
    let extracted = extract_fields(text);

    let warnings: Vec<String> = extracted
        .missing_required()
        .into_iter()
        .map(|field| format!("Field '{field}' not found in document"))
        .collect();

    tracing::debug!(
        chars = text.len(),
        missing = warnings.len(),
        "loan application fields extracted"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Pattern-based loan application field extraction",
        &serde_json::json!({
            "thousands_separator": ".",
            "decimal_separator": ",",
        }),
        warnings,
        elapsed,
        extracted,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const VI_SAMPLE: &str = "\
PHƯƠNG ÁN SỬ DỤNG VỐN
Họ và tên: Nguyễn Văn An
CCCD: 001087012345
Nơi cư trú: 12 Trần Hưng Đạo, Hoàn Kiếm, Hà Nội
Số điện thoại: 0912345678
Email: an.nguyen@example.com
Mục đích vay: Mở rộng xưởng sản xuất
Tổng nhu cầu vốn: 1.500.000.000 đồng
Vốn đối ứng của khách hàng: 500.000.000 đồng
Vốn vay Ngân hàng số tiền: 1.000.000.000 đồng
Lãi suất: 8,5%/năm
Thời hạn vay: 60 tháng
Tổng thu nhập hàng tháng: 80.000.000 đồng
Tổng chi phí hàng tháng: 30.000.000 đồng
Tài sản 1: Quyền sử dụng đất và nhà ở. Giấy chứng nhận số AB123
Giá trị: 2.000.000.000 đồng
Địa chỉ: 45 Lê Lợi, Hải Châu, Đà Nẵng
Diện tích đất: 120,5 m2
";

    #[test]
    fn test_parse_localized_amount() {
        assert_eq!(parse_localized_amount("1.000.000.000"), Some(dec!(1_000_000_000)));
        assert_eq!(parse_localized_amount("1.250.000,5"), Some(dec!(1_250_000.5)));
        assert_eq!(parse_localized_amount("120,5"), Some(dec!(120.5)));
        assert_eq!(parse_localized_amount("500.000."), Some(dec!(500_000)));
        assert_eq!(parse_localized_amount(""), None);
        assert_eq!(parse_localized_amount(",,"), None);
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("8,5"), Some(dec!(8.5)));
        assert_eq!(parse_rate("12.25"), Some(dec!(12.25)));
        assert_eq!(parse_rate("x"), None);
    }

    #[test]
    fn test_extract_vietnamese_template() {
        let app = extract_fields(VI_SAMPLE);

        assert_eq!(app.customer.name.as_deref(), Some("Nguyễn Văn An"));
        assert_eq!(app.customer.national_id.as_deref(), Some("001087012345"));
        assert_eq!(app.customer.phone.as_deref(), Some("0912345678"));
        assert_eq!(app.customer.email.as_deref(), Some("an.nguyen@example.com"));

        let f = &app.financials;
        assert_eq!(f.total_need, Some(dec!(1_500_000_000)));
        assert_eq!(f.equity, Some(dec!(500_000_000)));
        assert_eq!(f.loan_amount, Some(dec!(1_000_000_000)));
        assert_eq!(f.annual_rate_pct, Some(dec!(8.5)));
        assert_eq!(f.term_months, Some(60));
        assert_eq!(f.purpose.as_deref(), Some("Mở rộng xưởng sản xuất"));
        assert_eq!(f.monthly_income, Some(dec!(80_000_000)));
        assert_eq!(f.monthly_expense, Some(dec!(30_000_000)));

        let c = &app.collateral;
        assert_eq!(c.kind.as_deref(), Some("Quyền sử dụng đất và nhà ở"));
        assert_eq!(c.value, Some(dec!(2_000_000_000)));
        assert_eq!(c.address.as_deref(), Some("45 Lê Lợi, Hải Châu, Đà Nẵng"));
        assert_eq!(c.land_area_sqm, Some(dec!(120.5)));

        assert!(app.missing_required().is_empty());
    }

    #[test]
    fn test_extract_english_alternates() {
        let text = "Full name: Jane Doe\nLoan amount: 250.000.000 VND\n\
                    Interest rate: 10%\nLoan term: 24 months\n\
                    Monthly income (household): 40.000.000\n\
                    Asset 1: Apartment\nCollateral value: 600.000.000 VND\n";
        let app = extract_fields(text);
        assert_eq!(app.customer.name.as_deref(), Some("Jane Doe"));
        assert_eq!(app.financials.loan_amount, Some(dec!(250_000_000)));
        assert_eq!(app.financials.annual_rate_pct, Some(dec!(10)));
        assert_eq!(app.financials.term_months, Some(24));
        assert_eq!(app.financials.monthly_income, Some(dec!(40_000_000)));
        assert_eq!(app.collateral.kind.as_deref(), Some("Apartment"));
        assert_eq!(app.collateral.value, Some(dec!(600_000_000)));
    }

    #[test]
    fn test_missing_fields_warn() {
        let out = extract_loan_application("Họ và tên: Trần Thị B\n").unwrap();
        assert_eq!(out.result.customer.name.as_deref(), Some("Trần Thị B"));
        assert_eq!(out.warnings.len(), 4);

        let input = out.result.to_appraisal_input(None);
        assert_eq!(input.principal, Decimal::ZERO);
        assert_eq!(input.term_months, 0);
    }

    #[test]
    fn test_blank_document_is_rejected() {
        let err = extract_loan_application("  \n\t").unwrap_err();
        assert!(matches!(err, LoanAppraisalError::Extraction(_)));
    }

    #[test]
    fn test_extracted_input_appraises() {
        let input = extract_fields(VI_SAMPLE).to_appraisal_input(Some(AmortisationPolicy::EqualPrincipal));
        let appraisal = crate::lending::appraisal::appraise_loan(&input)
            .unwrap()
            .result
            .unwrap();
        assert_eq!(appraisal.ltv_pct, Some(dec!(50)));
        assert_eq!(appraisal.schedule.len(), 60);
    }
}
