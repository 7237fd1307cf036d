use loan_appraisal_core::lending::amortization::{
    AmortisationPolicy, LoanTerms, RepaymentRow, RepaymentSchedule,
};
use loan_appraisal_core::lending::appraisal::{
    appraise_loan, appraise_loan_with_config, calculate_credit_metrics, CashFlowProfile,
    LoanAppraisalInput,
};
use loan_appraisal_core::lending::extraction::extract_fields;
use loan_appraisal_core::lending::narrative::{
    analyze_metrics, ChatSession, FailoverGenerator, NarrativeError, RetryingGenerator,
};
use loan_appraisal_core::{AppraisalConfig, LoanAppraisalError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn sample_application() -> LoanAppraisalInput {
    LoanAppraisalInput {
        principal: dec!(1_000_000_000),
        annual_rate_pct: dec!(8.5),
        term_months: 60,
        monthly_income: dec!(80_000_000),
        monthly_expense: dec!(30_000_000),
        policy: Some(AmortisationPolicy::EqualPrincipal),
        disbursement_date: None,
        collateral_value: Some(dec!(1_600_000_000)),
        total_need: Some(dec!(1_500_000_000)),
        equity: Some(dec!(500_000_000)),
    }
}

// ===========================================================================
// Credit metrics
// ===========================================================================

#[test]
fn test_appraisal_one_billion_straight_line() {
    let out = appraise_loan(&sample_application()).unwrap();
    let a = out.result.unwrap();
    let m = &a.metrics;

    assert_eq!(m.monthly_principal.round_dp(2), dec!(16_666_666.67));
    assert_eq!(m.first_month_interest.round_dp(2), dec!(7_083_333.33));
    assert_eq!(m.first_month_payment.round_dp(2), dec!(23_750_000.00));
    assert_eq!(m.net_income, dec!(50_000_000));
    assert_eq!(m.surplus.round_dp(2), dec!(26_250_000.00));

    // DSR = 23.75M / 80M = 29.6875%
    assert_eq!(m.debt_service_ratio.round_dp(4), dec!(29.6875));
    // DSCR = 50M / 23.75M ≈ 2.105
    assert_eq!(m.dscr.round_dp(3), dec!(2.105));

    // Straight-line interest = P * r * (n + 1) / 2
    let expected_interest = dec!(1_000_000_000) * dec!(0.085) / dec!(12) * dec!(61) / dec!(2);
    assert!((m.total_interest - expected_interest).abs() < dec!(0.0001));
    assert_eq!(m.total_payment, dec!(1_000_000_000) + m.total_interest);

    assert_eq!(a.ltv_pct, Some(dec!(62.5)));
    assert_eq!(a.equity_ratio_pct.map(|r| r.round_dp(2)), Some(dec!(33.33)));
    assert!(a.assessment.concerns.is_empty());
}

#[test]
fn test_appraisal_annuity_uses_level_payment() {
    let mut input = sample_application();
    input.principal = dec!(100_000_000);
    input.annual_rate_pct = dec!(12);
    input.term_months = 12;
    input.policy = Some(AmortisationPolicy::EqualInstalment);

    let a = appraise_loan(&input).unwrap().result.unwrap();
    assert_eq!(a.metrics.first_month_payment.round_dp(0), dec!(8_884_879));
    assert_eq!(a.metrics.first_month_interest, dec!(1_000_000));
    assert_eq!(
        a.metrics.monthly_principal,
        a.metrics.first_month_payment - dec!(1_000_000)
    );
}

#[test]
fn test_ratios_default_to_zero_without_denominator() {
    let terms = LoanTerms::new(dec!(1000), dec!(0), 1);
    let schedule = RepaymentSchedule {
        policy: AmortisationPolicy::EqualPrincipal,
        rows: vec![RepaymentRow {
            month: 1,
            due_date: None,
            opening_balance: dec!(1000),
            principal: Decimal::ZERO,
            interest: Decimal::ZERO,
            payment: Decimal::ZERO,
            closing_balance: dec!(1000),
        }],
    };
    let cash_flow = CashFlowProfile {
        monthly_income: Decimal::ZERO,
        monthly_expense: dec!(10),
    };

    let m = calculate_credit_metrics(&terms, &cash_flow, &schedule)
        .unwrap()
        .unwrap();
    assert_eq!(m.debt_service_ratio, Decimal::ZERO);
    assert_eq!(m.dscr, Decimal::ZERO);
    assert_eq!(m.net_income, dec!(-10));
    assert_eq!(m.surplus, dec!(-10));
}

#[test]
fn test_appraisal_is_idempotent() {
    let input = sample_application();
    let first = appraise_loan(&input).unwrap().result;
    let second = appraise_loan(&input).unwrap().result;
    assert_eq!(first, second);
}

#[test]
fn test_non_positive_principal_gives_no_result() {
    let mut input = sample_application();
    input.principal = dec!(-1);
    let out = appraise_loan(&input).unwrap();
    assert!(out.result.is_none());
    assert!(out.warnings[0].contains("Insufficient input"));
}

#[test]
fn test_negative_rate_is_invalid_input() {
    let mut input = sample_application();
    input.annual_rate_pct = dec!(-0.5);
    let err = appraise_loan(&input).unwrap_err();
    assert!(matches!(err, LoanAppraisalError::InvalidInput { ref field, .. } if field == "annual_rate_pct"));
}

#[test]
fn test_stricter_thresholds_raise_concerns() {
    let mut config = AppraisalConfig::default();
    config.thresholds.min_dscr = dec!(2.5);
    config.thresholds.max_ltv_pct = dec!(60);
    let a = appraise_loan_with_config(&sample_application(), &config)
        .unwrap()
        .result
        .unwrap();
    assert!(!a.assessment.dscr_healthy);
    assert_eq!(a.assessment.ltv_within_limit, Some(false));
    assert_eq!(a.assessment.concerns.len(), 2);
}

#[test]
fn test_input_json_accepts_policy_alias() {
    let json = r#"{
        "principal": "100000000",
        "annual_rate_pct": "12",
        "term_months": 12,
        "monthly_income": "20000000",
        "policy": "B"
    }"#;
    let input: LoanAppraisalInput = serde_json::from_str(json).unwrap();
    assert_eq!(input.policy, Some(AmortisationPolicy::EqualInstalment));
    assert_eq!(input.monthly_expense, Decimal::ZERO);
    assert!(appraise_loan(&input).unwrap().result.is_some());
}

// ===========================================================================
// Document -> appraisal -> narrative
// ===========================================================================

const PLAN: &str = "\
Họ và tên: Lê Minh Châu
Vốn vay Ngân hàng số tiền: 600.000.000 đồng
Lãi suất: 9,6%/năm
Thời hạn vay: 36 tháng
Thu nhập từ kinh doanh: 45.000.000 đồng/tháng
Tổng chi phí hàng tháng: 15.000.000
";

#[test]
fn test_document_to_narrative_pipeline() {
    let extracted = extract_fields(PLAN);
    assert_eq!(extracted.financials.monthly_income, Some(dec!(45_000_000)));

    let input = extracted.to_appraisal_input(Some(AmortisationPolicy::EqualInstalment));
    let appraisal = appraise_loan(&input).unwrap().result.unwrap();
    assert_eq!(appraisal.schedule.len(), 36);
    assert_eq!(appraisal.ltv_pct, None);

    let provider = FailoverGenerator::new()
        .with_provider("primary", |_: &str| Err::<String, _>(NarrativeError::InvalidCredential))
        .with_provider("backup", |p: &str| {
            if p.contains("DSCR:") {
                Ok("Repayment capacity is adequate.".to_string())
            } else {
                Err(NarrativeError::Unavailable("unexpected prompt".into()))
            }
        });
    let generator = RetryingGenerator::new(
        provider,
        loan_appraisal_core::config::RetryPolicy::immediate(2),
    );

    let name = extracted.customer.name.as_deref();
    let analysis = analyze_metrics(&generator, &appraisal, name).unwrap();
    assert_eq!(analysis, "Repayment capacity is adequate.");

    let mut chat = ChatSession::for_appraisal(&appraisal, name);
    let answer = chat.ask(&generator, "What are the main risks?").unwrap();
    assert!(answer.is_some());
    assert_eq!(chat.history().len(), 2);
}
