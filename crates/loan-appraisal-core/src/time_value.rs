use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;

use crate::error::LoanAppraisalError;
use crate::types::{Money, Rate};
use crate::LoanAppraisalResult;

/// Compound growth factor (1 + rate)^nper.
///
/// Integer periods use repeated multiplication, so the factor is exact to
/// decimal precision instead of going through exp/ln.
pub fn compound_factor(rate: Rate, nper: u32) -> LoanAppraisalResult<Decimal> {
    (Decimal::ONE + rate)
        .checked_powu(u64::from(nper))
        .ok_or_else(|| {
            LoanAppraisalError::NumericInstability(format!(
                "(1 + {rate})^{nper} exceeds decimal range"
            ))
        })
}

/// Payment (PMT), spreadsheet sign convention: a positive present value
/// yields a negative payment.
pub fn pmt(rate: Rate, nper: u32, present_value: Money, future_value: Money) -> LoanAppraisalResult<Money> {
    if nper == 0 {
        return Err(LoanAppraisalError::InvalidInput {
            field: "nper".into(),
            reason: "Number of periods must be > 0".into(),
        });
    }

    let overflow = || {
        LoanAppraisalError::NumericInstability(format!(
            "PMT for {present_value} over {nper} periods exceeds decimal range"
        ))
    };

    if rate.is_zero() {
        return present_value
            .checked_add(future_value)
            .and_then(|v| v.checked_div(Decimal::from(nper)))
            .map(|v| -v)
            .ok_or_else(overflow);
    }

    let factor = compound_factor(rate, nper)?;
    let annuity_factor = factor
        .checked_sub(Decimal::ONE)
        .and_then(|f| f.checked_div(rate))
        .ok_or_else(overflow)?;

    if annuity_factor.is_zero() {
        return Err(LoanAppraisalError::DivisionByZero {
            context: "PMT annuity factor".into(),
        });
    }

    present_value
        .checked_mul(factor)
        .and_then(|v| v.checked_add(future_value))
        .and_then(|v| v.checked_div(annuity_factor))
        .map(|v| -v)
        .ok_or_else(overflow)
}

/// Level instalment that fully repays `principal` over `nper` periods,
/// returned as a positive amount.
pub fn annuity_payment(rate: Rate, nper: u32, principal: Money) -> LoanAppraisalResult<Money> {
    Ok(-pmt(rate, nper, principal, Decimal::ZERO)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pmt_basic() {
        // 100,000 over 12 periods at 1%: ~8,884.88
        let result = pmt(dec!(0.01), 12, dec!(100_000), dec!(0)).unwrap();
        assert!((result - dec!(-8884.88)).abs() < dec!(0.01));
    }

    #[test]
    fn test_pmt_zero_rate() {
        let result = pmt(dec!(0), 4, dec!(1000), dec!(0)).unwrap();
        assert_eq!(result, dec!(-250));
    }

    #[test]
    fn test_pmt_zero_periods() {
        assert!(pmt(dec!(0.01), 0, dec!(1000), dec!(0)).is_err());
    }

    #[test]
    fn test_annuity_payment_is_positive() {
        let result = annuity_payment(dec!(0.01), 12, dec!(100_000_000)).unwrap();
        assert!(result > Decimal::ZERO);
        assert!((result - dec!(8_884_878.79)).abs() < dec!(0.01));
    }

    #[test]
    fn test_compound_factor_exact() {
        assert_eq!(compound_factor(dec!(0.1), 2).unwrap(), dec!(1.21));
        assert_eq!(compound_factor(dec!(0.05), 0).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_compound_factor_overflow() {
        let err = compound_factor(dec!(9), 1000).unwrap_err();
        assert!(matches!(err, LoanAppraisalError::NumericInstability(_)));
    }

    #[test]
    fn test_pmt_principal_beyond_range() {
        // (1.025)^480 fits, principal * factor does not
        let principal = dec!(1_000_000_000_000_000_000_000_000);
        let err = annuity_payment(dec!(0.025), 480, principal).unwrap_err();
        assert!(matches!(err, LoanAppraisalError::NumericInstability(_)));
    }
}
