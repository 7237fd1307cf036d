pub mod amortization;
pub mod appraisal;

#[cfg(feature = "extraction")]
pub mod extraction;

#[cfg(feature = "narrative")]
pub mod narrative;
