pub mod config;
pub mod error;
pub mod lending;
pub mod time_value;
pub mod types;

pub use config::AppraisalConfig;
pub use error::LoanAppraisalError;
pub use types::*;

/// Standard result type for all loan-appraisal operations
pub type LoanAppraisalResult<T> = Result<T, LoanAppraisalError>;
