pub mod result;
pub mod status;

pub use result::{CaseResult, FailureDetail, FailureReason, SuiteSummary};
pub use status::TestStatus;
