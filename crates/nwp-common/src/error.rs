//! Parse errors for the identifier types.

use thiserror::Error;

/// Errors produced when parsing model runs, variables and lead times.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid model run '{0}': expected YYYYMMDDHH")]
    InvalidRunFormat(String),

    #[error("Invalid model run date: {0}")]
    InvalidRunDate(String),

    #[error("Invalid cycle hour: {0}")]
    InvalidCycle(u32),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown derived product: {0}")]
    UnknownProduct(String),

    #[error("Invalid lead time: {0}")]
    InvalidLeadTime(String),
}
