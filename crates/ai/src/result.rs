use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("invalid threshold {name}: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
}

/// Reject NaN/infinite thresholds and anything outside `range`.
pub(crate) fn check_threshold(
    name: &'static str,
    value: f64,
    range: core::ops::RangeInclusive<f64>,
) -> Result<(), AnalysisError> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(AnalysisError::InvalidThreshold { name, value })
    }
}
