use crate::result::AnalysisError;

/// A deterministic analysis unit over a snapshot.
///
/// Inputs are provided by callers (infra runners); this crate stays storage-agnostic.
pub trait AnalysisJob: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    /// Stable name for logs.
    fn name(&self) -> &'static str;

    /// The snapshot the job runs over.
    fn input(&self) -> &Self::Input;

    /// Execute the analysis.
    ///
    /// Must not mutate domain state.
    fn run(&self) -> Result<Self::Output, AnalysisError>;
}
