use thiserror::Error;

/// Failures surfaced to consumers of the analytics layer. Individual source
/// failures never show up here; they degrade to zero values instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("Authentication required - sign in again to load statistics")]
    AuthenticationRequired,

    #[error("Failed to load statistics: {0}")]
    BatchFailed(String),
}
