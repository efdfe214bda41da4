use thiserror::Error;

/// GPU initialisation, resource, and dispatch errors.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No suitable adapter/device was found. Hard failure: no retry, no
    /// fallback to a lesser device.
    #[error("GPU unavailable: {0}")]
    Unavailable(String),
    /// A resource request exceeded the negotiated device limits.
    #[error("GPU limit exceeded: {0}")]
    LimitExceeded(String),
    /// Any other internal GPU-side error (shader compile, mapping failure).
    #[error("GPU error: {0}")]
    Internal(String),
}
