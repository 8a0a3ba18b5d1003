use thiserror::Error;

use crate::gpu::BackendError;
use crate::scene::LayerId;

/// Failures surfaced by the rendering core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphicsError {
    /// A caller-supplied value is out of range (negative or non-finite sizes, cyclic parenting).
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// The backend could not allocate a texture or render target.
    #[error("GPU resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The layer was disposed; its id no longer refers to a live layer.
    #[error("layer {0:?} used after dispose")]
    UseAfterDispose(LayerId),

    /// A pattern's backing image changed after the pattern was created.
    #[error("pattern image changed after the pattern was created")]
    StaleResource,

    /// Terminal: every layer and resource must be rebuilt on a new context.
    #[error("GPU context lost: {0}")]
    ContextLost(String),
}

pub type Result<T, E = GraphicsError> = std::result::Result<T, E>;

impl GraphicsError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument { name, reason: reason.into() }
    }
}

impl From<BackendError> for GraphicsError {
    fn from(err: BackendError) -> Self {
        if err.is_allocation_failure() {
            Self::ResourceExhausted(err.to_string())
        } else {
            Self::ContextLost(err.to_string())
        }
    }
}

/// Validates a logical dimension: zero is allowed, negative or non-finite is not.
pub(crate) fn check_dimension(name: &'static str, value: f32) -> Result<f32> {
    if !value.is_finite() {
        return Err(GraphicsError::invalid(name, format!("{value} is not finite")));
    }
    if value < 0.0 {
        return Err(GraphicsError::invalid(name, format!("{value} is negative")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_accepts_zero() {
        assert_eq!(check_dimension("width", 0.0), Ok(0.0));
    }

    #[test]
    fn dimension_rejects_negative_and_nan() {
        assert!(matches!(
            check_dimension("width", -1.0),
            Err(GraphicsError::InvalidArgument { name: "width", .. })
        ));
        assert!(check_dimension("height", f32::NAN).is_err());
    }

    #[test]
    fn backend_errors_map_by_kind() {
        let oom: GraphicsError = BackendError::OutOfMemory("budget".into()).into();
        assert!(matches!(oom, GraphicsError::ResourceExhausted(_)));

        let lost: GraphicsError = BackendError::Lost("reset".into()).into();
        assert!(matches!(lost, GraphicsError::ContextLost(_)));
    }
}
