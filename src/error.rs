use thiserror::Error;

/// Engine error taxonomy.
///
/// Guardrail breaches are deliberately absent: they are data, captured in
/// the guardrail report with a severity, and never abort a run. Numeric
/// failures inside metric computation are handled locally (the metric is
/// reported as absent with a diagnostic) and only surface here when a stage
/// cannot produce its primary output at all.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    #[error("invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("data unavailable: {entity} `{key}` not found in catalogue")]
    DataUnavailable { entity: &'static str, key: String },

    #[error("numeric failure in {context}: {message}")]
    NumericFailure { context: &'static str, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SimError {
    pub fn config(message: impl Into<String>) -> Self {
        SimError::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn missing(entity: &'static str, key: impl Into<String>) -> Self {
        SimError::DataUnavailable {
            entity,
            key: key.into(),
        }
    }

    pub fn numeric(context: &'static str, message: impl Into<String>) -> Self {
        SimError::NumericFailure {
            context,
            message: message.into(),
        }
    }

    /// Machine-readable kind tag, carried on error events.
    pub fn kind(&self) -> &'static str {
        match self {
            SimError::ConfigInvalid { .. } => "config_invalid",
            SimError::DataUnavailable { .. } => "data_unavailable",
            SimError::NumericFailure { .. } => "numeric_failure",
            SimError::Cancelled => "cancelled",
            SimError::Internal(_) => "internal",
        }
    }
}

