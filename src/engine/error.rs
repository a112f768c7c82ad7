use crate::model::Minutes;

#[derive(Debug)]
pub enum EngineError {
    MissingField(&'static str),
    InvalidNumber {
        field: &'static str,
        value: String,
    },
    BeyondHorizon {
        arrival: Minutes,
        horizon: Minutes,
    },
    UnknownStage(String),
    UnknownPatientType(String),
    InvalidDomain(String),
    LimitExceeded(&'static str),
    WalError(String),
    Orchestrator(String),
}

impl EngineError {
    /// Input errors are the caller's fault and leave state untouched.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::MissingField(_)
                | EngineError::InvalidNumber { .. }
                | EngineError::BeyondHorizon { .. }
                | EngineError::UnknownStage(_)
                | EngineError::UnknownPatientType(_)
                | EngineError::LimitExceeded(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::MissingField(field) => write!(f, "missing field: {field}"),
            EngineError::InvalidNumber { field, value } => {
                write!(f, "field {field} is not a number: {value:?}")
            }
            EngineError::BeyondHorizon { arrival, horizon } => write!(
                f,
                "arrival {arrival} is beyond the simulation horizon {horizon}"
            ),
            EngineError::UnknownStage(name) => write!(f, "unknown stage: {name}"),
            EngineError::UnknownPatientType(t) => write!(f, "patient type not valid: {t}"),
            EngineError::InvalidDomain(msg) => write!(f, "invalid domain configuration: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Orchestrator(e) => write!(f, "orchestrator error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
