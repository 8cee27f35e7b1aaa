use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Runtime library not found: {0}")]
    ResourceNotFound(String),

    #[error("Runtime creation failed: {0}")]
    InitializationFailure(String),

    #[error("Bridge failure: {0}")]
    BridgeFailure(String),

    #[error("{entry} raised {fault}")]
    RuntimeFault { entry: String, fault: Fault },

    #[error("{entry} returned false")]
    Rejected { entry: String },

    #[error("Event code {0} is outside the defined set")]
    InvalidEvent(u32),

    #[error("Title {0} does not fit the hosted loader's int parameter")]
    InvalidTitle(u32),

    #[error("Invalid disc identity: {0}")]
    InvalidIdentity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Jni(#[from] jni::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the hosted program itself raised during the call.
    pub fn is_fault(&self) -> bool {
        matches!(self, BridgeError::RuntimeFault { .. })
    }
}

/// Description of a fault raised inside the hosted program.
///
/// The fault itself has already been cleared from the runtime by the time
/// this value exists; only its text survives for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub description: String,
}

impl Fault {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}
