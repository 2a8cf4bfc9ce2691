use thiserror::Error;

/// Main error type for Sedna
#[derive(Error, Debug)]
pub enum SednaError {
    #[error("Space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sample not found: {id} was not suggested by this session")]
    SampleNotFound { id: String },

    #[error("Sample already observed: {id}")]
    AlreadyObserved { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Search space errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("No space information held inside {type_name}")]
    NotFound { type_name: String },

    #[error("Invalid prior for {name}: `{prior}` ({message})")]
    InvalidPrior {
        name: String,
        prior: String,
        message: String,
    },

    #[error("Invalid bounds for {name}: {message}")]
    InvalidBounds { name: String, message: String },

    #[error("Dimension {name} is defined twice")]
    DuplicateDimension { name: String },

    #[error("Only one fidelity dimension is allowed, found {first} and {second}")]
    MultipleFidelities { first: String, second: String },
}

/// Optimization algorithm errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgorithmError {
    #[error("Unknown algorithm: {name} (available: {available})")]
    Unknown { name: String, available: String },

    #[error("Invalid configuration for {algorithm}: {message}")]
    InvalidConfig { algorithm: String, message: String },

    #[error("Invalid state for {algorithm}: {message}")]
    InvalidState { algorithm: String, message: String },

    #[error("Trial rejected by {algorithm}: {message}")]
    TrialRejected { algorithm: String, message: String },
}

/// Result type alias for Sedna operations
pub type SednaResult<T> = Result<T, SednaError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SednaError::Config(format!($($arg)*))
    };
}
