use thiserror::Error;

/// Main error type for the DSPy optimizer workspace
#[derive(Error, Debug)]
pub enum DspyError {
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Program error: {0}")]
    Program(#[from] ProgramError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a single module invocation or derivation
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Missing input field: {field}")]
    MissingInput { field: String },
}

/// Errors raised while introspecting or rewriting a program
#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("Module not found: {name}")]
    ModuleNotFound { name: String },

    #[error("Program exposes no modules")]
    NoModules,

    #[error("Program forward pass failed: {message}")]
    ForwardFailed { message: String },
}

/// Optimizer-related errors
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Unsupported acquisition function: {name}")]
    UnsupportedAcquisition { name: String },

    #[error("Unsupported demonstration selection strategy: {name}")]
    UnsupportedDemoStrategy { name: String },

    #[error("Unsupported instruction style: {name}")]
    UnsupportedInstructionStyle { name: String },

    #[error("Unknown objective: {name}")]
    UnknownObjective { name: String },

    #[error("Invalid optimizer configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Training set is empty")]
    EmptyTrainset,

    #[error("Validation set is empty")]
    EmptyValset,

    #[error("Evaluation of candidate {candidate_id} failed: {message}")]
    EvaluationFailed { candidate_id: String, message: String },
}

/// Result type alias for DSPy operations
pub type DspyResult<T> = Result<T, DspyError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::DspyError::Internal(format!($($arg)*))
    };
}
