use thiserror::Error;

pub type EpochFlowResult<T> = Result<T, EpochFlowError>;

#[derive(Debug, Error)]
pub enum EpochFlowError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised while compiling a strategy script. All of these abort the
/// compile on first occurrence; the spec requires no partial compilation be
/// returned.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("binding error: {0}")]
    Binding(String),

    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("option error on node '{node_id}' ({component}), option '{option_id}': {message}")]
    Option {
        node_id: String,
        component: String,
        option_id: String,
        message: String,
    },

    #[error("arity error: {0}")]
    Arity(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("SLOT resolution error: {0}")]
    SlotResolution(String),
}

/// Errors raised while running the compiled graph against bar data.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data loader failed: {0}")]
    DataLoaderFailure(String),

    #[error("resample failed for timeframe '{timeframe}': {message}")]
    ResampleFailure { timeframe: String, message: String },

    #[error("transform execution failed: {0}")]
    TransformFailure(String),

    #[error("transform executor dropped asset id '{0}' present in the input map")]
    AssetKeyLost(String),
}

/// Errors related to domain types, schemas, and tabular data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("non-UTC timestamp index is not supported: {0}")]
    NonUtcIndex(String),

    #[error("invalid timeframe string: '{0}'")]
    InvalidTimeframe(String),

    #[error("invalid asset string: '{0}'")]
    InvalidAsset(String),

    #[error("data frame error: {0}")]
    DataFrame(String),

    #[error("failed to parse integer: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("failed to parse float: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("failed to parse enum: {0}")]
    ParseEnum(#[from] strum::ParseError),

    #[error("failed to deserialize structured option: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors related to internal invariants, which should never surface to a
/// well-formed caller.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(String),

    #[error("missing internal field: {0}")]
    MissingField(String),
}
