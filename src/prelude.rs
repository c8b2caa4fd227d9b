// 1. Traits
pub use crate::continuations::FuturesContinuationConstructor;
pub use crate::loader::DataLoader;
pub use crate::pipeline::{Resampler, TransformExecutor};
pub use crate::websocket::WebSocketManager;

// 2. The Core Compiler Types
pub use crate::compiler::compile;
pub use crate::compiler::context::CompilationContext;
pub use crate::types::{AlgorithmNode, CompiledProgram, InputValue};

// 3. Financial Domain Types
pub use crate::types::{Asset, AssetClass, DataType, Scalar, Timeframe};
pub use crate::calendar::{Calendar, NyseSession};
pub use crate::continuations::{ContinuationAdjustment, DefaultContinuationConstructor, RolloverRule};
pub use crate::loader::DataCategory;

// 4. Pipeline Configurations
pub use crate::pipeline::{DefaultResampler, Orchestrator, RowRange, TimestampIndex};
pub use crate::pipeline::orchestrator::{OrchestratorOptions, TransformStage};

// 5. Errors
pub use crate::error::{
    CompileError, DataError, EpochFlowError, EpochFlowResult, PipelineError, SystemError,
};

// 6. Factories & Registries
pub use crate::registry::{builtin_operator_registry, TransformMetadata, TransformRegistry};
