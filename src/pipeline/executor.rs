//! `IDataFlowOrchestrator` — the external transform executor (§6). Runs the
//! compiled graph against string-id-keyed tables; the numerics behind each
//! transform kind are delegated entirely to this collaborator (§1).
//!
//! Grounded in `original_source/data/database/database_impl.cpp`'s
//! `TransformBarData`, which calls `m_dataTransform->ExecutePipeline(...)`
//! on a `timeframe -> asset_id -> table` map and reads back
//! `GetGeneratedReports`/`GetGeneratedEventMarkers` afterwards.

use std::collections::HashMap;

use polars::prelude::DataFrame;

use crate::error::PipelineError;
use crate::types::{CompiledProgram, Timeframe};

/// One opaque report or event-marker payload produced by a transform's
/// side effects (§1 "reporting/tear-sheet generation" is out of scope —
/// these are passed through, not interpreted).
pub type GeneratedReports = HashMap<String, serde_json::Value>;
pub type GeneratedEventMarkers = HashMap<String, serde_json::Value>;

/// String-id-keyed bar tables, the shape the executor actually consumes
/// (§4.9 step 4 "Convert asset-keyed maps to string-id-keyed maps").
pub type StringKeyedTables = HashMap<Timeframe, HashMap<String, DataFrame>>;

/// The compiled-graph executor boundary (§6 `IDataFlowOrchestrator`).
pub trait TransformExecutor {
    /// Executes `program` against `data`, honoring topological order, and
    /// returns a table per `(timeframe, asset_id)` carrying every declared
    /// output column alongside the input OHLCV columns.
    ///
    /// The returned map's asset-id key set must be a superset of the
    /// input's for every timeframe; the orchestrator raises
    /// `PipelineError::AssetKeyLost` if an id present in `data` is missing
    /// from the result (§9 open question: "a lost asset id must raise").
    fn execute_pipeline(
        &mut self,
        program: &CompiledProgram,
        data: StringKeyedTables,
    ) -> Result<StringKeyedTables, PipelineError>;

    fn generated_reports(&self) -> GeneratedReports {
        GeneratedReports::new()
    }

    fn generated_event_markers(&self) -> GeneratedEventMarkers {
        GeneratedEventMarkers::new()
    }
}
