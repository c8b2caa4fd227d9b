//! Data-flow execution engine: loads bar data, resamples it across the
//! declared timeframes, runs the compiled transform graph, and builds the
//! timestamp inverted index that drives event dispatch (§4.9-§4.11, §6).
//!
//! Grounded in `original_source/data/database/database_impl.h`/`.cpp`
//! (`DatabaseImpl`'s `RunPipeline`/`RefreshPipeline`/`CompletePipeline`),
//! `resample.h`/`.cpp` (§4.10), and the inversion loop in
//! `GetTimestampIndexMapping`/`CompletePipeline` (§4.11).

pub mod executor;
pub mod index;
pub mod orchestrator;
pub mod resampler;

pub use executor::{GeneratedEventMarkers, GeneratedReports, StringKeyedTables, TransformExecutor};
pub use index::{build_timestamp_index, handle_data, timestamp_row_ranges, RowRange, TimestampIndex};
pub use orchestrator::Orchestrator;
pub use resampler::{DefaultResampler, Resampler};
