//! `IDataLoader` — the external collaborator that supplies raw bar data.
//! Raw-bar ingestion itself (credentials, S3, HTTP) is out of scope (§1);
//! only the boundary trait is specified here (§6).

use std::collections::HashMap;

use polars::prelude::DataFrame;

use crate::error::PipelineError;
use crate::types::Asset;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataCategory {
    Spot,
    Future,
}

/// Blocking data loader boundary (§6 `IDataLoader`).
pub trait DataLoader {
    /// Populates and returns the loader's internal store. Blocking: the
    /// orchestrator treats this call synchronously even if the loader
    /// parallelizes internally (§5).
    fn load_data(&mut self) -> Result<(), PipelineError>;

    fn stored_data(&self) -> HashMap<Asset, DataFrame>;

    fn data_category(&self) -> DataCategory;

    fn assets(&self) -> Vec<Asset>;

    /// An optional benchmark series (e.g. a market index) exposed
    /// read-through from `Database::GetBenchmark` (§6 exposed interface).
    fn benchmark(&self) -> Option<DataFrame> {
        None
    }
}
