//! `Database`/`IDatabaseImpl` — the pipeline orchestrator (§4.9, §6).
//!
//! Grounded in `original_source/data/database/database_impl.h`/`.cpp`:
//! `RunPipeline`/`RefreshPipeline`'s phase order, `CompletePipeline`'s
//! flatten-then-invert timestamp index build, `TransformBarData`'s
//! `EPOCH_MAX_TBB_THREADS`/`EPOCH_DISABLE_PARALLEL_REPORTS` thread-pool
//! sizing (mapped onto a dedicated `rayon::ThreadPool`, the crate's
//! concurrency primitive per §5), and `GenericMessageHandler`'s per-asset-
//! class websocket dispatch with a cached NYSE session guard.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use rayon::prelude::*;

use crate::calendar::NyseSession;
use crate::continuations::FuturesContinuationConstructor;
use crate::error::PipelineError;
use crate::loader::{DataCategory, DataLoader};
use crate::pipeline::executor::{GeneratedEventMarkers, GeneratedReports, StringKeyedTables, TransformExecutor};
use crate::pipeline::index::{self, RowRange, TimestampIndex};
use crate::pipeline::resampler::Resampler;
use crate::schema::CanonicalCol;
use crate::types::{Asset, AssetClass, CompiledProgram, Timeframe};
use crate::websocket::{BarMessage, BarMessageBatch, WebSocketManager};

/// `timeframe -> asset -> table` (§6 `GetTransformedData`).
pub type TransformedData = HashMap<Timeframe, HashMap<Asset, DataFrame>>;

/// The compiled graph and the collaborator that executes it. Bundled so
/// they are always present or absent together; `Orchestrator::transform_bar_data`
/// skips step 4 entirely when this is `None` (mirrors `m_dataTransform`
/// being a nullable shared pointer in the C++ original).
pub struct TransformStage {
    pub executor: Box<dyn TransformExecutor + Send>,
    pub program: CompiledProgram,
}

/// Construction-time wiring for an [`Orchestrator`] (§6 `DatabaseImplOptions`).
pub struct OrchestratorOptions {
    pub loader: Box<dyn DataLoader + Send>,
    pub base_timeframe: Timeframe,
    pub continuation_constructor: Option<Box<dyn FuturesContinuationConstructor + Send + Sync>>,
    pub resampler: Option<Box<dyn Resampler + Send + Sync>>,
    pub transform: Option<TransformStage>,
    pub websocket_managers: HashMap<AssetClass, Box<dyn WebSocketManager + Send>>,
}

/// Wires a data loader, an optional futures-continuation constructor, an
/// optional resampler, and an optional transform executor into the two
/// pipeline entry points `run_pipeline`/`refresh_pipeline` (§4.9, §6
/// `DatabaseImpl`).
pub struct Orchestrator {
    loader: Box<dyn DataLoader + Send>,
    base_timeframe: Timeframe,
    continuation_constructor: Option<Box<dyn FuturesContinuationConstructor + Send + Sync>>,
    resampler: Option<Box<dyn Resampler + Send + Sync>>,
    transform: Option<TransformStage>,
    websocket_managers: HashMap<AssetClass, Box<dyn WebSocketManager + Send>>,
    thread_pool: Option<rayon::ThreadPool>,

    loaded_bar_data: Arc<Mutex<HashMap<Asset, DataFrame>>>,
    nyse_session_cache: Arc<Mutex<Option<NyseSession>>>,
    transformed_data: TransformedData,
    timestamp_index: TimestampIndex,
    generated_reports: GeneratedReports,
    generated_event_markers: GeneratedEventMarkers,
}

impl Orchestrator {
    pub fn new(options: OrchestratorOptions) -> Self {
        Self {
            loader: options.loader,
            base_timeframe: options.base_timeframe,
            continuation_constructor: options.continuation_constructor,
            resampler: options.resampler,
            transform: options.transform,
            websocket_managers: options.websocket_managers,
            thread_pool: build_capped_thread_pool(),
            loaded_bar_data: Arc::new(Mutex::new(HashMap::new())),
            nyse_session_cache: Arc::new(Mutex::new(None)),
            transformed_data: TransformedData::new(),
            timestamp_index: TimestampIndex::new(),
            generated_reports: GeneratedReports::new(),
            generated_event_markers: GeneratedEventMarkers::new(),
        }
    }

    /// A fresh run: `LoadData` then the shared completion phases.
    pub fn run_pipeline(&mut self) -> Result<(), PipelineError> {
        self.load_data()?;
        self.complete_pipeline()
    }

    /// An online update: folds buffered websocket batches into the loaded
    /// bar data, then runs the same completion phases as `run_pipeline`.
    pub fn refresh_pipeline(&mut self) -> Result<(), PipelineError> {
        self.update_data()?;
        self.complete_pipeline()
    }

    pub fn get_transformed_data(&self) -> &TransformedData {
        &self.transformed_data
    }

    pub fn get_benchmark(&self) -> Option<DataFrame> {
        self.loader.benchmark()
    }

    pub fn get_assets(&self) -> Vec<Asset> {
        self.loader.assets()
    }

    pub fn get_data_category(&self) -> DataCategory {
        self.loader.data_category()
    }

    pub fn get_base_timeframe(&self) -> &Timeframe {
        &self.base_timeframe
    }

    pub fn get_timestamp_index(&self) -> &TimestampIndex {
        &self.timestamp_index
    }

    pub fn get_generated_reports(&self) -> &GeneratedReports {
        &self.generated_reports
    }

    pub fn get_generated_event_markers(&self) -> &GeneratedEventMarkers {
        &self.generated_event_markers
    }

    /// O(1) dispatch: calls `handler` once per `(timeframe, asset, row_range)`
    /// sharing `ts`, zero times on a miss (§4.11, §6 `HandleData`).
    pub fn handle_data<F>(&self, ts: i64, handler: F)
    where
        F: FnMut(&Timeframe, &Asset, RowRange, i64),
    {
        index::handle_data(&self.timestamp_index, ts, handler);
    }

    /// The `CONTRACT` column value of the base-timeframe continuation
    /// series for `asset` at `at`, or `None` if the asset, timestamp, or
    /// column is not found (§6 `GetFrontContract`).
    pub fn get_front_contract(&self, asset: &Asset, at: DateTime<Utc>) -> Option<String> {
        match self.try_get_front_contract(asset, at) {
            Ok(contract) => contract,
            Err(e) => {
                tracing::warn!(asset = asset.id(), error = %e, "failed to get front contract; returning None");
                None
            }
        }
    }

    fn try_get_front_contract(&self, asset: &Asset, at: DateTime<Utc>) -> Result<Option<String>, PipelineError> {
        let Some(table) = self
            .transformed_data
            .get(&self.base_timeframe)
            .and_then(|assets| assets.get(asset))
        else {
            return Ok(None);
        };

        let ts_col = CanonicalCol::Timestamp.name();
        let ts = table
            .column(&ts_col)
            .map_err(|e| PipelineError::TransformFailure(e.to_string()))?
            .datetime()
            .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
        let target = at.timestamp_micros();
        let Some(row) = ts.physical().into_iter().position(|v| v == Some(target)) else {
            return Ok(None);
        };

        let contract = table
            .column(&CanonicalCol::Contract.name())
            .map_err(|e| PipelineError::TransformFailure(e.to_string()))?
            .str()
            .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
        Ok(contract.get(row).map(str::to_string))
    }

    fn load_data(&mut self) -> Result<(), PipelineError> {
        tracing::debug!("starting data loading stage");
        self.loader.load_data()?;
        let mut loaded = self.loaded_bar_data.lock().expect("loaded_bar_data mutex poisoned");
        *loaded = self.loader.stored_data();
        tracing::debug!(assets = loaded.len(), "data loading stage completed");
        Ok(())
    }

    fn update_data(&mut self) -> Result<(), PipelineError> {
        if self.websocket_managers.is_empty() {
            tracing::warn!("no websocket managers to update data");
            return Ok(());
        }

        for (asset_class, manager) in self.websocket_managers.iter_mut() {
            let asset_class = *asset_class;
            let loaded = Arc::clone(&self.loaded_bar_data);
            let session_cache = Arc::clone(&self.nyse_session_cache);
            let error_slot: Arc<Mutex<Option<PipelineError>>> = Arc::new(Mutex::new(None));
            let error_slot_cb = Arc::clone(&error_slot);

            manager.handle_new_message(Box::new(move |batch: BarMessageBatch| {
                let messages = filter_for_market_hours(asset_class, batch.messages, &session_cache);
                let result = bar_messages_to_dataframe(&messages).and_then(|new_data| merge_new_bars(&loaded, new_data));
                if let Err(e) = result {
                    *error_slot_cb.lock().expect("error slot mutex poisoned") = Some(e);
                }
            }));

            if let Some(e) = error_slot.lock().expect("error slot mutex poisoned").take() {
                return Err(e);
            }
        }
        Ok(())
    }

    fn append_futures_continuations(&mut self) -> Result<(), PipelineError> {
        let Some(constructor) = &self.continuation_constructor else {
            return Ok(());
        };
        let mut loaded = self.loaded_bar_data.lock().expect("loaded_bar_data mutex poisoned");
        let built = constructor.build(&loaded)?;
        for (asset, df) in built {
            loaded.insert(asset, df);
        }
        Ok(())
    }

    fn resample_bar_data(&self) -> Result<TransformedData, PipelineError> {
        let loaded = self.loaded_bar_data.lock().expect("loaded_bar_data mutex poisoned").clone();
        let mut result = TransformedData::new();
        result.insert(self.base_timeframe.clone(), loaded.clone());

        if let Some(resampler) = &self.resampler {
            tracing::debug!("starting resampling stage");
            for (tf, asset, df) in resampler.build(&loaded)? {
                result.entry(tf).or_default().insert(asset, df);
            }
        } else {
            tracing::info!("resampling stage skipped");
        }
        Ok(result)
    }

    fn transform_bar_data(&mut self, data: TransformedData) -> Result<TransformedData, PipelineError> {
        let Some(stage) = &mut self.transform else {
            tracing::info!("data transformation stage skipped");
            return Ok(data);
        };

        let mut asset_id_to_asset: HashMap<String, Asset> = HashMap::new();
        let mut input_ids: HashMap<Timeframe, HashSet<String>> = HashMap::new();
        let mut string_keyed: StringKeyedTables = StringKeyedTables::new();
        for (tf, asset_map) in &data {
            let mut inner = HashMap::new();
            let mut ids = HashSet::new();
            for (asset, df) in asset_map {
                asset_id_to_asset.insert(asset.id().to_string(), asset.clone());
                ids.insert(asset.id().to_string());
                inner.insert(asset.id().to_string(), df.clone());
            }
            input_ids.insert(tf.clone(), ids);
            string_keyed.insert(tf.clone(), inner);
        }

        tracing::debug!("starting data transformation stage");
        let transformed_string_map = run_on_capped_pool(&self.thread_pool, || {
            stage.executor.execute_pipeline(&stage.program, string_keyed)
        })?;

        let mut result = TransformedData::new();
        for (tf, string_asset_map) in transformed_string_map {
            let mut inner = HashMap::new();
            for (asset_id, df) in string_asset_map {
                match asset_id_to_asset.get(&asset_id) {
                    Some(asset) => {
                        inner.insert(asset.clone(), df);
                    }
                    None => return Err(PipelineError::AssetKeyLost(asset_id)),
                }
            }
            result.insert(tf, inner);
        }

        for (tf, ids) in &input_ids {
            let output_ids: HashSet<&str> = result
                .get(tf)
                .map(|assets| assets.keys().map(Asset::id).collect())
                .unwrap_or_default();
            for id in ids {
                if !output_ids.contains(id.as_str()) {
                    return Err(PipelineError::AssetKeyLost(id.clone()));
                }
            }
        }

        self.generated_reports = stage.executor.generated_reports();
        self.generated_event_markers = stage.executor.generated_event_markers();
        Ok(result)
    }

    fn complete_pipeline(&mut self) -> Result<(), PipelineError> {
        self.append_futures_continuations()?;
        let resampled = self.resample_bar_data()?;
        self.transformed_data = self.transform_bar_data(resampled)?;

        let flattened: Vec<(Timeframe, Asset, DataFrame)> = self
            .transformed_data
            .iter()
            .flat_map(|(tf, assets)| {
                assets.iter().map(move |(asset, df)| (tf.clone(), asset.clone(), df.clone()))
            })
            .collect();

        tracing::debug!(items = flattened.len(), "scanning flattened tables for timestamp index");
        let scanned: Vec<(Timeframe, Asset, Vec<(i64, RowRange)>)> = run_on_capped_pool(&self.thread_pool, || {
            flattened
                .par_iter()
                .filter(|(_, _, df)| df.height() > 0)
                .map(|(tf, asset, df)| {
                    let ranges = index::timestamp_row_ranges(df)?;
                    Ok((tf.clone(), asset.clone(), ranges))
                })
                .collect::<Result<Vec<_>, PipelineError>>()
        })?;

        self.timestamp_index = index::build_timestamp_index(scanned);
        tracing::debug!(timestamps = self.timestamp_index.len(), "timestamp index built");
        Ok(())
    }
}

/// Reads `EPOCH_MAX_TBB_THREADS`/`EPOCH_DISABLE_PARALLEL_REPORTS` once at
/// construction; the former wins if both are set (§9 open question). `None`
/// leaves the global rayon pool untouched.
fn build_capped_thread_pool() -> Option<rayon::ThreadPool> {
    let num_threads = if let Ok(raw) = std::env::var("EPOCH_MAX_TBB_THREADS") {
        let n = raw.trim().parse::<usize>().unwrap_or(1).max(1);
        tracing::info!(threads = n, "parallelism capped via EPOCH_MAX_TBB_THREADS");
        Some(n)
    } else if std::env::var("EPOCH_DISABLE_PARALLEL_REPORTS").is_ok() {
        tracing::info!("parallelism capped to 1 via EPOCH_DISABLE_PARALLEL_REPORTS");
        Some(1)
    } else {
        None
    };

    num_threads.map(|n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .expect("failed to build capped worker pool")
    })
}

fn run_on_capped_pool<T: Send>(pool: &Option<rayon::ThreadPool>, f: impl FnOnce() -> T + Send) -> T {
    match pool {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// For the `Spot` asset class (this crate's analogue of the original's
/// `AssetClass::Stocks` guard), drops messages outside the cached NYSE
/// session; every other class passes through unfiltered.
fn filter_for_market_hours(
    asset_class: AssetClass,
    messages: Vec<BarMessage>,
    session_cache: &Mutex<Option<NyseSession>>,
) -> Vec<BarMessage> {
    if asset_class != AssetClass::Spot {
        return messages;
    }

    let mut cache = session_cache.lock().expect("nyse session cache mutex poisoned");
    *cache = NyseSession::refresh_for(*cache, Utc::now());
    match *cache {
        Some(session) => messages.into_iter().filter(|m| session.contains(m.timestamp)).collect(),
        None => {
            tracing::info!("skipping spot data: no NYSE session today");
            Vec::new()
        }
    }
}

fn bar_messages_to_dataframe(messages: &[BarMessage]) -> Result<HashMap<Asset, DataFrame>, PipelineError> {
    type Columns = (Vec<i64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>);
    let mut grouped: HashMap<Asset, Columns> = HashMap::new();
    for msg in messages {
        let entry = grouped.entry(msg.asset.clone()).or_default();
        entry.0.push(msg.timestamp.timestamp_micros());
        entry.1.push(msg.open);
        entry.2.push(msg.high);
        entry.3.push(msg.low);
        entry.4.push(msg.close);
        entry.5.push(msg.volume);
    }

    let mut out = HashMap::new();
    for (asset, (ts, open, high, low, close, volume)) in grouped {
        let raw = df![
            CanonicalCol::Timestamp.as_str() => ts,
            CanonicalCol::Open.as_str() => open,
            CanonicalCol::High.as_str() => high,
            CanonicalCol::Low.as_str() => low,
            CanonicalCol::Close.as_str() => close,
            CanonicalCol::Volume.as_str() => volume,
        ]
        .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
        let df = raw
            .lazy()
            .with_column(col(CanonicalCol::Timestamp.as_str()).cast(DataType::Datetime(
                TimeUnit::Microseconds,
                Some(polars::prelude::TimeZone::UTC),
            )))
            .collect()
            .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
        out.insert(asset, df);
    }
    Ok(out)
}

fn merge_new_bars(loaded: &Arc<Mutex<HashMap<Asset, DataFrame>>>, new_data: HashMap<Asset, DataFrame>) -> Result<(), PipelineError> {
    let mut guard = loaded.lock().expect("loaded_bar_data mutex poisoned");
    for (asset, df) in new_data {
        match guard.get(&asset) {
            Some(existing) => {
                let merged = existing
                    .vstack(&df)
                    .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
                guard.insert(asset, merged);
            }
            None => {
                guard.insert(asset, df);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompiledProgram;

    struct StubLoader {
        data: HashMap<Asset, DataFrame>,
    }

    impl DataLoader for StubLoader {
        fn load_data(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }

        fn stored_data(&self) -> HashMap<Asset, DataFrame> {
            self.data.clone()
        }

        fn data_category(&self) -> DataCategory {
            DataCategory::Spot
        }

        fn assets(&self) -> Vec<Asset> {
            self.data.keys().cloned().collect()
        }
    }

    struct IdentityExecutor;

    impl TransformExecutor for IdentityExecutor {
        fn execute_pipeline(
            &mut self,
            _program: &CompiledProgram,
            data: StringKeyedTables,
        ) -> Result<StringKeyedTables, PipelineError> {
            Ok(data)
        }
    }

    struct DroppingExecutor;

    impl TransformExecutor for DroppingExecutor {
        fn execute_pipeline(
            &mut self,
            _program: &CompiledProgram,
            mut data: StringKeyedTables,
        ) -> Result<StringKeyedTables, PipelineError> {
            for assets in data.values_mut() {
                assets.clear();
            }
            Ok(data)
        }
    }

    fn one_bar_df() -> DataFrame {
        df![
            CanonicalCol::Timestamp.as_str() => [0i64],
            CanonicalCol::Open.as_str() => [1.0],
            CanonicalCol::High.as_str() => [1.0],
            CanonicalCol::Low.as_str() => [1.0],
            CanonicalCol::Close.as_str() => [1.0],
            CanonicalCol::Volume.as_str() => [1.0],
        ]
        .unwrap()
        .lazy()
        .with_column(col(CanonicalCol::Timestamp.as_str()).cast(DataType::Datetime(
            TimeUnit::Microseconds,
            Some(polars::prelude::TimeZone::UTC),
        )))
        .collect()
        .unwrap()
    }

    fn options_with(
        transform: Option<TransformStage>,
    ) -> (OrchestratorOptions, Asset) {
        let asset = Asset::new("eurusd", AssetClass::Spot);
        let mut data = HashMap::new();
        data.insert(asset.clone(), one_bar_df());
        let options = OrchestratorOptions {
            loader: Box::new(StubLoader { data }),
            base_timeframe: "1D".parse().unwrap(),
            continuation_constructor: None,
            resampler: None,
            transform,
            websocket_managers: HashMap::new(),
        };
        (options, asset)
    }

    #[test]
    fn run_pipeline_builds_timestamp_index_without_a_transform_stage() {
        let (options, asset) = options_with(None);
        let mut orchestrator = Orchestrator::new(options);
        orchestrator.run_pipeline().unwrap();

        let base = orchestrator.get_base_timeframe().clone();
        assert!(orchestrator.get_transformed_data().get(&base).unwrap().contains_key(&asset));
        assert_eq!(orchestrator.get_timestamp_index().len(), 1);

        let mut calls = 0;
        orchestrator.handle_data(0, |_, _, _, _| calls += 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn transform_stage_runs_and_preserves_asset_keys() {
        let registry = crate::registry::builtin_operator_registry();
        let program = crate::compiler::compile("x = number(value=\"1\")", registry).unwrap();
        let (options, _) = options_with(Some(TransformStage {
            executor: Box::new(IdentityExecutor),
            program,
        }));
        let mut orchestrator = Orchestrator::new(options);
        orchestrator.run_pipeline().unwrap();
        assert_eq!(orchestrator.get_timestamp_index().len(), 1);
    }

    #[test]
    fn dropped_asset_id_raises_asset_key_lost() {
        let registry = crate::registry::builtin_operator_registry();
        let program = crate::compiler::compile("x = number(value=\"1\")", registry).unwrap();
        let (options, _) = options_with(Some(TransformStage {
            executor: Box::new(DroppingExecutor),
            program,
        }));
        let mut orchestrator = Orchestrator::new(options);
        let err = orchestrator.run_pipeline().unwrap_err();
        assert!(matches!(err, PipelineError::AssetKeyLost(_)));
    }
}
