//! `IWebSocketManager` — per-asset-class subscription boundary consumed by
//! `Orchestrator::refresh_pipeline` (§4.9, §6). Network transport itself is
//! out of scope (§1); this module only specifies the trait and the batch
//! message shape the orchestrator folds into its raw-data map.

use chrono::{DateTime, Utc};

use crate::types::Asset;

/// One incoming bar update from a websocket feed.
#[derive(Clone, Debug)]
pub struct BarMessage {
    pub asset: Asset,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A batch of bar messages delivered together, grouped by asset class so
/// the orchestrator can dispatch to the matching handler (§4.9
/// "RefreshPipeline ... one handler per asset class").
#[derive(Clone, Debug, Default)]
pub struct BarMessageBatch {
    pub messages: Vec<BarMessage>,
}

pub trait WebSocketManager {
    /// Subscribes to the asset class this manager is responsible for.
    fn subscribe(&mut self, assets: &[Asset]);

    /// Registers a callback invoked with each inbound batch. The pipeline's
    /// own handler guards a cached NYSE session for the stocks asset class
    /// and drops messages outside market hours (§4.9).
    fn handle_new_message(&mut self, callback: Box<dyn FnMut(BarMessageBatch) + Send>);
}
