//! Timestamp inverted index and event dispatch (§4.11).
//!
//! Grounded in `original_source/data/database/database_impl.cpp`'s
//! `GetTimestampIndexMapping` (per-table timestamp -> row-range scan) and
//! `CompletePipeline`'s inversion loop (`m_timestampIndex[timestamp].push_back
//! ({timeframe, asset, range})`).

use std::collections::HashMap;

use polars::prelude::*;

use crate::error::{DataError, PipelineError};
use crate::schema::CanonicalCol;
use crate::types::{Asset, Timeframe};

/// An inclusive `[start, end]` range of contiguous rows sharing one
/// timestamp in a transformed table (§3 "Timestamp inverted index").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn single(row: usize) -> Self {
        Self { start: row, end: row }
    }
}

/// `ts -> [(timeframe, asset, row_range)]`, keyed by UTC nanosecond
/// timestamp (§3 "Timestamp inverted index"). Hash-backed rather than the
/// sorted-vec map used for `node_lookup`/CSE's canonical-key index: §4.11/
/// §8 require `HandleData` to be an O(1) lookup, and this index is never
/// iterated in key order (the entry order within one timestamp is already
/// unspecified per §5), so a `HashMap` is the right structure here even
/// though the other small, insertion-order-light maps in this crate use
/// `SortedVecMap`.
pub type TimestampIndex = HashMap<i64, Vec<(Timeframe, Asset, RowRange)>>;

/// Scans `df`'s timestamp column and merges consecutive equal timestamps
/// into one `RowRange` (§4.9 step 5, `GetTimestampIndexMapping`).
///
/// Returns an error if the column is missing, not a UTC datetime, or not
/// non-decreasing (the resampler/loader are required to uphold strictly
/// increasing per-asset timestamps per §5, but a defensive check here turns
/// a violated upstream invariant into a diagnosable error instead of a
/// silently wrong index).
pub fn timestamp_row_ranges(df: &DataFrame) -> Result<Vec<(i64, RowRange)>, PipelineError> {
    let ts_col = CanonicalCol::Timestamp.name();
    let column = df
        .column(&ts_col)
        .map_err(|e| PipelineError::TransformFailure(e.to_string()))?;
    let ts = column
        .datetime()
        .map_err(|e| PipelineError::TransformFailure(DataError::DataFrame(e.to_string()).to_string()))?;

    let mut out: Vec<(i64, RowRange)> = Vec::new();
    for (row, value) in ts.into_iter().enumerate() {
        let value = match value {
            Some(v) => v,
            None => continue,
        };
        match out.last_mut() {
            Some((last_ts, range)) if *last_ts == value => {
                range.end = row;
            }
            Some((last_ts, _)) if value < *last_ts => {
                return Err(PipelineError::TransformFailure(format!(
                    "timestamp column is not non-decreasing at row {row}"
                )));
            }
            _ => out.push((value, RowRange::single(row))),
        }
    }
    Ok(out)
}

/// Builds the full inverted index from a flattened list of transformed
/// tables (§4.9 step 5's inversion loop, after the per-table scan).
pub fn build_timestamp_index(
    entries: impl IntoIterator<Item = (Timeframe, Asset, Vec<(i64, RowRange)>)>,
) -> TimestampIndex {
    let mut index = TimestampIndex::new();
    for (timeframe, asset, ranges) in entries {
        for (ts, range) in ranges {
            index
                .entry(ts)
                .or_insert_with(Vec::new)
                .push((timeframe.clone(), asset.clone(), range));
        }
    }
    index
}

/// `Database::HandleData` (§4.11, §6): O(1) lookup by timestamp, dispatching
/// `handler` once per `(timeframe, asset, row_range)` entry sharing `ts`. A
/// miss calls `handler` zero times (§8 "`HandleData` O(1) absent-case").
///
/// The entry order within one timestamp is unspecified (§5); handlers must
/// not rely on it and must not mutate `transformed_data` through `table`.
pub fn handle_data<F>(index: &TimestampIndex, ts: i64, mut handler: F)
where
    F: FnMut(&Timeframe, &Asset, RowRange, i64),
{
    if let Some(entries) = index.get(&ts) {
        for (timeframe, asset, range) in entries {
            handler(timeframe, asset, *range, ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetClass;
    use chrono::{TimeZone, Utc};

    fn ts_df(timestamps: &[i64]) -> DataFrame {
        let df = df![CanonicalCol::Timestamp.name() => timestamps.to_vec()].unwrap();
        df.lazy()
            .with_column(col(CanonicalCol::Timestamp.name()).cast(DataType::Datetime(
                TimeUnit::Microseconds,
                Some(polars::prelude::TimeZone::UTC),
            )))
            .collect()
            .unwrap()
    }

    #[test]
    fn merges_consecutive_equal_timestamps() {
        let df = ts_df(&[1, 1, 2, 3, 3, 3]);
        let ranges = timestamp_row_ranges(&df).unwrap();
        assert_eq!(
            ranges,
            vec![
                (1, RowRange { start: 0, end: 1 }),
                (2, RowRange { start: 2, end: 2 }),
                (3, RowRange { start: 3, end: 5 }),
            ]
        );
    }

    #[test]
    fn rejects_decreasing_timestamps() {
        let df = ts_df(&[5, 1]);
        assert!(timestamp_row_ranges(&df).is_err());
    }

    #[test]
    fn handle_data_dispatches_once_per_entry_at_shared_timestamp() {
        let tf_1d: Timeframe = "1D".parse().unwrap();
        let tf_1h: Timeframe = "1h".parse().unwrap();
        let a = Asset::new("eurusd", AssetClass::Spot);
        let shared_ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap().timestamp_micros();

        let index = build_timestamp_index([
            (tf_1d.clone(), a.clone(), vec![(shared_ts, RowRange::single(0))]),
            (tf_1h.clone(), a.clone(), vec![(shared_ts, RowRange::single(4))]),
        ]);

        let mut calls = 0;
        handle_data(&index, shared_ts, |_tf, _a, _range, _ts| calls += 1);
        assert_eq!(calls, 2);

        let mut absent_calls = 0;
        handle_data(&index, shared_ts + 1, |_, _, _, _| absent_calls += 1);
        assert_eq!(absent_calls, 0);
    }
}
