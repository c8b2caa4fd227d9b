//! Multi-timeframe aggregation (§4.10 `IResampler`).
//!
//! Grounded in `original_source/data/database/resample.h`/`.cpp`: the
//! `Resampler::Build` per-timeframe, per-asset loop (skipping futures
//! contracts that are not continuations) and `AdjustTimestamps`'s
//! intraday-source/non-intraday-target market-close relabeling. The
//! per-column aggregation-rule dispatch follows the table in spec.md
//! §4.10; expressed as `polars::prelude::Expr` pipelines the way
//! `chapaty::data::indicator`'s `EmaWindow`/`SmaWindow` build `LazyFrame`
//! expression chains (`.lazy().group_by(...).agg([...])`).

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use polars::prelude::{DataType as PolarsDataType, *};
use rayon::prelude::*;

use crate::calendar::{Calendar, NyseSession};
use crate::continuations::validate_utc_index;
use crate::error::PipelineError;
use crate::schema::CanonicalCol;
use crate::types::{Asset, Timeframe, TimeframeUnit};

/// External collaborator boundary (§6 `IResampler`).
pub trait Resampler {
    fn build(
        &self,
        assets: &HashMap<Asset, DataFrame>,
    ) -> Result<Vec<(Timeframe, Asset, DataFrame)>, PipelineError>;
}

/// Default resampler over a fixed set of declared target timeframes
/// (§4.10). `is_intraday` records whether the *base* timeframe being fed in
/// is itself intraday, matching the C++ constructor's `isIntraday` flag
/// which drives `AdjustTimestamps`'s relabeling decision.
pub struct DefaultResampler {
    timeframes: Vec<Timeframe>,
    is_intraday: bool,
    calendar: Calendar,
}

impl DefaultResampler {
    /// Deduplicates `timeframes` by canonical string, mirroring the C++
    /// constructor's `TimeFrameSet` dedup loop.
    pub fn new(timeframes: impl IntoIterator<Item = Timeframe>, is_intraday: bool) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut deduped = Vec::new();
        for tf in timeframes {
            if seen.insert(tf.canonical().to_string()) {
                deduped.push(tf);
            }
        }
        Self {
            timeframes: deduped,
            is_intraday,
            calendar: Calendar::Nyse,
        }
    }

    fn fail(tf: &Timeframe, e: impl ToString) -> PipelineError {
        PipelineError::ResampleFailure {
            timeframe: tf.canonical().to_string(),
            message: e.to_string(),
        }
    }

    fn adjust_timestamps(&self, tf: &Timeframe, df: DataFrame) -> Result<DataFrame, PipelineError> {
        if df.height() == 0 || !self.is_intraday || tf.is_intraday() {
            return Ok(df);
        }
        let ts_col = CanonicalCol::Timestamp.name();
        let ts = df
            .column(&ts_col)
            .map_err(|e| Self::fail(tf, e))?
            .datetime()
            .map_err(|e| Self::fail(tf, e))?;

        let adjusted: Vec<Option<i64>> = ts
            .physical()
            .into_iter()
            .map(|micros| {
                micros.and_then(|micros| {
                    let ts = DateTime::<Utc>::from_timestamp_micros(micros)?;
                    NyseSession::for_date(ts.date_naive())
                        .map(|session| session.market_close.timestamp_micros())
                })
            })
            .collect();

        let position = df
            .get_column_names()
            .iter()
            .position(|name| name.as_str() == ts_col.as_str())
            .ok_or_else(|| Self::fail(tf, "timestamp column missing"))?;
        let relabeled = Series::new(ts_col.clone(), adjusted)
            .cast(&PolarsDataType::Datetime(
                TimeUnit::Microseconds,
                Some(polars::prelude::TimeZone::UTC),
            ))
            .map_err(|e| Self::fail(tf, e))?;
        let mut columns: Vec<Column> = df.get_columns().to_vec();
        columns[position] = relabeled.into_column();
        DataFrame::new(columns).map_err(|e| Self::fail(tf, e))
    }

    fn resample_one(&self, tf: &Timeframe, df: &DataFrame) -> Result<DataFrame, PipelineError> {
        validate_utc_index(df).map_err(|e| Self::fail(tf, e))?;

        let ts_col = CanonicalCol::Timestamp.name();
        let ts_ca = df
            .column(&ts_col)
            .map_err(|e| Self::fail(tf, e))?
            .datetime()
            .map_err(|e| Self::fail(tf, e))?;

        let bucket_micros: Vec<i64> = ts_ca
            .physical()
            .into_no_null_iter()
            .map(|micros| {
                let ts = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::MIN_UTC);
                bucket_label(ts, tf).timestamp_micros()
            })
            .collect();

        let bucket_col: PlSmallStr = PlSmallStr::from("__bucket");
        let mut columns: Vec<Column> = df.get_columns().to_vec();
        columns.push(Series::new(bucket_col.clone(), bucket_micros).into_column());
        let working = DataFrame::new(columns).map_err(|e| Self::fail(tf, e))?;

        let mut agg_exprs: Vec<Expr> = Vec::new();
        let mut select_exprs: Vec<Expr> = vec![col(bucket_col.clone())
            .cast(PolarsDataType::Datetime(
                TimeUnit::Microseconds,
                Some(polars::prelude::TimeZone::UTC),
            ))
            .alias(ts_col.clone())];
        for col_name in df.get_column_names() {
            let name = col_name.as_str();
            if name == ts_col.as_str() {
                continue;
            }
            let dtype = df.column(col_name).map_err(|e| Self::fail(tf, e))?.dtype().clone();
            agg_exprs.push(aggregate_expr(name, &dtype));
            select_exprs.push(col(name));
        }

        let resampled = working
            .lazy()
            .group_by([col(bucket_col.clone())])
            .agg(agg_exprs)
            .sort([bucket_col.as_str()], SortMultipleOptions::default())
            .select(select_exprs)
            .collect()
            .map_err(|e| Self::fail(tf, e))?;

        self.adjust_timestamps(tf, resampled)
    }
}

impl Resampler for DefaultResampler {
    fn build(
        &self,
        assets: &HashMap<Asset, DataFrame>,
    ) -> Result<Vec<(Timeframe, Asset, DataFrame)>, PipelineError> {
        // "futures contracts that are not continuations are skipped" (§4.10).
        let eligible: Vec<&Asset> = assets
            .keys()
            .filter(|a| !a.is_outright_future() || a.is_continuation())
            .collect();

        let mut all_results = Vec::new();
        for tf in &self.timeframes {
            let tf_results: Result<Vec<(Timeframe, Asset, DataFrame)>, PipelineError> = eligible
                .par_iter()
                .map(|asset| {
                    let df = assets
                        .get(*asset)
                        .expect("asset key drawn from the same map's keys");
                    let resampled = self.resample_one(tf, df)?;
                    Ok((tf.clone(), (*asset).clone(), resampled))
                })
                .collect();
            all_results.extend(tf_results?);
        }
        Ok(all_results)
    }
}

/// Per-column aggregation rule (spec.md §4.10 table).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ColumnAgg {
    First,
    Max,
    Min,
    Last,
    Sum,
    Mean,
    LastNonNull,
}

fn classify_column(name: &str, dtype: &PolarsDataType) -> ColumnAgg {
    match name {
        _ if name == CanonicalCol::Open.as_str() => ColumnAgg::First,
        _ if name == CanonicalCol::High.as_str() => ColumnAgg::Max,
        _ if name == CanonicalCol::Low.as_str() => ColumnAgg::Min,
        _ if name == CanonicalCol::Close.as_str() => ColumnAgg::Last,
        _ if name == CanonicalCol::Volume.as_str() => ColumnAgg::Sum,
        _ if name.contains("trade_count") || name == "count" => ColumnAgg::Sum,
        _ if name.contains("vwap") => ColumnAgg::Mean,
        _ => match dtype {
            PolarsDataType::Boolean => ColumnAgg::LastNonNull,
            PolarsDataType::String => ColumnAgg::Last,
            _ => ColumnAgg::LastNonNull,
        },
    }
}

/// Builds the aggregation expression for one column, per the dispatch
/// table above. `LastNonNull` retains the most recent non-null observation
/// in the bucket (§4.10 "Null-sparse columns must use 'last non-null'").
fn aggregate_expr(name: &str, dtype: &PolarsDataType) -> Expr {
    let c = col(name);
    let agg = match classify_column(name, dtype) {
        ColumnAgg::First => c.first(),
        ColumnAgg::Max => c.max(),
        ColumnAgg::Min => c.min(),
        ColumnAgg::Last => c.last(),
        ColumnAgg::Sum => c.sum(),
        ColumnAgg::Mean => c.mean(),
        ColumnAgg::LastNonNull => c.drop_nulls().last(),
    };
    agg.alias(name)
}

/// Right-closed, right-labeled bucket boundary for `ts` under `tf`'s unit,
/// multiplier, and anchor (§4.10 "Label convention", "anchor semantics").
fn bucket_label(ts: DateTime<Utc>, tf: &Timeframe) -> DateTime<Utc> {
    match tf.unit() {
        TimeframeUnit::Minute => duration_ceil(ts, ChronoDuration::minutes(tf.multiplier() as i64)),
        TimeframeUnit::Hour => duration_ceil(ts, ChronoDuration::hours(tf.multiplier() as i64)),
        TimeframeUnit::Day => duration_ceil(ts, ChronoDuration::days(tf.multiplier() as i64)),
        TimeframeUnit::Week => {
            let anchor = parse_weekday_anchor(tf.anchor());
            midnight_utc(week_label(ts.date_naive(), anchor, tf.multiplier()))
        }
        TimeframeUnit::Month => {
            let (position, wom) = parse_month_anchor(tf.anchor());
            let label_date = if let Some((n, dow)) = wom {
                week_of_month_label(ts.date_naive(), n, dow, tf.multiplier())
            } else {
                periodic_label(ts.date_naive(), tf.multiplier() as i64, 1, position)
            };
            midnight_utc(label_date)
        }
        TimeframeUnit::Quarter => {
            let (anchor_month, position) = parse_fiscal_anchor(tf.anchor(), 1);
            midnight_utc(periodic_label(
                ts.date_naive(),
                3 * tf.multiplier() as i64,
                anchor_month,
                position,
            ))
        }
        TimeframeUnit::Year => {
            let (anchor_month, position) = parse_fiscal_anchor(tf.anchor(), 1);
            midnight_utc(periodic_label(
                ts.date_naive(),
                12 * tf.multiplier() as i64,
                anchor_month,
                position,
            ))
        }
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("valid midnight").and_utc()
}

/// Ceils `ts` to the next multiple of `duration` since the Unix epoch,
/// leaving it unchanged when already on a boundary (closed=right,
/// label=right: a timestamp exactly on a boundary belongs to the bucket
/// ending there, not the next one).
fn duration_ceil(ts: DateTime<Utc>, duration: ChronoDuration) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let dur_secs = duration.num_seconds().max(1);
    let rem = secs.rem_euclid(dur_secs);
    let label_secs = if rem == 0 { secs } else { secs + (dur_secs - rem) };
    DateTime::<Utc>::from_timestamp(label_secs, 0).unwrap_or(ts)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Position {
    Start,
    End,
}

fn parse_weekday_anchor(anchor: Option<&str>) -> Weekday {
    match anchor.map(str::to_ascii_uppercase).as_deref() {
        Some("MON") => Weekday::Mon,
        Some("TUE") => Weekday::Tue,
        Some("WED") => Weekday::Wed,
        Some("THU") => Weekday::Thu,
        Some("FRI") => Weekday::Fri,
        Some("SAT") => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

/// Week-of-month position: 1st..4th, or the last occurrence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum WeekOfMonth {
    Nth(u32),
    Last,
}

fn parse_month_anchor(anchor: Option<&str>) -> (Position, Option<(WeekOfMonth, Weekday)>) {
    let Some(anchor) = anchor else {
        return (Position::End, None);
    };
    let upper = anchor.to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix("WOM-") {
        let mut parts = rest.split('-');
        let n = parts.next().unwrap_or("");
        let dow = parts.next().unwrap_or("");
        let position = if n == "LAST" {
            WeekOfMonth::Last
        } else {
            WeekOfMonth::Nth(n.parse().unwrap_or(1))
        };
        let weekday = parse_weekday_anchor(Some(dow));
        return (Position::End, Some((position, weekday)));
    }
    match upper.as_str() {
        "START" => (Position::Start, None),
        _ => (Position::End, None),
    }
}

const MONTH_CODES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Parses a `"<MONTH3>-START"` / `"<MONTH3>-END"` fiscal anchor (quarter and
/// year offsets), falling back to `default_month` and `Position::End`.
fn parse_fiscal_anchor(anchor: Option<&str>, default_month: u32) -> (u32, Position) {
    let Some(anchor) = anchor else {
        return (default_month, Position::End);
    };
    let upper = anchor.to_ascii_uppercase();
    let mut month = default_month;
    let mut position = Position::End;
    for (i, code) in MONTH_CODES.iter().enumerate() {
        if upper.contains(code) {
            month = i as u32 + 1;
            break;
        }
    }
    if upper.ends_with("START") {
        position = Position::Start;
    }
    (month, position)
}

fn ym_to_date(total_months: i64, day: u32) -> NaiveDate {
    let year = total_months.div_euclid(12) as i32;
    let month = (total_months.rem_euclid(12) + 1) as u32;
    NaiveDate::from_ymd_opt(year, month, day).expect("valid year/month/day=1")
}

fn last_day_of_month(total_months: i64) -> NaiveDate {
    let first_of_next = ym_to_date(total_months + 1, 1);
    first_of_next - ChronoDuration::days(1)
}

/// Generic calendar-month-grouped bucket label, shared by Month/Quarter/
/// Year (§4.10: "implemented consistently across ... variants"). Groups
/// every `period_months` calendar months together, with the grouping
/// offset by `anchor_month` (fiscal-year start) and labeled at either the
/// first or last day of the resulting period.
fn periodic_label(date: NaiveDate, period_months: i64, anchor_month: u32, position: Position) -> NaiveDate {
    let shift = anchor_month as i64 - 1;
    let total = date.year() as i64 * 12 + date.month() as i64 - 1 - shift;
    let bucket = total.div_euclid(period_months);
    let bucket_start = bucket * period_months + shift;
    let bucket_end = bucket_start + period_months - 1;
    match position {
        Position::Start => ym_to_date(bucket_start, 1),
        Position::End => last_day_of_month(bucket_end),
    }
}

/// Buckets `date` by week, labeling at the next occurrence of `anchor` on
/// or after `date` (closed=right: a `date` that itself falls on `anchor`
/// closes its own bucket). `multiplier` groups every N anchor-weeks
/// together, counted from a fixed 1970 epoch reference week.
fn week_label(date: NaiveDate, anchor: Weekday, multiplier: u32) -> NaiveDate {
    let days_until = days_until_weekday(date, anchor);
    let label = date + ChronoDuration::days(days_until as i64);
    if multiplier <= 1 {
        return label;
    }
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch date");
    let epoch_label = epoch + ChronoDuration::days(days_until_weekday(epoch, anchor) as i64);
    let weeks_since_epoch = (label - epoch_label).num_days().div_euclid(7);
    let bucket = weeks_since_epoch.div_euclid(multiplier as i64);
    epoch_label + ChronoDuration::days((bucket + 1) * 7 * multiplier as i64)
}

fn days_until_weekday(date: NaiveDate, target: Weekday) -> u32 {
    let current = date.weekday().num_days_from_monday();
    let target_n = target.num_days_from_monday();
    (target_n + 7 - current) % 7
}

/// Nth (or last) occurrence of `weekday` in `date`'s calendar month,
/// advancing to next month's occurrence if `date` falls after it
/// (§4.10 "week-of-month variants").
fn week_of_month_label(date: NaiveDate, position: WeekOfMonth, weekday: Weekday, multiplier: u32) -> NaiveDate {
    let _ = multiplier; // week-of-month buckets are inherently monthly-period; multiplier>1 not meaningful here.
    let candidate = nth_weekday_in_month(date.year(), date.month(), weekday, position);
    if date <= candidate {
        candidate
    } else {
        let (year, month) = next_month(date.year(), date.month());
        nth_weekday_in_month(year, month, weekday, position)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

fn nth_weekday_in_month(year: i32, month: u32, weekday: Weekday, position: WeekOfMonth) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid first-of-month");
    let first_offset = days_until_weekday(first, weekday);
    let first_occurrence = first + ChronoDuration::days(first_offset as i64);
    match position {
        WeekOfMonth::Nth(n) => first_occurrence + ChronoDuration::days(7 * (n.saturating_sub(1)) as i64),
        WeekOfMonth::Last => {
            let mut candidate = first_occurrence;
            loop {
                let next = candidate + ChronoDuration::days(7);
                if next.month() != month {
                    return candidate;
                }
                candidate = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetClass;
    use chrono::TimeZone;

    fn minute_bars(start: DateTime<Utc>, count: usize) -> DataFrame {
        let mut ts = Vec::with_capacity(count);
        let mut open = Vec::with_capacity(count);
        let mut high = Vec::with_capacity(count);
        let mut low = Vec::with_capacity(count);
        let mut close = Vec::with_capacity(count);
        let mut volume = Vec::with_capacity(count);
        for i in 0..count {
            let t = start + ChronoDuration::minutes(i as i64);
            ts.push(t.timestamp_micros());
            let price = 100.0 + i as f64;
            open.push(price);
            high.push(price + 0.5);
            low.push(price - 0.5);
            close.push(price + 0.25);
            volume.push(10.0);
        }
        let df = df![
            CanonicalCol::Timestamp.as_str() => ts,
            CanonicalCol::Open.as_str() => open,
            CanonicalCol::High.as_str() => high,
            CanonicalCol::Low.as_str() => low,
            CanonicalCol::Close.as_str() => close,
            CanonicalCol::Volume.as_str() => volume,
        ]
        .unwrap();
        df.lazy()
            .with_column(
                col(CanonicalCol::Timestamp.as_str()).cast(PolarsDataType::Datetime(
                    TimeUnit::Microseconds,
                    Some(polars::prelude::TimeZone::UTC),
                )),
            )
            .collect()
            .unwrap()
    }

    #[test]
    fn resamples_180_one_minute_bars_to_four_hourly_buckets() {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let df = minute_bars(start, 180);
        let resampler = DefaultResampler::new(vec!["1h".parse().unwrap()], true);
        let asset = Asset::new("eurusd", AssetClass::Spot);
        let mut map = HashMap::new();
        map.insert(asset.clone(), df);

        let results = resampler.build(&map).unwrap();
        assert_eq!(results.len(), 1);
        let (_, _, out) = &results[0];
        assert_eq!(out.height(), 4);

        let opens: Vec<f64> = out
            .column(CanonicalCol::Open.as_str())
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        // Right-closed/right-labeled buckets: the 09:00:00 bar sits exactly
        // on the hour boundary and is labeled into the (08:00, 09:00]
        // bucket by itself; the remaining 179 bars split into two full
        // 60-bar buckets and one partial 59-bar tail bucket.
        assert_eq!(opens, vec![100.0, 101.0, 161.0, 221.0]);

        let volumes: Vec<f64> = out
            .column(CanonicalCol::Volume.as_str())
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(volumes, vec![10.0, 600.0, 600.0, 590.0]);
    }

    #[test]
    fn last_non_null_preserves_sparse_observations() {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let mut ts = Vec::new();
        let mut sparse = Vec::new();
        for day in 0..3 {
            for hour in 0..24 {
                ts.push((start + ChronoDuration::hours(day * 24 + hour)).timestamp_micros());
                sparse.push(if hour == 0 { Some(day as f64 * 10.0) } else { None });
            }
        }
        let df = df![
            CanonicalCol::Timestamp.as_str() => ts,
            "indicator" => sparse,
        ]
        .unwrap();
        let df = df
            .lazy()
            .with_column(
                col(CanonicalCol::Timestamp.as_str()).cast(PolarsDataType::Datetime(
                    TimeUnit::Microseconds,
                    Some(polars::prelude::TimeZone::UTC),
                )),
            )
            .collect()
            .unwrap();

        let resampler = DefaultResampler::new(vec!["1D".parse().unwrap()], true);
        let asset = Asset::new("spx", AssetClass::Spot);
        let mut map = HashMap::new();
        map.insert(asset, df);

        let results = resampler.build(&map).unwrap();
        let (_, _, out) = &results[0];
        let values: Vec<Option<f64>> = out
            .column("indicator")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert!(values.iter().all(|v| v.is_some()));
    }

    #[test]
    fn skips_outright_futures_that_are_not_continuations() {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let df = minute_bars(start, 60);
        let resampler = DefaultResampler::new(vec!["1h".parse().unwrap()], true);
        let outright = Asset::new("es-2026h", AssetClass::Future);
        let mut map = HashMap::new();
        map.insert(outright, df);

        let results = resampler.build(&map).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn week_label_lands_on_next_anchor_weekday() {
        let tuesday = NaiveDate::from_ymd_opt(2026, 1, 6).unwrap();
        let label = week_label(tuesday, Weekday::Fri, 1);
        assert_eq!(label, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
    }

    #[test]
    fn month_end_label_is_last_calendar_day() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let label = periodic_label(date, 1, 1, Position::End);
        assert_eq!(label, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }
}
