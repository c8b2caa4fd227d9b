//! Exchange-calendar arithmetic, scoped to exactly the lookup the resampler
//! needs (§1 "out of scope: exchange-calendar arithmetic beyond a
//! `market_close_time(date, calendar)` lookup"). Grounded in
//! `chapaty::common::time_interval`'s UTC-discipline and half-open-interval
//! idiom, generalized from session windows to a market-close oracle.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;

/// Exchange calendars this crate has a built-in close-time oracle for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Calendar {
    Nyse,
}

/// NYSE regular session hours. Early closes (half-days) are not modeled;
/// implementers adding them should extend `market_close_time` to consult a
/// holiday/half-day table, not inline the exception here.
const NYSE_OPEN: NaiveTime = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
const NYSE_CLOSE: NaiveTime = NaiveTime::from_hms_opt(16, 0, 0).unwrap();

/// Returns the exchange-local close time for `date` on `calendar`, or
/// `None` if the calendar has no session that day (weekends).
///
/// Per §9's open question, "today" for any caller reasoning about the
/// *current* session is computed in `America/New_York`; this function
/// itself is pure and takes an explicit date.
pub fn market_close_time(date: NaiveDate, calendar: Calendar) -> Option<NaiveTime> {
    use chrono::Datelike;
    match calendar {
        Calendar::Nyse => {
            let is_weekend = matches!(
                date.weekday(),
                chrono::Weekday::Sat | chrono::Weekday::Sun
            );
            if is_weekend { None } else { Some(NYSE_CLOSE) }
        }
    }
}

pub fn market_open_time(date: NaiveDate, calendar: Calendar) -> Option<NaiveTime> {
    use chrono::Datelike;
    match calendar {
        Calendar::Nyse => {
            let is_weekend = matches!(
                date.weekday(),
                chrono::Weekday::Sat | chrono::Weekday::Sun
            );
            if is_weekend { None } else { Some(NYSE_OPEN) }
        }
    }
}

/// Converts an intraday-to-daily bar's UTC timestamp to the market-close
/// label for its calendar day, expressed in `America/New_York` and
/// converted back to UTC (§4.10 "Label convention").
pub fn label_at_market_close(ts: DateTime<Utc>, calendar: Calendar) -> Option<DateTime<Utc>> {
    let local = ts.with_timezone(&New_York);
    let date = local.date_naive();
    let close = market_close_time(date, calendar)?;
    New_York
        .from_local_datetime(&date.and_time(close))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The current NYSE session window, cached per calendar day in
/// `America/New_York` (§9 open question: the "today" timezone). Grounded in
/// `original_source/data/database/database_impl.h`'s `NYSEMarketSession`
/// cache struct.
#[derive(Copy, Clone, Debug)]
pub struct NyseSession {
    pub date: NaiveDate,
    pub market_open: DateTime<Utc>,
    pub market_close: DateTime<Utc>,
}

impl NyseSession {
    pub fn for_date(date: NaiveDate) -> Option<Self> {
        let open = market_open_time(date, Calendar::Nyse)?;
        let close = market_close_time(date, Calendar::Nyse)?;
        let open_utc = New_York
            .from_local_datetime(&date.and_time(open))
            .single()?
            .with_timezone(&Utc);
        let close_utc = New_York
            .from_local_datetime(&date.and_time(close))
            .single()?
            .with_timezone(&Utc);
        Some(Self {
            date,
            market_open: open_utc,
            market_close: close_utc,
        })
    }

    /// Computes "today" in `America/New_York` from a UTC instant, then
    /// builds (or reuses, if `self` already covers that date) the session.
    pub fn refresh_for(self_or_none: Option<Self>, now: DateTime<Utc>) -> Option<Self> {
        let today = now.with_timezone(&New_York).date_naive();
        match self_or_none {
            Some(existing) if existing.date == today => Some(existing),
            _ => Self::for_date(today),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.market_open && ts < self.market_close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekend_has_no_close() {
        // 2026-08-01 is a Saturday.
        let sat = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(market_close_time(sat, Calendar::Nyse), None);
    }

    #[test]
    fn weekday_closes_at_four_pm_local() {
        let mon = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(
            market_close_time(mon, Calendar::Nyse),
            Some(NaiveTime::from_hms_opt(16, 0, 0).unwrap())
        );
    }

    #[test]
    fn label_at_market_close_crosses_dst_boundary() {
        // 2026-03-09 is the US DST "spring forward" date; NY is UTC-4 after.
        let ts = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let label = label_at_market_close(ts, Calendar::Nyse).unwrap();
        assert_eq!(label.with_timezone(&New_York).time(), NYSE_CLOSE);
    }

    #[test]
    fn nyse_session_contains_intraday_timestamp() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let session = NyseSession::for_date(date).unwrap();
        let noon = Utc.with_ymd_and_hms(2026, 7, 28, 16, 0, 0).unwrap();
        assert!(session.contains(noon));
    }
}
