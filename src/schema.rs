//! Canonical bar-data column vocabulary.
//!
//! Trimmed from chapaty's `transport::schema::CanonicalCol` (which also
//! carries order-flow and economic-calendar columns out of scope for this
//! crate) down to the OHLCV columns the resampler and continuation
//! constructor actually touch.

use polars::prelude::{DataType, PlSmallStr, TimeUnit, TimeZone};
use strum::{Display, EnumString, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CanonicalCol {
    /// The start time of a bar.
    OpenTimestamp,
    /// The primary index timestamp (bar close time).
    Timestamp,
    Open,
    High,
    Low,
    Close,
    /// Base asset volume traded during the bar.
    Volume,
    /// Front contract id at this row, carried on continuation series so
    /// `Database::GetFrontContract` can look it up by timestamp (§6).
    Contract,
}

impl From<CanonicalCol> for PlSmallStr {
    fn from(value: CanonicalCol) -> Self {
        value.as_str().into()
    }
}

impl CanonicalCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Self::Open | Self::High | Self::Low | Self::Close | Self::Volume => DataType::Float64,
            Self::Timestamp | Self::OpenTimestamp => {
                DataType::Datetime(TimeUnit::Microseconds, Some(TimeZone::UTC))
            }
            Self::Contract => DataType::String,
        }
    }
}
