use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// A canonical bar-spacing identifier, e.g. `1Min`, `5Min`, `1h`, `1D`,
/// `1w`, `1w-MON`, `1M-END`, `1Q-MAR-START`, `1Y-JAN-END`.
///
/// Equality and hashing are by the canonical string (§3), so `Timeframe`
/// only ever stores the already-canonicalized form; construction validates
/// the multiplier/unit once and never re-derives it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe {
    canonical: String,
    multiplier: u32,
    unit: TimeframeUnit,
    anchor: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeframeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeframeUnit {
    /// Sub-daily units are intraday (§3).
    pub fn is_intraday(self) -> bool {
        matches!(self, TimeframeUnit::Minute | TimeframeUnit::Hour)
    }

    fn suffix(self) -> &'static str {
        match self {
            TimeframeUnit::Minute => "Min",
            TimeframeUnit::Hour => "h",
            TimeframeUnit::Day => "D",
            TimeframeUnit::Week => "w",
            TimeframeUnit::Month => "M",
            TimeframeUnit::Quarter => "Q",
            TimeframeUnit::Year => "Y",
        }
    }
}

impl Timeframe {
    pub fn new(multiplier: u32, unit: TimeframeUnit) -> Result<Self, DataError> {
        Self::with_anchor(multiplier, unit, None)
    }

    pub fn with_anchor(
        multiplier: u32,
        unit: TimeframeUnit,
        anchor: Option<String>,
    ) -> Result<Self, DataError> {
        if multiplier == 0 {
            return Err(DataError::InvalidTimeframe(
                "multiplier must be >= 1".to_string(),
            ));
        }
        let mut canonical = format!("{multiplier}{}", unit.suffix());
        if let Some(a) = &anchor {
            canonical.push('-');
            canonical.push_str(a);
        }
        Ok(Self {
            canonical,
            multiplier,
            unit,
            anchor,
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    pub fn is_intraday(&self) -> bool {
        self.unit.is_intraday()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for Timeframe {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, anchor) = match s.split_once('-') {
            Some((body, rest)) => (body, Some(rest.to_string())),
            None => (s, None),
        };
        let split_at = body
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| DataError::InvalidTimeframe(s.to_string()))?;
        let (num, unit_str) = body.split_at(split_at);
        let multiplier: u32 = num
            .parse()
            .map_err(|_| DataError::InvalidTimeframe(s.to_string()))?;
        let unit = match unit_str {
            "Min" | "min" | "m" => TimeframeUnit::Minute,
            "h" | "H" => TimeframeUnit::Hour,
            "D" | "d" => TimeframeUnit::Day,
            "w" | "W" => TimeframeUnit::Week,
            "M" => TimeframeUnit::Month,
            "Q" => TimeframeUnit::Quarter,
            "Y" => TimeframeUnit::Year,
            _ => return Err(DataError::InvalidTimeframe(s.to_string())),
        };
        Timeframe::with_anchor(multiplier, unit, anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_string() {
        let tf: Timeframe = "1h".parse().unwrap();
        assert_eq!(tf.to_string(), "1h");
        assert!(tf.is_intraday());

        let tf: Timeframe = "1D".parse().unwrap();
        assert_eq!(tf.to_string(), "1D");
        assert!(!tf.is_intraday());
    }

    #[test]
    fn parses_anchored_offsets() {
        let tf: Timeframe = "1w-MON".parse().unwrap();
        assert_eq!(tf.anchor(), Some("MON"));
        assert_eq!(tf.multiplier(), 1);
    }

    #[test]
    fn rejects_zero_multiplier() {
        assert!(Timeframe::new(0, TimeframeUnit::Day).is_err());
    }
}
