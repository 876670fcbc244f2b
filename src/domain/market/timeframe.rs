use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A candle interval expressed as a whole number of minutes.
///
/// Standard timeframes (1, 3, 5, 15, 30, 60, 240, 1440, ...) evenly divide a
/// calendar day and align on UTC midnight. Any other minute count is a
/// "custom timeframe" (CTF): it still resets alignment at every UTC
/// midnight boundary, but because its count doesn't evenly divide a day,
/// the last period before midnight is a shorter trailing bar rather than a
/// full period — see [`Timeframe::period_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timeframe(u32);

/// Whether a [`Timeframe`]'s periods align with UTC midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeframeKind {
    /// Divides 1440 evenly; periods reset at UTC midnight.
    Standard,
    /// Does not divide 1440; periods are counted from the Unix epoch.
    Custom,
}

const MINUTES_PER_DAY: u32 = 1440;

impl Timeframe {
    pub const ONE_MIN: Timeframe = Timeframe(1);
    pub const THREE_MIN: Timeframe = Timeframe(3);
    pub const FIVE_MIN: Timeframe = Timeframe(5);
    pub const FIFTEEN_MIN: Timeframe = Timeframe(15);
    pub const THIRTY_MIN: Timeframe = Timeframe(30);
    pub const ONE_HOUR: Timeframe = Timeframe(60);
    pub const TWO_HOUR: Timeframe = Timeframe(120);
    pub const FOUR_HOUR: Timeframe = Timeframe(240);
    pub const SIX_HOUR: Timeframe = Timeframe(360);
    pub const EIGHT_HOUR: Timeframe = Timeframe(480);
    pub const TWELVE_HOUR: Timeframe = Timeframe(720);
    pub const ONE_DAY: Timeframe = Timeframe(MINUTES_PER_DAY);

    /// Builds a timeframe from an arbitrary minute count, including
    /// non-divisors of a day (custom timeframes).
    pub fn from_minutes(minutes: u32) -> Result<Self, ConfigError> {
        if minutes == 0 {
            return Err(ConfigError::InvalidTimeframe {
                reason: "timeframe must be at least 1 minute".into(),
            });
        }
        Ok(Timeframe(minutes))
    }

    pub fn to_minutes(&self) -> u32 {
        self.0
    }

    pub fn to_seconds(&self) -> i64 {
        self.0 as i64 * 60
    }

    pub fn to_millis(&self) -> i64 {
        self.to_seconds() * 1000
    }

    pub fn kind(&self) -> TimeframeKind {
        if MINUTES_PER_DAY % self.0 == 0 {
            TimeframeKind::Standard
        } else {
            TimeframeKind::Custom
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.kind(), TimeframeKind::Custom)
    }

    /// The canonical standard timeframes, ascending.
    pub fn standard() -> Vec<Timeframe> {
        vec![
            Timeframe::ONE_MIN,
            Timeframe::THREE_MIN,
            Timeframe::FIVE_MIN,
            Timeframe::FIFTEEN_MIN,
            Timeframe::THIRTY_MIN,
            Timeframe::ONE_HOUR,
            Timeframe::TWO_HOUR,
            Timeframe::FOUR_HOUR,
            Timeframe::SIX_HOUR,
            Timeframe::EIGHT_HOUR,
            Timeframe::TWELVE_HOUR,
            Timeframe::ONE_DAY,
        ]
    }

    /// True if `timestamp_ms` is the first millisecond of a period of this
    /// timeframe.
    pub fn is_period_start(&self, timestamp_ms: i64) -> bool {
        timestamp_ms == self.period_start(timestamp_ms)
    }

    /// The start timestamp (ms) of the period containing `timestamp_ms`.
    ///
    /// Every timeframe resets alignment at each UTC-midnight boundary: a
    /// day splits into `⌊1440/count⌋` full periods followed by one
    /// trailing partial period of `1440 − ⌊1440/count⌋·count` minutes
    /// (zero for timeframes that divide 1440 evenly, so this collapses to
    /// plain midnight-aligned bucketing for standard timeframes). Custom
    /// timeframes (spec §3/§4.3) carry that trailing remainder as their
    /// last bar of the day instead of rolling into the next day's grid.
    pub fn period_start(&self, timestamp_ms: i64) -> i64 {
        let day_ms = MINUTES_PER_DAY as i64 * 60_000;
        let period_ms = self.to_millis();
        let day_start = timestamp_ms - timestamp_ms.rem_euclid(day_ms);
        let offset_in_day = timestamp_ms - day_start;

        let full_periods = (MINUTES_PER_DAY / self.0) as i64;
        let last_full_period_end = full_periods * period_ms;

        let period_offset = if offset_in_day < last_full_period_end {
            offset_in_day - offset_in_day.rem_euclid(period_ms)
        } else {
            last_full_period_end
        };

        day_start + period_offset
    }

    /// Number of 1-minute candles needed to warm up `indicator_period`
    /// candles of this timeframe, with a 10% buffer.
    pub fn warmup_candles(&self, indicator_period: usize) -> usize {
        let required = indicator_period * self.0 as usize;
        (required as f64 * 1.1).ceil() as usize
    }
}

impl FromStr for Timeframe {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let invalid = || ConfigError::InvalidTimeframe {
            reason: format!("'{}' is not a valid timeframe (use e.g. '1m', '4h', '1d')", s),
        };

        let (digits, unit) = lower
            .find(|c: char| !c.is_ascii_digit())
            .map(|idx| lower.split_at(idx))
            .ok_or_else(invalid)?;

        let count: u32 = digits.parse().map_err(|_| invalid())?;
        let minutes = match unit {
            "m" | "min" => count,
            "h" | "hour" => count * 60,
            "d" | "day" => count * MINUTES_PER_DAY,
            _ => return Err(invalid()),
        };
        Timeframe::from_minutes(minutes)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % MINUTES_PER_DAY == 0 {
            write!(f, "{}d", self.0 / MINUTES_PER_DAY)
        } else if self.0 % 60 == 0 {
            write!(f, "{}h", self.0 / 60)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}
