//! Time buckets and key derivation.
//!
//! This module is the single source of truth for bucket prefixes and derived
//! keys. Log stores name objects with timestamp prefixes like
//! `2014-12-31-17-25-36-XXXXXXXXXXXXXXXX`; a granularity selects how much of
//! that prefix defines one bucket. No hardcoded key strings should exist
//! outside this module.

use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;

use crate::error::CollapseError;

/// Suffix appended to the timestamp prefix to form the collapsed output key.
pub const COLLAPSED_SUFFIX: &str = "_collapsed";

/// Time-bucket granularity.
///
/// All six variants format timestamp prefixes; only [`Day`](Self::Day),
/// [`Hour`](Self::Hour) and [`Minute`](Self::Minute) can step a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// Whole years (`2014`). Formatting only.
    Year,
    /// Whole months (`2014-12`). Formatting only.
    Month,
    /// Whole days (`2014-12-31`).
    Day,
    /// Whole hours (`2014-12-31-17`).
    Hour,
    /// Whole minutes (`2014-12-31-17-25`).
    Minute,
    /// Whole seconds (`2014-12-31-17-25-36`). Formatting only.
    Second,
}

impl Granularity {
    /// Returns the string name for this granularity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }

    const fn pattern(self) -> &'static str {
        match self {
            Self::Year => "%Y",
            Self::Month => "%Y-%m",
            Self::Day => "%Y-%m-%d",
            Self::Hour => "%Y-%m-%d-%H",
            Self::Minute => "%Y-%m-%d-%H-%M",
            Self::Second => "%Y-%m-%d-%H-%M-%S",
        }
    }

    /// Formats the timestamp prefix that identifies `dtm`'s bucket.
    #[must_use]
    pub fn format_prefix(self, dtm: DateTime<Utc>) -> String {
        dtm.format(self.pattern()).to_string()
    }

    /// The range-stepping interval, for granularities that support it.
    #[must_use]
    pub fn step(self) -> Option<Duration> {
        match self {
            Self::Day => Some(Duration::days(1)),
            Self::Hour => Some(Duration::hours(1)),
            Self::Minute => Some(Duration::minutes(1)),
            Self::Year | Self::Month | Self::Second => None,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = CollapseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            "hour" => Ok(Self::Hour),
            "minute" => Ok(Self::Minute),
            "second" => Ok(Self::Second),
            other => Err(CollapseError::InvalidGranularity {
                token: other.to_string(),
            }),
        }
    }
}

/// Normalizes a directory to carry exactly one trailing `/`.
///
/// The empty directory stays empty (keys resolve at the store root).
#[must_use]
pub fn join_dir(dir: &str) -> String {
    if dir.is_empty() {
        String::new()
    } else {
        format!("{}/", dir.trim_end_matches('/'))
    }
}

/// Builds the listing prefix for one bucket's source objects.
///
/// The trailing `-` keeps `2014-12-3` from matching `2014-12-30`.
#[must_use]
pub fn input_prefix(input_dir: &str, stamp: &str) -> String {
    format!("{}{stamp}-", join_dir(input_dir))
}

/// Builds the destination key for one bucket's collapsed object.
#[must_use]
pub fn output_key(output_dir: &str, stamp: &str) -> String {
    format!("{}{stamp}{COLLAPSED_SUFFIX}", join_dir(output_dir))
}

/// Builds the local accumulation file name for one bucket.
#[must_use]
pub fn local_file_name(stamp: &str) -> String {
    format!("{stamp}{COLLAPSED_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 12, 31, 17, 25, 36)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn formats_all_six_granularities() {
        assert_eq!(Granularity::Year.format_prefix(sample()), "2014");
        assert_eq!(Granularity::Month.format_prefix(sample()), "2014-12");
        assert_eq!(Granularity::Day.format_prefix(sample()), "2014-12-31");
        assert_eq!(Granularity::Hour.format_prefix(sample()), "2014-12-31-17");
        assert_eq!(
            Granularity::Minute.format_prefix(sample()),
            "2014-12-31-17-25"
        );
        assert_eq!(
            Granularity::Second.format_prefix(sample()),
            "2014-12-31-17-25-36"
        );
    }

    #[test]
    fn parses_tokens() {
        assert_eq!("day".parse::<Granularity>().expect("parse"), Granularity::Day);
        assert_eq!(
            "minute".parse::<Granularity>().expect("parse"),
            Granularity::Minute
        );

        let err = "fortnight".parse::<Granularity>().expect_err("must fail");
        assert!(matches!(
            err,
            CollapseError::InvalidGranularity { ref token } if token == "fortnight"
        ));
    }

    #[test]
    fn only_day_hour_minute_step() {
        assert_eq!(Granularity::Day.step(), Some(Duration::days(1)));
        assert_eq!(Granularity::Hour.step(), Some(Duration::hours(1)));
        assert_eq!(Granularity::Minute.step(), Some(Duration::minutes(1)));
        assert_eq!(Granularity::Year.step(), None);
        assert_eq!(Granularity::Month.step(), None);
        assert_eq!(Granularity::Second.step(), None);
    }

    #[test]
    fn derives_keys_with_normalized_directories() {
        assert_eq!(
            input_prefix("logs/s3logs", "2014-12-31"),
            "logs/s3logs/2014-12-31-"
        );
        assert_eq!(
            input_prefix("logs/s3logs/", "2014-12-31"),
            "logs/s3logs/2014-12-31-"
        );
        assert_eq!(
            output_key("logs/merged", "2014-12-31"),
            "logs/merged/2014-12-31_collapsed"
        );
        assert_eq!(local_file_name("2014-12-31"), "2014-12-31_collapsed");
    }

    #[test]
    fn empty_directory_resolves_at_the_root() {
        assert_eq!(input_prefix("", "2014-12-31"), "2014-12-31-");
        assert_eq!(output_key("", "2014-12-31"), "2014-12-31_collapsed");
    }
}
