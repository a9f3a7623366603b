//! Pure date-generation logic driving the discovery stage.
//!
//! No I/O; a deterministic function of its inputs, so it is trivial to
//! unit test and safe to call from both the `date-generator` binary and
//! directly from the fetcher's scheduling loop.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel-2 platform designator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    S2A,
    S2B,
    S2C,
}

impl Platform {
    pub const DEFAULT_SET: [Platform; 3] = [Platform::S2A, Platform::S2B, Platform::S2C];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::S2A => "S2A",
            Platform::S2B => "S2B",
            Platform::S2C => "S2C",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown platform code: {0}")]
pub struct UnknownPlatform(pub String);

impl std::str::FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S2A" => Ok(Platform::S2A),
            "S2B" => Ok(Platform::S2B),
            "S2C" => Ok(Platform::S2C),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// One discovery work item: a day to search, for a given platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub date: NaiveDate,
    pub platform: Platform,
}

impl WorkItem {
    /// `YYYY-MM-DD` formatted date, as used for the catalog query and as the
    /// status/count table key.
    pub fn date_str(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Inputs to the date generator. All optional; see [`Default`].
#[derive(Debug, Clone)]
pub struct DateGenParams {
    pub now: NaiveDate,
    pub lookback_days: u32,
    pub platforms: Vec<Platform>,
}

impl Default for DateGenParams {
    fn default() -> Self {
        Self {
            now: chrono::Utc::now().date_naive(),
            lookback_days: 5,
            platforms: Platform::DEFAULT_SET.to_vec(),
        }
    }
}

/// Produce the ordered list of `(date, platform)` work items driving
/// discovery: `{now-1 .. now-lookback_days} x platforms`, newest-first
/// within each platform, platforms iterated in the order given.
pub fn generate(params: &DateGenParams) -> Vec<WorkItem> {
    let mut items = Vec::with_capacity(params.platforms.len() * params.lookback_days as usize);

    for platform in &params.platforms {
        for offset in 1..=params.lookback_days {
            let date = params.now - Duration::days(offset as i64);
            items.push(WorkItem {
                date,
                platform: *platform,
            });
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_five_days_back() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 29).unwrap();
        let items = generate(&DateGenParams {
            now,
            ..Default::default()
        });

        assert_eq!(items.len(), 15);
        assert_eq!(items[0].date, NaiveDate::from_ymd_opt(2025, 1, 28).unwrap());
        assert_eq!(items[0].platform, Platform::S2A);
        assert_eq!(items[4].date, NaiveDate::from_ymd_opt(2025, 1, 24).unwrap());
        assert_eq!(items[5].platform, Platform::S2B);
    }

    #[test]
    fn newest_first_within_each_platform() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 29).unwrap();
        let items = generate(&DateGenParams {
            now,
            lookback_days: 3,
            platforms: vec![Platform::S2A],
        });

        let dates: Vec<_> = items.iter().map(|i| i.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 1, 28).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 27).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 26).unwrap(),
            ]
        );
    }

    #[test]
    fn zero_lookback_is_empty() {
        let items = generate(&DateGenParams {
            lookback_days: 0,
            ..Default::default()
        });
        assert!(items.is_empty());
    }

    #[test]
    fn platform_round_trips_through_str() {
        for p in Platform::DEFAULT_SET {
            let s = p.to_string();
            assert_eq!(s.parse::<Platform>().unwrap(), p);
        }
        assert!("S2X".parse::<Platform>().is_err());
    }
}
