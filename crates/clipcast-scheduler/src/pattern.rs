//! Distribution patterns for bulk scheduling.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

/// Rule for spreading multiple uploads' scheduled times.
///
/// Times are local wall-clock values; the scheduler interprets them in the
/// caller's timezone when the batch is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionPattern {
    /// `start + index * every_hours` for each upload.
    Interval {
        start: NaiveDateTime,
        every_hours: i64,
    },
    /// `start + index` days, same time of day.
    Daily { start: NaiveDateTime },
    /// Explicit per-upload times.
    Custom { times: Vec<NaiveDateTime> },
}

impl DistributionPattern {
    /// Compute one target time per upload, in submission order.
    pub fn compute_times(&self, count: usize) -> SchedulerResult<Vec<NaiveDateTime>> {
        match self {
            DistributionPattern::Interval { start, every_hours } => {
                if *every_hours <= 0 {
                    return Err(SchedulerError::InvalidPattern(format!(
                        "interval must be a positive number of hours, got {every_hours}"
                    )));
                }
                Ok((0..count as i64)
                    .map(|i| *start + Duration::hours(every_hours * i))
                    .collect())
            }
            DistributionPattern::Daily { start } => Ok((0..count as i64)
                .map(|i| *start + Duration::days(i))
                .collect()),
            DistributionPattern::Custom { times } => {
                if times.len() < count {
                    return Err(SchedulerError::InsufficientTimes {
                        provided: times.len(),
                        required: count,
                    });
                }
                Ok(times[..count].to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn interval_spreads_by_hours() {
        let pattern = DistributionPattern::Interval {
            start: start(),
            every_hours: 2,
        };
        let times = pattern.compute_times(3).unwrap();
        assert_eq!(times[0], start());
        assert_eq!(times[1], start() + Duration::hours(2));
        assert_eq!(times[2], start() + Duration::hours(4));
    }

    #[test]
    fn interval_rejects_non_positive_hours() {
        let pattern = DistributionPattern::Interval {
            start: start(),
            every_hours: 0,
        };
        assert!(matches!(
            pattern.compute_times(2).unwrap_err(),
            SchedulerError::InvalidPattern(_)
        ));
    }

    #[test]
    fn daily_spreads_by_days_same_time_of_day() {
        let pattern = DistributionPattern::Daily { start: start() };
        let times = pattern.compute_times(3).unwrap();
        assert_eq!(times[1], start() + Duration::days(1));
        assert_eq!(times[2], start() + Duration::days(2));
        assert_eq!(times[2].time(), start().time());
    }

    #[test]
    fn custom_requires_enough_times() {
        let pattern = DistributionPattern::Custom {
            times: vec![start()],
        };
        let err = pattern.compute_times(2).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InsufficientTimes {
                provided: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn custom_uses_given_times_in_order() {
        let t2 = start() + Duration::hours(5);
        let pattern = DistributionPattern::Custom {
            times: vec![start(), t2, start() + Duration::days(3)],
        };
        let times = pattern.compute_times(2).unwrap();
        assert_eq!(times, vec![start(), t2]);
    }
}
