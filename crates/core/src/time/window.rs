use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn try_new(start: NaiveDate, end: NaiveDate) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::invalid_input(format!(
                "start date {start} must be before end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn lookback(now_utc: DateTime<Utc>, days: i64) -> Result<Self, EngineError> {
        if days <= 0 {
            return Err(EngineError::invalid_input(format!(
                "lookback must be at least one day (got {days})"
            )));
        }
        let end = now_utc.date_naive();
        let start = TimeDelta::try_days(days)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                EngineError::invalid_input(format!(
                    "lookback of {days} days is outside the supported calendar"
                ))
            })?;
        Self::try_new(start, end)
    }

    pub fn unix_bounds(&self) -> (i64, i64) {
        let start = self.start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let end = self.end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_399;
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn lookback_spans_a_year() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).unwrap();
        let range = DateRange::lookback(now, 365).unwrap();
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn rejects_start_not_before_end() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert!(matches!(
            DateRange::try_new(d, d),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(DateRange::try_new(d, d - Duration::days(1)).is_err());
        assert!(DateRange::lookback(Utc::now(), 0).is_err());
    }

    #[test]
    fn oversized_lookback_is_invalid_input() {
        let err = DateRange::lookback(Utc::now(), 10_000_000_000).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(DateRange::lookback(Utc::now(), i64::MAX).is_err());
    }

    #[test]
    fn unix_bounds_cover_whole_days() {
        let range = DateRange::try_new(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        )
        .unwrap();
        let (start, end) = range.unix_bounds();
        assert_eq!(start, 1_767_225_600);
        assert_eq!(end, start + 2 * 86_400 - 1);
    }
}
