use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use crate::error::AggregationError;
use crate::forecast::ForecastOutput;
use crate::models::{DailyForecast, EventRecord, ForecastPoint, Overview};
use crate::seasonality::coverage_days;

#[derive(Debug, Clone)]
pub struct Summary {
    pub overview: Overview,
    pub next_days: Vec<DailyForecast>,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Collapses hourly points to one point per calendar date. A date's value is
/// 24 times the mean of its hourly predictions, so partially covered dates
/// still read as a full-day volume.
pub fn daily_points(points: &[ForecastPoint]) -> Vec<DailyForecast> {
    let mut days: BTreeMap<NaiveDate, (f64, f64, f64, usize)> = BTreeMap::new();
    for point in points {
        let entry = days.entry(point.timestamp.date()).or_insert((0.0, 0.0, 0.0, 0));
        entry.0 += point.predicted;
        entry.1 += point.lower;
        entry.2 += point.upper;
        entry.3 += 1;
    }

    days.into_iter()
        .map(|(date, (predicted, lower, upper, hours))| {
            let scale = 24.0 / hours as f64;
            DailyForecast {
                date,
                predicted: predicted * scale,
                lower: lower * scale,
                upper: upper * scale,
            }
        })
        .collect()
}

/// The `horizon_days` calendar dates after the last observed date, rounded to cents.
pub fn next_days(output: &ForecastOutput, horizon_days: u32) -> Vec<DailyForecast> {
    let Some(last_date) = output.last_observed().map(|ts| ts.date()) else {
        return Vec::new();
    };

    daily_points(output.horizon())
        .into_iter()
        .filter(|day| day.date > last_date)
        .take(horizon_days as usize)
        .map(|day| DailyForecast {
            date: day.date,
            predicted: round2(day.predicted),
            lower: round2(day.lower),
            upper: round2(day.upper),
        })
        .collect()
}

pub fn overview(records: &[EventRecord]) -> Result<Overview, AggregationError> {
    let (Some(min), Some(max)) = (
        records.iter().map(|record| record.timestamp).min(),
        records.iter().map(|record| record.timestamp).max(),
    ) else {
        return Err(AggregationError::EmptyInput);
    };

    let mut seen = HashSet::new();
    let programs = records
        .iter()
        .filter(|record| seen.insert(record.program.as_str()))
        .map(|record| record.program.clone())
        .collect();

    Ok(Overview {
        min_date: min.date(),
        max_date: max.date(),
        coverage_days: coverage_days(min, max),
        total_rows: records.len(),
        programs,
    })
}

pub fn summarize(
    output: &ForecastOutput,
    horizon_days: u32,
    records: &[EventRecord],
) -> Result<Summary, AggregationError> {
    Ok(Summary {
        overview: overview(records)?,
        next_days: next_days(output, horizon_days),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDateTime};

    use super::*;
    use crate::models::SeasonalityConfig;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn flat_output(last: &str, history: usize, horizon_hours: i64, value: f64) -> ForecastOutput {
        let last = at(last);
        let first = last - Duration::hours(history as i64 - 1);
        let points = (0..history as i64 + horizon_hours)
            .map(|h| ForecastPoint {
                timestamp: first + Duration::hours(h),
                predicted: value,
                lower: value - 1.0,
                upper: value + 1.0,
            })
            .collect();
        ForecastOutput {
            seasonality: SeasonalityConfig::default(),
            coverage_days: 0,
            clip_threshold: value,
            points,
            history_len: history,
            iterations: 1,
            residual_std: 0.0,
        }
    }

    fn record(timestamp: &str, program: &str) -> EventRecord {
        EventRecord {
            timestamp: at(timestamp),
            program: program.to_string(),
            state: "open".to_string(),
            unique_id: timestamp.to_string(),
        }
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.675_1), 2.68);
        assert_eq!(round2(-1.005_1), -1.01);
    }

    #[test]
    fn daily_points_scale_partial_days() {
        let output = flat_output("2024-01-01 11:00:00", 12, 0, 2.0);
        let days = daily_points(&output.points);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!((days[0].predicted - 48.0).abs() < 1e-9);
        assert!((days[0].lower - 24.0).abs() < 1e-9);
    }

    #[test]
    fn extracts_days_not_hours() {
        let output = flat_output("2024-01-03 23:00:00", 72, 7 * 24, 1.5);
        let days = next_days(&output, 7);

        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(days[6].date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert!(days.iter().all(|day| day.predicted == 36.0));
    }

    #[test]
    fn follows_configured_horizon() {
        let output = flat_output("2024-01-03 23:00:00", 72, 14 * 24, 1.0);

        let short = next_days(&output, 3);
        assert_eq!(short.len(), 3);
        assert_eq!(short[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(short[2].date, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());

        let long = next_days(&output, 14);
        assert_eq!(long.len(), 14);
        assert_eq!(long[13].date, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
        assert!(long.windows(2).all(|pair| pair[1].date == pair[0].date.succ_opt().unwrap()));
    }

    #[test]
    fn skips_remainder_of_last_observed_day() {
        let output = flat_output("2024-01-03 10:00:00", 24, 7 * 24, 1.0);
        let days = next_days(&output, 7);

        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(days[6].date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
    }

    #[test]
    fn overview_describes_records() {
        let records = vec![
            record("2024-01-01 08:00:00", "Acme"),
            record("2024-01-03 07:00:00", "Beta"),
            record("2024-01-05 09:00:00", "Acme"),
        ];
        let overview = overview(&records).unwrap();

        assert_eq!(overview.min_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(overview.max_date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(overview.coverage_days, 4);
        assert_eq!(overview.total_rows, 3);
        assert_eq!(overview.programs, vec!["Acme", "Beta"]);
    }

    #[test]
    fn overview_of_nothing_is_an_error() {
        assert!(matches!(overview(&[]), Err(AggregationError::EmptyInput)));
    }
}
