use chrono::NaiveDateTime;

use crate::models::{HourlyTotal, SeasonalityConfig};

pub const YEARLY_MIN_DAYS: i64 = 180;
pub const MONTHLY_MIN_DAYS: i64 = 60;
pub const WEEKLY_MIN_DAYS: i64 = 14;

/// A periodic term expressed as a Fourier series of the given order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalComponent {
    pub name: &'static str,
    pub period_days: f64,
    pub fourier_order: usize,
}

pub const YEARLY: SeasonalComponent = SeasonalComponent {
    name: "yearly",
    period_days: 365.25,
    fourier_order: 10,
};

pub const MONTHLY: SeasonalComponent = SeasonalComponent {
    name: "monthly",
    period_days: 30.4,
    fourier_order: 5,
};

pub const WEEKLY: SeasonalComponent = SeasonalComponent {
    name: "weekly",
    period_days: 7.0,
    fourier_order: 3,
};

pub const DAILY: SeasonalComponent = SeasonalComponent {
    name: "daily",
    period_days: 1.0,
    fourier_order: 10,
};

/// Whole days between two instants, truncated.
pub fn coverage_days(first: NaiveDateTime, last: NaiveDateTime) -> i64 {
    (last - first).num_days()
}

pub fn series_coverage_days(series: &[HourlyTotal]) -> i64 {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) => coverage_days(first.timestamp, last.timestamp),
        _ => 0,
    }
}

pub fn select_for_days(days: i64) -> SeasonalityConfig {
    SeasonalityConfig {
        yearly: days > YEARLY_MIN_DAYS,
        monthly: days > MONTHLY_MIN_DAYS,
        weekly: days > WEEKLY_MIN_DAYS,
        daily: true,
    }
}

/// Chooses the seasonal terms justified by the span of an ascending hourly series.
pub fn select(series: &[HourlyTotal]) -> SeasonalityConfig {
    select_for_days(series_coverage_days(series))
}

pub fn components(config: &SeasonalityConfig) -> Vec<SeasonalComponent> {
    [
        (config.yearly, YEARLY),
        (config.monthly, MONTHLY),
        (config.weekly, WEEKLY),
        (config.daily, DAILY),
    ]
    .into_iter()
    .filter_map(|(enabled, component)| enabled.then_some(component))
    .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn span(days: i64) -> Vec<HourlyTotal> {
        let start = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        (0..=days * 24)
            .map(|hour| HourlyTotal {
                timestamp: start + Duration::hours(hour),
                total_contacts: 1,
            })
            .collect()
    }

    #[test]
    fn yearly_threshold() {
        assert!(select(&span(181)).yearly);
        assert!(!select(&span(180)).yearly);
        assert!(!select(&span(179)).yearly);
    }

    #[test]
    fn monthly_threshold() {
        assert!(select_for_days(61).monthly);
        assert!(!select_for_days(60).monthly);
        assert!(!select_for_days(59).monthly);
    }

    #[test]
    fn weekly_threshold() {
        assert!(select(&span(15)).weekly);
        assert!(!select(&span(14)).weekly);
        assert!(!select(&span(13)).weekly);
    }

    #[test]
    fn daily_is_always_on() {
        assert!(select(&span(0)).daily);
        assert!(select(&[]).daily);
        assert!(select(&span(400)).daily);
    }

    #[test]
    fn three_days_only_gets_daily() {
        let config = select(&span(3));
        assert_eq!(
            config,
            SeasonalityConfig {
                yearly: false,
                monthly: false,
                weekly: false,
                daily: true,
            }
        );
        assert_eq!(components(&config), vec![DAILY]);
    }

    #[test]
    fn two_hundred_days_enable_everything() {
        let config = select(&span(200));
        assert!(config.yearly && config.monthly && config.weekly && config.daily);
        let names: Vec<_> = components(&config).iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["yearly", "monthly", "weekly", "daily"]);
    }

    #[test]
    fn partial_days_truncate() {
        let start = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        assert_eq!(coverage_days(start, start + Duration::hours(14 * 24 + 23)), 14);
    }
}
