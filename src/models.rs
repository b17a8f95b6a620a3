use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub timestamp: NaiveDateTime,
    pub program: String,
    pub state: String,
    pub unique_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourlyCell {
    pub timestamp: NaiveDateTime,
    pub program: String,
    pub state: String,
    pub contact_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyTotal {
    pub timestamp: NaiveDateTime,
    pub total_contacts: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AggregatedGrid {
    pub cells: Vec<HourlyCell>,
    pub totals: Vec<HourlyTotal>,
    pub programs: Vec<String>,
    pub states: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeasonalityConfig {
    pub yearly: bool,
    pub monthly: bool,
    pub weekly: bool,
    pub daily: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: NaiveDateTime,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overview {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub coverage_days: i64,
    pub total_rows: usize,
    pub programs: Vec<String>,
}
