use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::PipelineError;
use crate::models::{DailyForecast, ForecastPoint, HourlyCell, HourlyTotal};
use crate::pipeline::PipelineResult;
use crate::summary::{round2, Summary};

const DATE_FORMAT: &str = "%Y-%m-%d";
const HOUR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const GRID_FILE: &str = "hourly_grid.csv";
pub const TOTALS_FILE: &str = "hourly_totals.csv";
pub const FORECAST_FILE: &str = "forecast.csv";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OverviewBody {
    min_date: String,
    max_date: String,
    data_coverage_days: i64,
    total_rows: usize,
    partners: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ForecastDayBody {
    date: String,
    predicted: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForecastBody {
    next_seven_days: Vec<ForecastDayBody>,
}

#[derive(Debug, Serialize)]
struct ResultsBody {
    overview: OverviewBody,
    forecast: ForecastBody,
}

#[derive(Debug, Serialize)]
struct ResponseBody {
    data: ResultsBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    stage: &'a str,
}

#[derive(Debug, Serialize)]
struct CellRow<'a> {
    timestamp: String,
    program: &'a str,
    state: &'a str,
    contact_count: u64,
}

#[derive(Debug, Serialize)]
struct TotalRow {
    timestamp: String,
    total_contacts: u64,
}

#[derive(Debug, Serialize)]
struct PredictionRow {
    timestamp: String,
    predicted: f64,
    lower: f64,
    upper: f64,
}

fn hour(timestamp: NaiveDateTime) -> String {
    timestamp.format(HOUR_FORMAT).to_string()
}

/// Non-finite values would be written as `null`; reject them instead.
fn finite(day: &DailyForecast) -> serde_json::Result<f64> {
    if day.predicted.is_finite() {
        Ok(round2(day.predicted))
    } else {
        Err(serde::ser::Error::custom(format!(
            "prediction for {} is not a finite number",
            day.date.format(DATE_FORMAT)
        )))
    }
}

/// Response document consumed by the upload front end.
pub fn response_json(summary: &Summary) -> serde_json::Result<serde_json::Value> {
    let overview = &summary.overview;
    let next_seven_days = summary
        .next_days
        .iter()
        .map(|day| {
            Ok(ForecastDayBody {
                date: day.date.format(DATE_FORMAT).to_string(),
                predicted: finite(day)?,
            })
        })
        .collect::<serde_json::Result<Vec<_>>>()?;
    let body = ResponseBody {
        data: ResultsBody {
            overview: OverviewBody {
                min_date: overview.min_date.format(DATE_FORMAT).to_string(),
                max_date: overview.max_date.format(DATE_FORMAT).to_string(),
                data_coverage_days: overview.coverage_days,
                total_rows: overview.total_rows,
                partners: overview.programs.clone(),
            },
            forecast: ForecastBody { next_seven_days },
        },
    };
    serde_json::to_value(body)
}

pub fn error_json(err: &PipelineError) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(ErrorBody {
        error: err.to_string(),
        stage: err.stage(),
    })
}

pub fn write_grid<W: Write>(writer: W, cells: &[HourlyCell]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for cell in cells {
        writer.serialize(CellRow {
            timestamp: hour(cell.timestamp),
            program: &cell.program,
            state: &cell.state,
            contact_count: cell.contact_count,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_totals<W: Write>(writer: W, totals: &[HourlyTotal]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for total in totals {
        writer.serialize(TotalRow {
            timestamp: hour(total.timestamp),
            total_contacts: total.total_contacts,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_predictions<W: Write>(writer: W, points: &[ForecastPoint]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for point in points {
        writer.serialize(PredictionRow {
            timestamp: hour(point.timestamp),
            predicted: round2(point.predicted),
            lower: round2(point.lower),
            upper: round2(point.upper),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the grid, the hourly totals and the predictions into `dir`.
pub fn write_all(dir: &Path, result: &PipelineResult) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let create = |name: &str| -> anyhow::Result<(PathBuf, std::fs::File)> {
        let path = dir.join(name);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok((path, file))
    };

    let (grid_path, file) = create(GRID_FILE)?;
    write_grid(file, &result.grid.cells).context("failed to write hourly grid")?;

    let (totals_path, file) = create(TOTALS_FILE)?;
    write_totals(file, &result.grid.totals).context("failed to write hourly totals")?;

    let (forecast_path, file) = create(FORECAST_FILE)?;
    write_predictions(file, &result.forecast.points).context("failed to write forecast")?;

    Ok(vec![grid_path, totals_path, forecast_path])
}
