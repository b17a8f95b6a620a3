use chrono::{Duration, NaiveDateTime};

use crate::config::ModelSettings;
use crate::error::ForecastError;
use crate::model::AdditiveModel;
use crate::models::{ForecastPoint, HourlyTotal, SeasonalityConfig};
use crate::observer::PipelineObserver;
use crate::seasonality;

#[derive(Debug, Clone)]
pub struct ForecastOutput {
    pub seasonality: SeasonalityConfig,
    pub coverage_days: i64,
    pub clip_threshold: f64,
    /// Predictions for every historical hour followed by the horizon hours.
    pub points: Vec<ForecastPoint>,
    pub history_len: usize,
    pub iterations: usize,
    pub residual_std: f64,
}

impl ForecastOutput {
    pub fn history(&self) -> &[ForecastPoint] {
        &self.points[..self.history_len]
    }

    pub fn horizon(&self) -> &[ForecastPoint] {
        &self.points[self.history_len..]
    }

    pub fn last_observed(&self) -> Option<NaiveDateTime> {
        self.history().last().map(|point| point.timestamp)
    }
}

/// Quantile with linear interpolation between the closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Caps every value above the `q` quantile at that quantile. Returns the
/// clipped values, the threshold and how many values were changed.
pub fn clip_outliers(values: &[f64], q: f64) -> (Vec<f64>, f64, usize) {
    let Some(threshold) = quantile(values, q) else {
        return (Vec::new(), 0.0, 0);
    };
    let mut clipped = 0;
    let values = values
        .iter()
        .map(|&value| {
            if value > threshold {
                clipped += 1;
                threshold
            } else {
                value
            }
        })
        .collect();
    (values, threshold, clipped)
}

/// The `horizon_days * 24` hours following `last`.
pub fn future_hours(last: NaiveDateTime, horizon_days: u32) -> Vec<NaiveDateTime> {
    (1..=i64::from(horizon_days) * 24)
        .map(|offset| last + Duration::hours(offset))
        .collect()
}

pub fn forecast(
    series: &[HourlyTotal],
    horizon_days: u32,
    settings: &ModelSettings,
    observer: &dyn PipelineObserver,
) -> Result<ForecastOutput, ForecastError> {
    let timestamps: Vec<NaiveDateTime> = series.iter().map(|row| row.timestamp).collect();
    let distinct = {
        let mut unique = timestamps.clone();
        unique.sort_unstable();
        unique.dedup();
        unique.len()
    };
    let Some(&last) = timestamps.iter().max() else {
        return Err(ForecastError::InsufficientData { distinct });
    };
    if distinct < 2 {
        return Err(ForecastError::InsufficientData { distinct });
    }

    let raw: Vec<f64> = series.iter().map(|row| row.total_contacts as f64).collect();
    let (values, clip_threshold, clipped) = clip_outliers(&raw, settings.clip_quantile);
    observer.outliers_clipped(clip_threshold, clipped);

    let coverage_days = seasonality::series_coverage_days(series);
    let seasonality = seasonality::select(series);
    observer.seasonality_selected(coverage_days, &seasonality);

    let components = seasonality::components(&seasonality);
    let terms: Vec<&str> = components.iter().map(|component| component.name).collect();
    let model = AdditiveModel::new(settings.clone(), components);
    let fitted = model.fit(&timestamps, &values)?;
    observer.stage_finished(
        "model fit",
        &format!(
            "{} iterations, {} change points, seasonal terms [{}]",
            fitted.iterations(),
            fitted.changepoint_count(),
            terms.join(", ")
        ),
    );

    let mut horizon = timestamps.clone();
    horizon.extend(future_hours(last, horizon_days));
    let points = fitted.predict(&horizon);

    Ok(ForecastOutput {
        seasonality,
        coverage_days,
        clip_threshold,
        points,
        history_len: timestamps.len(),
        iterations: fitted.iterations(),
        residual_std: fitted.residual_std(),
    })
}
