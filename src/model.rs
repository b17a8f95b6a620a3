//! Decomposable additive model: `y(t) = trend(t) + sum(seasonal(t)) + noise`.
//!
//! The trend is piecewise linear with change points spread over the first part
//! of the history. Each seasonal term is a truncated Fourier series. Values
//! and time are rescaled before fitting and the coefficients are the MAP
//! estimate under a Laplace prior on the change-point slope adjustments and a
//! normal prior on the seasonal coefficients. The Laplace penalty is handled by
//! majorize-minimize: every iteration solves a reweighted ridge system.

use chrono::NaiveDateTime;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::ModelSettings;
use crate::error::ForecastError;
use crate::models::ForecastPoint;
use crate::seasonality::SeasonalComponent;

const SECONDS_PER_DAY: f64 = 86_400.0;
const MIN_VARIANCE: f64 = 1e-6;
const LAPLACE_FLOOR: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Penalty {
    Free,
    Laplace,
    Normal,
}

/// Maps a timestamp onto the regression features shared by fit and predict.
#[derive(Debug, Clone)]
struct Design {
    start: NaiveDateTime,
    span_seconds: f64,
    changepoints: Vec<f64>,
    components: Vec<SeasonalComponent>,
}

impl Design {
    fn width(&self) -> usize {
        2 + self.changepoints.len()
            + self
                .components
                .iter()
                .map(|component| 2 * component.fourier_order)
                .sum::<usize>()
    }

    fn scaled_time(&self, timestamp: NaiveDateTime) -> f64 {
        (timestamp - self.start).num_seconds() as f64 / self.span_seconds
    }

    fn penalties(&self) -> Vec<Penalty> {
        let mut penalties = vec![Penalty::Free, Penalty::Free];
        penalties.extend(std::iter::repeat(Penalty::Laplace).take(self.changepoints.len()));
        penalties.resize(self.width(), Penalty::Normal);
        penalties
    }

    fn fill_row(&self, timestamp: NaiveDateTime, row: &mut Vec<f64>) {
        row.clear();
        let t = self.scaled_time(timestamp);
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|&cp| (t - cp).max(0.0)));

        let days = timestamp.and_utc().timestamp() as f64 / SECONDS_PER_DAY;
        for component in &self.components {
            for order in 1..=component.fourier_order {
                let angle = 2.0 * std::f64::consts::PI * order as f64 * days / component.period_days;
                row.push(angle.sin());
                row.push(angle.cos());
            }
        }
    }
}

/// Unfitted model: the tuned constants plus the seasonal terms to include.
#[derive(Debug, Clone)]
pub struct AdditiveModel {
    settings: ModelSettings,
    components: Vec<SeasonalComponent>,
}

#[derive(Debug, Clone)]
pub struct FittedModel {
    design: Design,
    coefficients: Vec<f64>,
    y_scale: f64,
    /// Residual standard deviation in scaled units.
    sigma: f64,
    mean_abs_delta: f64,
    changepoint_rate: f64,
    z: f64,
    iterations: usize,
}

impl AdditiveModel {
    pub fn new(settings: ModelSettings, components: Vec<SeasonalComponent>) -> Self {
        Self {
            settings,
            components,
        }
    }

    pub fn fit(
        &self,
        timestamps: &[NaiveDateTime],
        values: &[f64],
    ) -> Result<FittedModel, ForecastError> {
        let distinct = count_distinct(timestamps);
        let (Some(&start), Some(&end)) = (timestamps.iter().min(), timestamps.iter().max())
        else {
            return Err(ForecastError::InsufficientData { distinct });
        };
        if distinct < 2 || timestamps.len() != values.len() {
            return Err(ForecastError::InsufficientData { distinct });
        }

        let settings = &self.settings;
        let span_seconds = (end - start).num_seconds() as f64;
        let y_scale = match values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())) {
            scale if scale > 0.0 => scale,
            _ => 1.0,
        };
        let y: Vec<f64> = values.iter().map(|v| v / y_scale).collect();

        let mut scaled: Vec<f64> = timestamps
            .iter()
            .map(|ts| (*ts - start).num_seconds() as f64 / span_seconds)
            .collect();
        scaled.sort_by(f64::total_cmp);

        let design = Design {
            start,
            span_seconds,
            changepoints: place_changepoints(
                &scaled,
                settings.n_changepoints,
                settings.changepoint_range,
            ),
            components: self.components.clone(),
        };

        let system = NormalEquations::build(&design, timestamps, &y);
        let penalties = design.penalties();
        let n = y.len() as f64;

        let tau = settings.changepoint_prior_scale;
        let seasonal_prior = settings.seasonality_prior_scale;

        // Warm start: normal prior on every penalised coefficient.
        let mean = y.iter().sum::<f64>() / n;
        let initial_variance =
            (y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).max(MIN_VARIANCE);
        let warm_diagonal: Vec<f64> = penalties
            .iter()
            .map(|penalty| match penalty {
                Penalty::Free => 0.0,
                Penalty::Laplace => initial_variance / (tau * tau),
                Penalty::Normal => initial_variance / (seasonal_prior * seasonal_prior),
            })
            .collect();
        let mut coefficients = system.solve(&warm_diagonal)?;

        let sigma2 = (system.residual_sum_of_squares(&coefficients) / n).max(MIN_VARIANCE);
        let laplace_weight = sigma2 / tau;
        let normal_weight = sigma2 / (seasonal_prior * seasonal_prior);
        let objective = |coef: &[f64]| {
            let penalty: f64 = penalties
                .iter()
                .zip(coef)
                .map(|(penalty, c)| match penalty {
                    Penalty::Free => 0.0,
                    Penalty::Laplace => laplace_weight * c.abs(),
                    Penalty::Normal => 0.5 * normal_weight * c * c,
                })
                .sum();
            0.5 * system.residual_sum_of_squares(coef) + penalty
        };

        // Changes below this are rounding noise relative to the size of the data.
        let objective_floor = 1e-8 * (0.5 * system.sum_of_squares()).max(MIN_VARIANCE);
        let mut current = objective(&coefficients);
        let mut change = f64::INFINITY;
        let mut converged = None;

        for iteration in 1..=settings.max_iterations {
            let diagonal: Vec<f64> = penalties
                .iter()
                .zip(&coefficients)
                .map(|(penalty, c)| match penalty {
                    Penalty::Free => 0.0,
                    Penalty::Laplace => laplace_weight / c.abs().max(LAPLACE_FLOOR),
                    Penalty::Normal => normal_weight,
                })
                .collect();
            let next = system.solve(&diagonal)?;
            let next_objective = objective(&next);
            if !next_objective.is_finite() {
                return Err(ForecastError::FitConvergence {
                    iterations: iteration,
                    change: f64::NAN,
                });
            }

            change = (current - next_objective).abs();
            let threshold = settings.tolerance * current.abs().max(objective_floor);
            coefficients = next;
            current = next_objective;
            if change <= threshold {
                converged = Some(iteration);
                break;
            }
        }

        let Some(iterations) = converged else {
            return Err(ForecastError::FitConvergence {
                iterations: settings.max_iterations,
                change,
            });
        };

        let sigma = (system.residual_sum_of_squares(&coefficients) / n)
            .max(MIN_VARIANCE)
            .sqrt();
        let deltas = &coefficients[2..2 + design.changepoints.len()];
        let mean_abs_delta = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };
        let z = Normal::new(0.0, 1.0)
            .map(|normal| normal.inverse_cdf(0.5 + settings.interval_width / 2.0))
            .map_err(|_| ForecastError::SingularSystem)?;

        Ok(FittedModel {
            changepoint_rate: design.changepoints.len() as f64,
            design,
            coefficients,
            y_scale,
            sigma,
            mean_abs_delta,
            z,
            iterations,
        })
    }
}

impl FittedModel {
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn changepoint_count(&self) -> usize {
        self.design.changepoints.len()
    }

    /// Residual standard deviation in the units of the fitted values.
    pub fn residual_std(&self) -> f64 {
        self.sigma * self.y_scale
    }

    pub fn predict(&self, timestamps: &[NaiveDateTime]) -> Vec<ForecastPoint> {
        let mut row = Vec::with_capacity(self.design.width());
        timestamps
            .iter()
            .map(|&timestamp| {
                self.design.fill_row(timestamp, &mut row);
                let fitted: f64 = row
                    .iter()
                    .zip(&self.coefficients)
                    .map(|(x, c)| x * c)
                    .sum();

                let ahead = (self.design.scaled_time(timestamp) - 1.0).max(0.0);
                let variance = self.sigma * self.sigma + self.trend_variance(ahead);
                let half_width = self.z * variance.sqrt() * self.y_scale;
                let predicted = fitted * self.y_scale;

                ForecastPoint {
                    timestamp,
                    predicted,
                    lower: predicted - half_width,
                    upper: predicted + half_width,
                }
            })
            .collect()
    }

    /// Variance of the trend `ahead` scaled-time units past the history, treating
    /// future slope changes as a compound process with the historical change rate
    /// and Laplace magnitudes.
    fn trend_variance(&self, ahead: f64) -> f64 {
        if ahead <= 0.0 {
            return 0.0;
        }
        let slope_variance = 2.0 * self.mean_abs_delta * self.mean_abs_delta;
        slope_variance * self.changepoint_rate * ahead.powi(3) / 3.0
    }
}

fn count_distinct(timestamps: &[NaiveDateTime]) -> usize {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

/// Change points at evenly spaced observations within the first `range` of the history.
fn place_changepoints(scaled: &[f64], requested: usize, range: f64) -> Vec<f64> {
    let history = (scaled.len() as f64 * range).floor() as usize;
    let count = requested.min(history.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    let last = (history - 1) as f64;
    (1..=count)
        .map(|i| scaled[(last * i as f64 / count as f64).round() as usize])
        .collect()
}

/// Design matrix of the history with its accumulated `X'X` and `X'y`.
struct NormalEquations {
    width: usize,
    rows: Vec<f64>,
    y: Vec<f64>,
    gram: Vec<f64>,
    xty: Vec<f64>,
}

impl NormalEquations {
    fn build(design: &Design, timestamps: &[NaiveDateTime], y: &[f64]) -> Self {
        let width = design.width();
        let mut rows = Vec::with_capacity(width * y.len());
        let mut gram = vec![0.0; width * width];
        let mut xty = vec![0.0; width];
        let mut row = Vec::with_capacity(width);

        for (&timestamp, &value) in timestamps.iter().zip(y) {
            design.fill_row(timestamp, &mut row);
            for i in 0..width {
                xty[i] += row[i] * value;
                for j in i..width {
                    gram[i * width + j] += row[i] * row[j];
                }
            }
            rows.extend_from_slice(&row);
        }

        for i in 0..width {
            for j in 0..i {
                gram[i * width + j] = gram[j * width + i];
            }
        }

        Self {
            width,
            rows,
            y: y.to_vec(),
            gram,
            xty,
        }
    }

    fn sum_of_squares(&self) -> f64 {
        self.y.iter().map(|v| v * v).sum()
    }

    fn residual_sum_of_squares(&self, coef: &[f64]) -> f64 {
        self.rows
            .chunks_exact(self.width)
            .zip(&self.y)
            .map(|(row, value)| {
                let fitted: f64 = row.iter().zip(coef).map(|(x, c)| x * c).sum();
                (value - fitted).powi(2)
            })
            .sum()
    }

    /// Solves `(X'X + diag(d)) b = X'y` by Cholesky factorisation.
    fn solve(&self, diagonal: &[f64]) -> Result<Vec<f64>, ForecastError> {
        let w = self.width;
        let mut lower = self.gram.clone();
        for (i, d) in diagonal.iter().enumerate() {
            lower[i * w + i] += d;
        }

        for j in 0..w {
            let mut pivot = lower[j * w + j];
            for k in 0..j {
                pivot -= lower[j * w + k] * lower[j * w + k];
            }
            if pivot.is_nan() || pivot <= 0.0 || pivot.is_infinite() {
                return Err(ForecastError::SingularSystem);
            }
            let pivot = pivot.sqrt();
            lower[j * w + j] = pivot;

            for i in (j + 1)..w {
                let mut value = lower[i * w + j];
                for k in 0..j {
                    value -= lower[i * w + k] * lower[j * w + k];
                }
                lower[i * w + j] = value / pivot;
            }
        }

        let mut forward = vec![0.0; w];
        for i in 0..w {
            let partial: f64 = (0..i).map(|k| lower[i * w + k] * forward[k]).sum();
            forward[i] = (self.xty[i] - partial) / lower[i * w + i];
        }

        let mut solution = vec![0.0; w];
        for i in (0..w).rev() {
            let partial: f64 = ((i + 1)..w).map(|k| lower[k * w + i] * solution[k]).sum();
            solution[i] = (forward[i] - partial) / lower[i * w + i];
        }

        Ok(solution)
    }
}
