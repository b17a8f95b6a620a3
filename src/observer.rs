//! Progress hooks for the pipeline. Stage code reports through an observer
//! instead of logging inline, so callers decide where the messages go.

use std::sync::Once;

use crate::models::SeasonalityConfig;

pub trait PipelineObserver {
    fn stage_started(&self, _stage: &str) {}

    fn stage_finished(&self, _stage: &str, _detail: &str) {}

    fn rows_dropped(&self, _count: usize) {}

    fn seasonality_selected(&self, _coverage_days: i64, _seasonality: &SeasonalityConfig) {}

    fn outliers_clipped(&self, _threshold: f64, _clipped: usize) {}
}

/// Forwards every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn stage_started(&self, stage: &str) {
        log::info!("Starting {stage}");
    }

    fn stage_finished(&self, stage: &str, detail: &str) {
        log::info!("Finished {stage}: {detail}");
    }

    fn rows_dropped(&self, count: usize) {
        log::warn!("Found {count} rows with invalid timestamps");
    }

    fn seasonality_selected(&self, coverage_days: i64, seasonality: &SeasonalityConfig) {
        log::info!("Data coverage: {coverage_days} days");
        log::info!(
            "Using seasonality: yearly={}, monthly={}, weekly={}, daily={}",
            seasonality.yearly,
            seasonality.monthly,
            seasonality.weekly,
            seasonality.daily
        );
    }

    fn outliers_clipped(&self, threshold: f64, clipped: usize) {
        log::info!("Upper threshold for outliers: {threshold} ({clipped} values clipped)");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

static LOGGER: Once = Once::new();

/// Installs the process logger. Safe to call more than once; only the first call has effect.
pub fn init_logging() {
    LOGGER.call_once(|| {
        let logger = pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Info)
            .parse_env("RUST_LOG")
            .build();
        let level = logger.filter();

        if log::set_boxed_logger(Box::new(logger)).is_ok() {
            log::set_max_level(level);
        }
    });
}
