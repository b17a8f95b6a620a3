//! The aggregation and forecast pipeline behind every command.
//!
//! One invocation runs normalize -> aggregate -> select seasonality -> fit and
//! predict -> summarize on a single batch. Nothing is shared between
//! invocations and nothing is returned unless every stage succeeds.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::aggregate;
use crate::config::PipelineConfig;
use crate::error::{Result, ValidationError};
use crate::forecast::{self, ForecastOutput};
use crate::ingest::{self, NormalizedRecords};
use crate::models::{AggregatedGrid, Overview};
use crate::observer::{LogObserver, PipelineObserver};
use crate::summary::{self, Summary};

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub dropped: usize,
    pub grid: AggregatedGrid,
    pub forecast: ForecastOutput,
    pub summary: Summary,
}

#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    observer: Arc<dyn PipelineObserver + Send + Sync>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            observer: Arc::new(LogObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver + Send + Sync>) -> Self {
        self.observer = observer;
        self
    }

    pub fn normalize<R: Read>(&self, source: R) -> Result<NormalizedRecords> {
        self.observed_normalize(|| ingest::read_records(source, &self.config.columns))
    }

    pub fn normalize_path(&self, path: &Path) -> Result<NormalizedRecords> {
        self.observed_normalize(|| ingest::read_records_from_path(path, &self.config.columns))
    }

    fn observed_normalize(
        &self,
        read: impl FnOnce() -> std::result::Result<NormalizedRecords, ValidationError>,
    ) -> Result<NormalizedRecords> {
        self.observer.stage_started("normalize");
        let normalized = read()?;
        if normalized.dropped > 0 {
            self.observer.rows_dropped(normalized.dropped);
        }
        self.observer.stage_finished(
            "normalize",
            &format!("{} valid rows", normalized.records.len()),
        );
        Ok(normalized)
    }

    pub fn overview(&self, normalized: &NormalizedRecords) -> Result<Overview> {
        Ok(summary::overview(&normalized.records)?)
    }

    pub fn run_path(&self, path: &Path) -> Result<PipelineResult> {
        let normalized = self.normalize_path(path)?;
        self.run(normalized)
    }

    pub fn run_reader<R: Read>(&self, source: R) -> Result<PipelineResult> {
        let normalized = self.normalize(source)?;
        self.run(normalized)
    }

    pub fn run(&self, normalized: NormalizedRecords) -> Result<PipelineResult> {
        let NormalizedRecords { records, dropped } = normalized;
        let horizon_days = self.config.horizon_days;

        self.observer.stage_started("aggregation");
        let grid = aggregate::aggregate(&records)?;
        self.observer.stage_finished(
            "aggregation",
            &format!(
                "{} hours x {} programs x {} states = {} cells",
                grid.totals.len(),
                grid.programs.len(),
                grid.states.len(),
                grid.cells.len()
            ),
        );

        self.observer.stage_started("forecast");
        let forecast = forecast::forecast(
            &grid.totals,
            horizon_days,
            &self.config.model,
            self.observer.as_ref(),
        )?;
        self.observer.stage_finished(
            "forecast",
            &format!("{} predicted hours", forecast.points.len()),
        );

        let summary = summary::summarize(&forecast, horizon_days, &records)?;
        self.observer.stage_finished(
            "summary",
            &format!("{} daily points", summary.next_days.len()),
        );

        Ok(PipelineResult {
            dropped,
            grid,
            forecast,
            summary,
        })
    }
}
