use std::path::Path;

use serde::Deserialize;

use crate::error::ValidationError;

pub const DEFAULT_HORIZON_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub timestamp: String,
    pub program: String,
    pub state: String,
    pub unique_id: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            timestamp: "Fact Consult Consult Created Time".to_string(),
            program: "Fact Partner Partner Name".to_string(),
            state: "Fact Consult Consult State".to_string(),
            unique_id: "Fact Consult Consult Guid".to_string(),
        }
    }
}

impl ColumnNames {
    pub fn required(&self) -> [&str; 4] {
        [&self.timestamp, &self.program, &self.state, &self.unique_id]
    }
}

/// Tuned constants of the additive model. The defaults are the production values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub n_changepoints: usize,
    pub changepoint_range: f64,
    pub interval_width: f64,
    pub clip_quantile: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            n_changepoints: 25,
            changepoint_range: 0.8,
            interval_width: 0.8,
            clip_quantile: 0.99,
            max_iterations: 1000,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub columns: ColumnNames,
    pub horizon_days: u32,
    pub model: ModelSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            horizon_days: DEFAULT_HORIZON_DAYS,
            model: ModelSettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ValidationError> {
        let config: PipelineConfig =
            toml::from_str(raw).map_err(|err| ValidationError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |msg: &str| Err(ValidationError::InvalidConfig(msg.to_string()));
        let model = &self.model;

        if self.horizon_days == 0 {
            return invalid("horizon_days must be at least 1");
        }
        if self.columns.required().iter().any(|name| name.trim().is_empty()) {
            return invalid("column names must not be empty");
        }
        if !(model.changepoint_prior_scale > 0.0) || !(model.seasonality_prior_scale > 0.0) {
            return invalid("prior scales must be positive");
        }
        if !(model.changepoint_range > 0.0 && model.changepoint_range <= 1.0) {
            return invalid("changepoint_range must be in (0, 1]");
        }
        if !(model.interval_width > 0.0 && model.interval_width < 1.0) {
            return invalid("interval_width must be in (0, 1)");
        }
        if !(model.clip_quantile > 0.0 && model.clip_quantile <= 1.0) {
            return invalid("clip_quantile must be in (0, 1]");
        }
        if model.max_iterations == 0 || !(model.tolerance > 0.0) {
            return invalid("max_iterations and tolerance must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.horizon_days, 7);
        assert_eq!(config.model.changepoint_prior_scale, 0.05);
        assert_eq!(config.model.seasonality_prior_scale, 10.0);
        assert_eq!(config.columns.unique_id, "Fact Consult Consult Guid");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            horizon_days = 14

            [columns]
            program = "Partner"
            "#,
        )
        .unwrap();

        assert_eq!(config.horizon_days, 14);
        assert_eq!(config.columns.program, "Partner");
        assert_eq!(config.columns.state, "Fact Consult Consult State");
        assert_eq!(config.model, ModelSettings::default());
    }

    #[test]
    fn rejects_zero_horizon() {
        let err = PipelineConfig::from_toml_str("horizon_days = 0").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PipelineConfig::from_toml_str("horizon_days = \"seven\"").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig(_)));
    }
}
