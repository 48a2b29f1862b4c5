//! Regression configuration.
//!
//! [`ReghdfeConfig`] deserialises from JSON with defaults for everything
//! except the outcome and the regressors:
//!
//! ```json
//! { "depvar": "wage", "regressors": ["experience"], "absorb": ["firm_id", "year"] }
//! ```

use serde::{Deserialize, Serialize};
use statar_absorb::{Acceleration, DemeanConfig};
use statar_data::{ConfigurationError, SampleSpec};
use statar_estimate::OlsConfig;
use std::time::Duration;

const fn default_tolerance() -> f64 {
    1e-8
}

const fn default_max_iterations() -> usize {
    10_000
}

const fn default_true() -> bool {
    true
}

const fn default_rank_tolerance() -> f64 {
    1e-9
}

const fn default_confidence_level() -> f64 {
    0.95
}

/// Model specification and estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReghdfeConfig {
    /// Outcome column
    pub depvar: String,

    /// Regressor columns
    pub regressors: Vec<String>,

    /// Fixed-effect columns to absorb (default: none, intercept only)
    #[serde(default)]
    pub absorb: Vec<String>,

    /// Cluster columns; non-empty selects cluster-robust errors
    #[serde(default)]
    pub cluster: Vec<String>,

    /// Relative convergence tolerance of the demeaning loop (default: 1e-8)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Iteration cap of the demeaning loop (default: 10_000)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Wall-clock budget for demeaning, in seconds (default: none)
    #[serde(default)]
    pub time_limit: Option<f64>,

    /// HC1 robust errors when not clustering (default: true)
    #[serde(default = "default_true")]
    pub robust: bool,

    /// Iteratively drop singleton fixed-effect groups (default: true)
    #[serde(default = "default_true")]
    pub drop_singletons: bool,

    /// Demean columns in parallel (default: true)
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Demeaning iteration scheme (default: conjugate_gradient)
    #[serde(default)]
    pub acceleration: Acceleration,

    /// Relative pivot tolerance of the rank check (default: 1e-9)
    #[serde(default = "default_rank_tolerance")]
    pub rank_tolerance: f64,

    /// Confidence level of the reported intervals (default: 0.95)
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

impl ReghdfeConfig {
    /// Configuration with default settings.
    pub fn new(depvar: impl Into<String>, regressors: Vec<String>) -> Self {
        Self {
            depvar: depvar.into(),
            regressors,
            absorb: Vec::new(),
            cluster: Vec::new(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            time_limit: None,
            robust: true,
            drop_singletons: true,
            parallel: true,
            acceleration: Acceleration::default(),
            rank_tolerance: default_rank_tolerance(),
            confidence_level: default_confidence_level(),
        }
    }

    /// Start a builder.
    pub fn builder<I, S>(depvar: impl Into<String>, regressors: I) -> ReghdfeConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReghdfeConfigBuilder {
            config: Self::new(depvar, regressors.into_iter().map(Into::into).collect()),
        }
    }

    /// Parse a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidParameter(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.sample_spec().validate()?;
        self.demean_config()?.validate()?;
        if !(self.rank_tolerance > 0.0 && self.rank_tolerance < 1.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "rank_tolerance must lie in (0, 1), got {}",
                self.rank_tolerance
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "confidence_level must lie in (0, 1), got {}",
                self.confidence_level
            )));
        }
        Ok(())
    }

    /// Column roles for sample construction.
    pub fn sample_spec(&self) -> SampleSpec {
        SampleSpec {
            depvar: self.depvar.clone(),
            regressors: self.regressors.clone(),
            absorb: self.absorb.clone(),
            cluster: self.cluster.clone(),
            drop_singletons: self.drop_singletons,
        }
    }

    /// Settings of the demeaning engine.
    pub fn demean_config(&self) -> Result<DemeanConfig, ConfigurationError> {
        let time_limit = self
            .time_limit
            .map(|secs| {
                if secs > 0.0 {
                    Duration::try_from_secs_f64(secs).map_err(|e| {
                        ConfigurationError::InvalidParameter(format!(
                            "time_limit {}: {}",
                            secs, e
                        ))
                    })
                } else {
                    Err(ConfigurationError::InvalidParameter(format!(
                        "time_limit must be positive, got {}",
                        secs
                    )))
                }
            })
            .transpose()?;

        Ok(DemeanConfig {
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            time_limit,
            parallel: self.parallel,
            acceleration: self.acceleration,
        })
    }

    /// Settings of the least-squares solver.
    pub const fn ols_config(&self) -> OlsConfig {
        OlsConfig {
            rank_tolerance: self.rank_tolerance,
        }
    }
}

/// Fluent builder for [`ReghdfeConfig`].
#[derive(Debug, Clone)]
pub struct ReghdfeConfigBuilder {
    config: ReghdfeConfig,
}

impl ReghdfeConfigBuilder {
    /// Fixed effects to absorb.
    pub fn absorb<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.absorb = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Cluster dimensions.
    pub fn cluster<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cluster = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Demeaning tolerance.
    pub const fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Demeaning iteration cap.
    pub const fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Demeaning time budget.
    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.config.time_limit = Some(limit.as_secs_f64());
        self
    }

    /// HC1 robust (true) or homoskedastic (false) errors when not clustering.
    pub const fn robust(mut self, robust: bool) -> Self {
        self.config.robust = robust;
        self
    }

    /// Singleton dropping.
    pub const fn drop_singletons(mut self, drop: bool) -> Self {
        self.config.drop_singletons = drop;
        self
    }

    /// Parallel column sweeps.
    pub const fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Demeaning iteration scheme.
    pub const fn acceleration(mut self, acceleration: Acceleration) -> Self {
        self.config.acceleration = acceleration;
        self
    }

    /// Rank-check tolerance.
    pub const fn rank_tolerance(mut self, tolerance: f64) -> Self {
        self.config.rank_tolerance = tolerance;
        self
    }

    /// Confidence level.
    pub const fn confidence_level(mut self, level: f64) -> Self {
        self.config.confidence_level = level;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<ReghdfeConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_json_defaults() {
        let config = ReghdfeConfig::from_json(
            r#"{"depvar": "wage", "regressors": ["experience"], "absorb": ["firm_id", "year"]}"#,
        )
        .unwrap();
        assert_eq!(config.absorb, vec!["firm_id", "year"]);
        assert!(config.cluster.is_empty());
        assert_eq!(config.tolerance, 1e-8);
        assert_eq!(config.max_iterations, 10_000);
        assert!(config.robust);
        assert!(config.drop_singletons);
        assert!(config.parallel);
        assert_eq!(config.acceleration, Acceleration::ConjugateGradient);
        assert_eq!(config.time_limit, None);
        let built = ReghdfeConfig::builder("wage", ["experience"])
            .absorb(["firm_id", "year"])
            .build()
            .unwrap();
        assert_eq!(config, built);
    }

    #[test]
    fn test_builder() {
        let config = ReghdfeConfig::builder("y", ["x1", "x2"])
            .cluster(["firm"])
            .tolerance(1e-10)
            .max_iterations(50)
            .time_limit(Duration::from_millis(1500))
            .robust(false)
            .parallel(false)
            .acceleration(Acceleration::None)
            .build()
            .unwrap();
        assert_eq!(config.regressors, vec!["x1", "x2"]);
        assert_eq!(config.time_limit, Some(1.5));
        let demean = config.demean_config().unwrap();
        assert_eq!(demean.time_limit, Some(Duration::from_millis(1500)));
        assert_eq!(demean.max_iterations, 50);
        assert!(!demean.parallel);
        assert_eq!(demean.acceleration, Acceleration::None);

        let parsed = ReghdfeConfig::from_json(
            r#"{"depvar": "y", "regressors": ["x"], "acceleration": "none"}"#,
        )
        .unwrap();
        assert_eq!(parsed.acceleration, Acceleration::None);
    }

    #[rstest]
    #[case(r#"{"depvar": "y", "regressors": []}"#)]
    #[case(r#"{"depvar": "y", "regressors": ["y"]}"#)]
    #[case(r#"{"depvar": "y", "regressors": ["x"], "tolerance": -1.0}"#)]
    #[case(r#"{"depvar": "y", "regressors": ["x"], "max_iterations": 0}"#)]
    #[case(r#"{"depvar": "y", "regressors": ["x"], "time_limit": 0.0}"#)]
    #[case(r#"{"depvar": "y", "regressors": ["x"], "rank_tolerance": 2.0}"#)]
    #[case(r#"{"regressors": ["x"]}"#)]
    #[case(r#"{"depvar": "y", "regressors": ["x"], "acceleration": "aitken"}"#)]
    fn test_invalid_configs(#[case] json: &str) {
        assert!(ReghdfeConfig::from_json(json).is_err());
    }
}
