//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/phylim/phylim.toml`
//! 3. Explicit config file: `--config FILE`
//! 4. Environment variables: `PHYLIM__*` prefix
//!
//! CLI flags are applied on top by the caller.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{BoundaryChecker, IdentifiabilityChecker, MatrixClassifier, PathStrategy, Tolerance};
use crate::util::path::expand_env_vars;

/// Closeness test used by every matrix comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifyConfig {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        let tol = Tolerance::default();
        Self {
            rtol: tol.rtol,
            atol: tol.atol,
        }
    }
}

impl ClassifyConfig {
    pub fn classifier(&self) -> MatrixClassifier {
        MatrixClassifier::new(Tolerance::new(self.rtol, self.atol))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct IdentifiabilityConfig {
    /// Identity matrices are fatal instead of DLC-equivalent
    pub strict: bool,
    pub strategy: PathStrategy,
}

impl IdentifiabilityConfig {
    pub fn checker(&self) -> IdentifiabilityChecker {
        IdentifiabilityChecker::new(self.strict).with_strategy(self.strategy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoundaryConfig {
    pub tolerance: f64,
    /// Parameter names never checked against their bounds
    pub exclude: Vec<String>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            tolerance: crate::domain::boundary::DEFAULT_BOUND_TOLERANCE,
            exclude: vec!["length".into(), "mprobs".into()],
        }
    }
}

impl BoundaryConfig {
    pub fn checker(&self) -> BoundaryChecker {
        BoundaryChecker::new(self.tolerance, self.exclude.clone())
    }

    /// Merge arrays with union semantics and negation support.
    ///
    /// - Items from overlay are added to base
    /// - Items prefixed with `!` remove the corresponding item from the result
    /// - Duplicates are de-duplicated
    ///
    /// # Examples
    /// ```ignore
    /// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
    /// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
    /// ```
    pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
        let mut result: HashSet<String> = base.iter().cloned().collect();

        for pattern in overlay {
            if let Some(negated) = pattern.strip_prefix('!') {
                result.remove(negated);
            } else {
                result.insert(pattern.clone());
            }
        }

        let mut vec: Vec<String> = result.into_iter().collect();
        vec.sort();
        vec
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Worker threads for batch runs (default: one per core)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    /// Directory receiving one record file per fit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawClassifyConfig {
    pub rtol: Option<f64>,
    pub atol: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawIdentifiabilityConfig {
    pub strict: Option<bool>,
    pub strategy: Option<PathStrategy>,
}

/// Arrays are Option to detect "not specified".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawBoundaryConfig {
    pub tolerance: Option<f64>,
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawOutputConfig {
    pub format: Option<OutputFormat>,
    pub jobs: Option<usize>,
    pub dir: Option<PathBuf>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub classify: RawClassifyConfig,
    pub identifiability: RawIdentifiabilityConfig,
    pub boundary: RawBoundaryConfig,
    pub output: RawOutputConfig,
}

/// Unified configuration for phylim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub classify: ClassifyConfig,
    pub identifiability: IdentifiabilityConfig,
    pub boundary: BoundaryConfig,
    pub output: OutputConfig,
}

/// Get the XDG config directory for phylim.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "phylim").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("phylim.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    fn expand_paths(&mut self) {
        if let Some(dir) = &self.output.dir {
            self.output.dir = Some(PathBuf::from(expand_env_vars(&dir.to_string_lossy())));
        }
    }

    fn apply_scalars(&mut self, raw: &RawSettings) {
        if let Some(v) = raw.classify.rtol {
            self.classify.rtol = v;
        }
        if let Some(v) = raw.classify.atol {
            self.classify.atol = v;
        }
        if let Some(v) = raw.identifiability.strict {
            self.identifiability.strict = v;
        }
        if let Some(v) = raw.identifiability.strategy {
            self.identifiability.strategy = v;
        }
        if let Some(v) = raw.boundary.tolerance {
            self.boundary.tolerance = v;
        }
        if let Some(v) = raw.output.format {
            self.output.format = v;
        }
        if raw.output.jobs.is_some() {
            self.output.jobs = raw.output.jobs;
        }
        if raw.output.dir.is_some() {
            self.output.dir = raw.output.dir.clone();
        }
    }

    /// Apply global config onto defaults; arrays REPLACE the defaults.
    fn apply_global(&self, global: &RawSettings) -> Self {
        let mut next = self.clone();
        next.apply_scalars(global);
        if let Some(exclude) = &global.boundary.exclude {
            next.boundary.exclude = exclude.clone();
        }
        next
    }

    /// Merge an explicit config file; arrays UNION with `!item` removal.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        let mut next = self.clone();
        next.apply_scalars(overlay);
        if let Some(exclude) = &overlay.boundary.exclude {
            next.boundary.exclude = BoundaryConfig::merge_array(&self.boundary.exclude, exclude);
        }
        next
    }

    /// Load settings with layered precedence from the XDG location.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_with_global(global_config_path().as_deref(), config_file)
    }

    /// Load settings with an explicit global config location.
    ///
    /// # Array Merge Semantics
    /// - Defaults → Global: REPLACE
    /// - Global → config file: UNION with negation support
    /// - Any → Env vars: REPLACE
    pub fn load_with_global(
        global_path: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_path {
            if global_path.exists() {
                let raw = load_raw_settings(global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
            let raw = load_raw_settings(path)?;
            current = current.merge_with(&raw);
        }

        current = Self::apply_env_overrides(current, Self::environment())?;
        current.expand_paths();
        current.validate()?;

        Ok(current)
    }

    fn environment() -> Environment {
        Environment::with_prefix("PHYLIM")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("boundary.exclude")
    }

    /// Apply PHYLIM__* environment variables as explicit overrides.
    pub fn apply_env_overrides(mut settings: Self, env: Environment) -> Result<Self, ApplicationError> {
        let config = Config::builder().add_source(env).build().map_err(config_err)?;

        if let Ok(val) = config.get_float("classify.rtol") {
            settings.classify.rtol = val;
        }
        if let Ok(val) = config.get_float("classify.atol") {
            settings.classify.atol = val;
        }
        if let Ok(val) = config.get_bool("identifiability.strict") {
            settings.identifiability.strict = val;
        }
        if let Ok(val) = config.get_string("identifiability.strategy") {
            settings.identifiability.strategy = val.parse().map_err(|message| ApplicationError::Config { message })?;
        }
        if let Ok(val) = config.get_float("boundary.tolerance") {
            settings.boundary.tolerance = val;
        }
        if let Ok(val) = config.get::<Vec<String>>("boundary.exclude") {
            settings.boundary.exclude = val;
        }
        if let Ok(val) = config.get_string("output.format") {
            settings.output.format = OutputFormat::from_str(&val, true).map_err(|message| ApplicationError::Config { message })?;
        }
        if let Ok(val) = config.get_int("output.jobs") {
            settings.output.jobs = Some(usize::try_from(val).map_err(|_| ApplicationError::Config {
                message: format!("output.jobs must be positive: {val}"),
            })?);
        }
        if let Ok(val) = config.get_string("output.dir") {
            settings.output.dir = Some(PathBuf::from(val));
        }

        Ok(settings)
    }

    /// Rejects values no check can run with.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        let bad = |message: String| Err(ApplicationError::Config { message });
        if !(self.classify.rtol >= 0.0 && self.classify.atol >= 0.0) {
            return bad(format!(
                "classify tolerances must be non-negative: rtol={}, atol={}",
                self.classify.rtol, self.classify.atol
            ));
        }
        if !(self.boundary.tolerance >= 0.0) {
            return bad(format!("boundary.tolerance must be non-negative: {}", self.boundary.tolerance));
        }
        if self.output.jobs == Some(0) {
            return bad("output.jobs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# phylim configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/phylim/phylim.toml   (defines your baseline)
#   File:   phylim --config FILE           (per-analysis additions)
#   Env:    PHYLIM__SECTION__KEY variables (explicit overrides)
#
# Array Merge Semantics:
#   Global config REPLACES compiled defaults.
#   A --config file UNIONS with global; use "!name" to REMOVE an inherited item:
#     exclude = ["kappa", "!mprobs"]

[classify]
# Closeness test |a - b| <= atol + rtol * |b| for all matrix comparisons
# rtol = 1e-5
# atol = 1e-8

[identifiability]
# Treat identity matrices as fatal instead of DLC-equivalent
# strict = false

# Path test formulation: "path-union" or "rerooting"
# strategy = "path-union"

[boundary]
# Distance from a bound counted as hitting it
# tolerance = 1e-10

# Parameters never checked
# exclude = ["length", "mprobs"]

[output]
# "text" or "json"
# format = "text"

# Worker threads for batch runs
# jobs = 4

# Write one record per fit into this directory
# dir = "~/phylim-records"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::environment().source(Some(map))
    }

    #[test]
    fn given_no_config_when_loading_then_uses_defaults() {
        let settings = Settings::load_with_global(None, None).expect("load defaults");
        assert_eq!(settings.classify.rtol, 1e-5);
        assert_eq!(settings.classify.atol, 1e-8);
        assert!(!settings.identifiability.strict);
        assert_eq!(settings.identifiability.strategy, PathStrategy::PathUnion);
        assert_eq!(settings.boundary.exclude, vec!["length", "mprobs"]);
        assert_eq!(settings.output.format, OutputFormat::Text);
    }

    #[test]
    fn given_env_vars_when_applying_overrides_then_replace_values() {
        let settings = Settings::apply_env_overrides(
            Settings::default(),
            env(&[
                ("PHYLIM__IDENTIFIABILITY__STRICT", "true"),
                ("PHYLIM__IDENTIFIABILITY__STRATEGY", "rerooting"),
                ("PHYLIM__CLASSIFY__ATOL", "1e-6"),
                ("PHYLIM__BOUNDARY__EXCLUDE", "length,kappa"),
                ("PHYLIM__OUTPUT__JOBS", "3"),
                ("PHYLIM__OUTPUT__FORMAT", "json"),
            ]),
        )
        .unwrap();
        assert!(settings.identifiability.strict);
        assert_eq!(settings.identifiability.strategy, PathStrategy::Rerooting);
        assert_eq!(settings.classify.atol, 1e-6);
        assert_eq!(settings.boundary.exclude, vec!["length", "kappa"]);
        assert_eq!(settings.output.jobs, Some(3));
        assert_eq!(settings.output.format, OutputFormat::Json);
    }

    #[test]
    fn given_bad_strategy_in_env_when_applying_then_config_error() {
        let err = Settings::apply_env_overrides(
            Settings::default(),
            env(&[("PHYLIM__IDENTIFIABILITY__STRATEGY", "bogus")]),
        )
        .unwrap_err();
        assert!(matches!(err, ApplicationError::Config { .. }));
    }

    #[test]
    fn given_tilde_in_output_dir_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings::default();
        settings.output.dir = Some(PathBuf::from("~/records"));
        settings.expand_paths();
        let home = std::env::var("HOME").expect("HOME should be set");
        let dir = settings.output.dir.unwrap();
        assert!(dir.to_string_lossy().starts_with(&home));
    }

    #[test]
    fn test_merge_array_negation() {
        let base = vec!["length".to_string(), "mprobs".to_string()];
        let overlay = vec!["!mprobs".to_string(), "kappa".to_string()];
        assert_eq!(BoundaryConfig::merge_array(&base, &overlay), vec!["kappa", "length"]);
    }

    #[test]
    fn test_apply_global_replaces_arrays() {
        let global = RawSettings {
            boundary: RawBoundaryConfig {
                tolerance: None,
                exclude: Some(vec!["kappa".to_string()]),
            },
            ..Default::default()
        };
        let result = Settings::default().apply_global(&global);
        assert_eq!(result.boundary.exclude, vec!["kappa"]);
        assert_eq!(result.boundary.tolerance, 1e-10);
    }

    #[test]
    fn test_merge_with_unions_arrays() {
        let overlay = RawSettings {
            boundary: RawBoundaryConfig {
                tolerance: Some(1e-8),
                exclude: Some(vec!["kappa".to_string()]),
            },
            ..Default::default()
        };
        let result = Settings::default().merge_with(&overlay);
        assert_eq!(result.boundary.exclude, vec!["kappa", "length", "mprobs"]);
        assert_eq!(result.boundary.tolerance, 1e-8);
    }

    #[test]
    fn given_zero_jobs_when_validating_then_rejected() {
        let mut settings = Settings::default();
        settings.output.jobs = Some(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn given_template_when_parsed_then_yields_defaults() {
        let raw: RawSettings = toml::from_str(&Settings::template()).unwrap();
        assert!(raw.classify.rtol.is_none());
        assert!(raw.boundary.exclude.is_none());
    }
}
